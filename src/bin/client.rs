use anyhow::Result;
use clap::Parser;
use cotacao::core::config::OUTPUT_PATH;
use cotacao::core::log::init_logging;

/// Fetches the dollar rate from the local Rate Service and saves it to cotacao.txt
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cotacao::run_client().await {
        Ok(value) => {
            println!("Dollar rate {value:.2} saved to {OUTPUT_PATH}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Rate client failed");
            Err(e)
        }
    }
}
