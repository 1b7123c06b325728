use anyhow::Result;
use clap::Parser;
use cotacao::core::log::init_logging;

/// Serves the current USD-BRL bid on http://0.0.0.0:8080/cotacao
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

    let result = cotacao::run_server().await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Rate service failed");
    }
    result
}
