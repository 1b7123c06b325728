use std::path::PathBuf;
use std::time::Duration;

pub const UPSTREAM_BASE_URL: &str = "https://economia.awesomeapi.com.br";
pub const LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const SERVICE_URL: &str = "http://localhost:8080/cotacao";
pub const DATABASE_PATH: &str = "./cotacoes.db";
pub const OUTPUT_PATH: &str = "cotacao.txt";

pub const UPSTREAM_TIMEOUT: Duration = Duration::from_millis(200);
/// Tight enough to fail on slow disks or a cold first connection.
pub const PERSIST_TIMEOUT: Duration = Duration::from_millis(10);
pub const CLIENT_TIMEOUT: Duration = Duration::from_millis(300);

pub const USER_AGENT: &str = concat!("cotacao/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub upstream_base_url: String,
    pub database_path: PathBuf,
    pub upstream_timeout: Duration,
    pub persist_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            listen_addr: LISTEN_ADDR.to_string(),
            upstream_base_url: UPSTREAM_BASE_URL.to_string(),
            database_path: PathBuf::from(DATABASE_PATH),
            upstream_timeout: UPSTREAM_TIMEOUT,
            persist_timeout: PERSIST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub service_url: String,
    pub output_path: PathBuf,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            service_url: SERVICE_URL.to_string(),
            output_path: PathBuf::from(OUTPUT_PATH),
            timeout: CLIENT_TIMEOUT,
        }
    }
}
