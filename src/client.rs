//! Rate Client: asks the Rate Service for the current bid and records it.

use crate::core::config::ClientConfig;
use crate::core::{Deadline, RateResponse};
use anyhow::{Context, Result, anyhow};
use reqwest::header::ACCEPT;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

pub struct RateClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl RateClient {
    pub fn new(http: reqwest::Client, config: ClientConfig) -> Self {
        RateClient { http, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetches the bid and parses it, all under the configured timeout.
    #[instrument(name = "RateClientFetch", skip(self), fields(url = %self.config.service_url))]
    pub async fn fetch_rate(&self) -> Result<f64> {
        let deadline = Deadline::after(self.config.timeout);
        let url = &self.config.service_url;

        let request = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .build()
            .with_context(|| format!("Failed to build request for {url}"))?;

        let body = deadline
            .run("rate request", async {
                let response = self
                    .http
                    .execute(request)
                    .await
                    .with_context(|| format!("Failed to send request to {url}"))?;

                debug!(response = ?response, "Received rate service response");

                if response.status() != reqwest::StatusCode::OK {
                    return Err(anyhow!("Unexpected status code: {}", response.status()));
                }

                let body = response
                    .bytes()
                    .await
                    .context("Failed to read response body")?;
                Ok::<_, anyhow::Error>(body)
            })
            .await?;

        let rate: RateResponse =
            serde_json::from_slice(&body).context("Failed to decode JSON response")?;

        // Out-of-range bids such as "1e400" parse to infinity.
        rate.bid
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| anyhow!("Failed to extract bid value from response"))
    }
}

/// Formats the single output line.
pub fn format_rate(value: f64) -> String {
    format!("Dólar: {value:.2}\n")
}

/// Replaces `path` with the formatted rate. The content goes to a temporary
/// file beside the target first, so the target is either fully written or
/// left as it was.
pub fn write_output(path: &Path, value: f64) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(format_rate(value).as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.as_file()
        .sync_all()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    read_only(file.as_file())
        .and_then(|permissions| fs::set_permissions(file.path(), permissions))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

#[cfg(unix)]
fn read_only(_file: &fs::File) -> std::io::Result<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::Permissions::from_mode(0o444))
}

#[cfg(not(unix))]
fn read_only(file: &fs::File) -> std::io::Result<fs::Permissions> {
    let mut permissions = file.metadata()?.permissions();
    permissions.set_readonly(true);
    Ok(permissions)
}

/// Runs one client cycle: fetch, parse, write. Nothing is written on failure.
pub async fn run(client: &RateClient) -> Result<f64> {
    let value = client.fetch_rate().await?;
    let path = &client.config().output_path;
    write_output(path, value)?;
    info!(value, path = %path.display(), "Saved dollar rate");
    Ok(value)
}
