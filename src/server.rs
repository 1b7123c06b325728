//! Rate Service: serves the latest USD-BRL bid on `GET /cotacao`.
//!
//! Each request fetches from upstream and stores the bid, each step under
//! its own deadline. The status line is only committed once the whole body
//! is ready.

use crate::core::config::ServiceConfig;
use crate::core::{Deadline, QuoteSource, RateResponse, RateSink};
use crate::providers::AwesomeApiProvider;
use crate::store::SqliteRateStore;
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

pub struct AppState {
    pub source: Arc<dyn QuoteSource>,
    pub sink: Arc<dyn RateSink>,
    pub config: ServiceConfig,
}

impl AppState {
    pub fn new(source: Arc<dyn QuoteSource>, sink: Arc<dyn RateSink>, config: ServiceConfig) -> Self {
        AppState {
            source,
            sink,
            config,
        }
    }

    pub fn from_config(config: ServiceConfig) -> Result<Self> {
        let source = AwesomeApiProvider::new(&config.upstream_base_url)
            .context("Failed to build upstream HTTP client")?;
        let sink = SqliteRateStore::new(&config.database_path);
        Ok(Self::new(Arc::new(source), Arc::new(sink), config))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/cotacao", get(get_rate))
        .fallback(not_found)
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn run(config: ServiceConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    let state = Arc::new(AppState::from_config(config)?);
    serve(listener, state, shutdown_signal()).await
}

pub async fn serve<S>(listener: TcpListener, state: Arc<AppState>, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Rate service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Rate service stopped unexpectedly")?;

    info!("Rate service has been shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[instrument(name = "RateRequest", skip(state))]
async fn get_rate(State(state): State<Arc<AppState>>) -> Response {
    // The request scope leaves room for both steps; each step is clamped to it.
    let request = Deadline::after(state.config.upstream_timeout + state.config.persist_timeout);
    let fetch_deadline = request.child(state.config.upstream_timeout);
    let quote = match fetch_deadline
        .run("upstream fetch", state.source.fetch_quote(&fetch_deadline))
        .await
    {
        Ok(quote) => quote,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Failed to fetch upstream quote");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let persist_deadline = request.child(state.config.persist_timeout);
    if let Err(e) = persist_deadline
        .run(
            "rate persistence",
            state.sink.save_bid(&persist_deadline, &quote.usd_brl.bid),
        )
        .await
    {
        warn!(error = %format!("{e:#}"), "Failed to persist rate");
        return plain_error(format!("Failed to save rate to database: {e:#}"));
    }

    let response = RateResponse::from(&quote);
    match serde_json::to_vec(&response) {
        Ok(body) => {
            info!(bid = %response.bid, "Served rate");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response()
        }
        Err(e) => plain_error(format!("Failed to build JSON response: {e}")),
    }
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn plain_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RateQuote;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct StaticSource {
        body: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StaticSource {
        fn bid(bid: &str) -> Self {
            StaticSource {
                body: Some(format!(r#"{{"USDBRL": {{"bid": "{bid}"}}}}"#)),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            StaticSource {
                body: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl QuoteSource for StaticSource {
        async fn fetch_quote(&self, _deadline: &Deadline) -> Result<RateQuote> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let body = self
                .body
                .as_deref()
                .ok_or_else(|| anyhow!("Request error: connection refused"))?;
            Ok(serde_json::from_str(body)?)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        bids: Mutex<Vec<String>>,
        delay: Duration,
        failure: Option<&'static str>,
    }

    #[async_trait]
    impl RateSink for RecordingSink {
        async fn save_bid(&self, _deadline: &Deadline, bid: &str) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            if let Some(failure) = self.failure {
                return Err(anyhow!(failure));
            }
            self.bids.lock().unwrap().push(bid.to_string());
            Ok(())
        }
    }

    async fn spawn_service(source: Arc<StaticSource>, sink: Arc<RecordingSink>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(AppState::new(source, sink, ServiceConfig::default()));
        tokio::spawn(serve(listener, state, std::future::pending::<()>()));
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_serves_bid_verbatim() {
        let source = Arc::new(StaticSource::bid("5.12340"));
        let sink = Arc::new(RecordingSink::default());
        let base = spawn_service(Arc::clone(&source), Arc::clone(&sink)).await;

        let response = reqwest::get(format!("{base}/cotacao")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            "application/json"
        );
        let body: RateResponse = response.json().await.unwrap();
        assert_eq!(body.bid, "5.12340");
        assert_eq!(*sink.bids.lock().unwrap(), vec!["5.12340".to_string()]);
    }

    #[tokio::test]
    async fn test_upstream_failure_returns_empty_500() {
        let source = Arc::new(StaticSource::failing());
        let sink = Arc::new(RecordingSink::default());
        let base = spawn_service(source, Arc::clone(&sink)).await;

        let response = reqwest::get(format!("{base}/cotacao")).await.unwrap();
        assert_eq!(response.status(), 500);
        assert!(response.text().await.unwrap().is_empty());
        assert!(sink.bids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let source = Arc::new(StaticSource::bid("5.0").delayed(Duration::from_secs(5)));
        let sink = Arc::new(RecordingSink::default());
        let base = spawn_service(source, Arc::clone(&sink)).await;

        let started = Instant::now();
        let response = reqwest::get(format!("{base}/cotacao")).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(response.status(), 500);
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(800), "took {elapsed:?}");
        assert!(sink.bids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_persistence_times_out() {
        let source = Arc::new(StaticSource::bid("5.4321"));
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let base = spawn_service(source, Arc::clone(&sink)).await;

        let response = reqwest::get(format!("{base}/cotacao")).await.unwrap();
        assert_eq!(response.status(), 500);
        let body = response.text().await.unwrap();
        assert!(body.starts_with("Failed to save rate to database:"));
        assert!(body.contains("rate persistence exceeded its deadline of 10ms"));
        assert!(!body.contains("5.4321"));
        assert!(sink.bids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_fetch_leaves_persistence_its_own_budget() {
        let source = Arc::new(StaticSource::bid("5.0").delayed(Duration::from_millis(150)));
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_secs(2),
            ..Default::default()
        });
        let base = spawn_service(source, Arc::clone(&sink)).await;

        let started = Instant::now();
        let response = reqwest::get(format!("{base}/cotacao")).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(response.status(), 500);
        let body = response.text().await.unwrap();
        assert!(body.contains("rate persistence exceeded its deadline of 10ms"));
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(800), "took {elapsed:?}");
        assert!(sink.bids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_error_is_echoed() {
        let source = Arc::new(StaticSource::bid("5.0"));
        let sink = Arc::new(RecordingSink {
            failure: Some("Failed to insert rate: disk I/O error"),
            ..Default::default()
        });
        let base = spawn_service(source, sink).await;

        let response = reqwest::get(format!("{base}/cotacao")).await.unwrap();
        assert_eq!(response.status(), 500);
        assert_eq!(
            response.text().await.unwrap(),
            "Failed to save rate to database: Failed to insert rate: disk I/O error"
        );
    }

    #[tokio::test]
    async fn test_unknown_paths_are_not_found() {
        let source = Arc::new(StaticSource::bid("5.0"));
        let sink = Arc::new(RecordingSink::default());
        let base = spawn_service(Arc::clone(&source), Arc::clone(&sink)).await;

        for path in ["/", "/cotacao/", "/cotacoes", "/cotacao/extra"] {
            let response = reqwest::get(format!("{base}{path}")).await.unwrap();
            assert_eq!(response.status(), 404, "path {path}");
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(sink.bids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_methods_are_rejected() {
        let source = Arc::new(StaticSource::bid("5.0"));
        let sink = Arc::new(RecordingSink::default());
        let base = spawn_service(Arc::clone(&source), sink).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/cotacao"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 405);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
