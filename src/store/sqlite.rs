use crate::core::{Deadline, RateSink};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use rusqlite::{Connection, InterruptHandle, params};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument};

pub const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS cotacoes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        valor REAL,
        data_criacao TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )";

pub const INSERT_SQL: &str = "INSERT INTO cotacoes (valor) VALUES (?1)";

/// SQLite-backed rate sink. A fresh connection is opened and closed for
/// every call, so nothing is shared between requests.
pub struct SqliteRateStore {
    path: PathBuf,
}

impl SqliteRateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RateSink for SqliteRateStore {
    #[instrument(name = "RatePersist", skip(self, deadline), fields(path = %self.path.display()))]
    async fn save_bid(&self, deadline: &Deadline, bid: &str) -> Result<()> {
        let path = self.path.clone();
        let bid = bid.to_string();
        let busy_timeout = deadline.remaining();
        let cancellation = Arc::new(Cancellation::default());
        let worker = Arc::clone(&cancellation);

        deadline
            .run("rate persistence", async move {
                let _cancel_on_drop = CancelOnDrop(cancellation);
                tokio::task::spawn_blocking(move || insert_bid(&path, &bid, busy_timeout, &worker))
                    .await
                    .context("Persistence worker failed")?
            })
            .await?;

        debug!("Stored rate row");
        Ok(())
    }
}

fn insert_bid(
    path: &Path,
    bid: &str,
    busy_timeout: Duration,
    cancellation: &Cancellation,
) -> Result<()> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;

    if !cancellation.register(&conn) {
        bail!("Persistence cancelled before writing to {}", path.display());
    }

    conn.busy_timeout(busy_timeout)
        .context("Failed to configure database busy timeout")?;
    conn.execute(CREATE_TABLE_SQL, [])
        .context("Failed to create rates table")?;

    write_row(&mut conn, bid, cancellation)
}

/// Inserts the row inside a transaction that is only committed while the
/// caller is still waiting for it.
fn write_row(conn: &mut Connection, bid: &str, cancellation: &Cancellation) -> Result<()> {
    if cancellation.is_cancelled() {
        bail!("Persistence cancelled before inserting rate");
    }

    let tx = conn.transaction().context("Failed to begin transaction")?;
    tx.execute(INSERT_SQL, params![bid])
        .context("Failed to insert rate")?;

    if cancellation.is_cancelled() {
        // Dropping the transaction rolls the insert back.
        bail!("Persistence cancelled before committing rate");
    }
    tx.commit().context("Failed to commit rate")?;

    Ok(())
}

/// VM steps between two checks of the cancelled flag. A single row insert
/// runs only a handful of steps, so the flag is checked on every one.
const PROGRESS_STEPS: i32 = 1;

/// Lets the async side stop the work running on the blocking pool.
#[derive(Default)]
struct Cancellation {
    cancelled: Arc<AtomicBool>,
    handle: Mutex<Option<InterruptHandle>>,
}

impl Cancellation {
    /// Hooks the connection up to the cancelled flag. Returns false when the
    /// caller gave up before the connection opened.
    fn register(&self, conn: &Connection) -> bool {
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(conn.get_interrupt_handle());
        }

        // An interrupt only reaches a statement that is already running, so
        // statements started after cancellation are stopped here.
        let cancelled = Arc::clone(&self.cancelled);
        conn.progress_handler(
            PROGRESS_STEPS,
            Some(move || cancelled.load(Ordering::SeqCst)),
        );

        !self.is_cancelled()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(slot) = self.handle.lock() {
            if let Some(handle) = slot.as_ref() {
                handle.interrupt();
            }
        }
    }
}

// Interrupting a closed connection is a no-op, so this also runs on success.
struct CancelOnDrop(Arc<Cancellation>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
