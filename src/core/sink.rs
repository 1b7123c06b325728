//! Persistence abstraction for served rates

use crate::core::deadline::Deadline;
use anyhow::Result;
use async_trait::async_trait;

/// Append-only destination for fetched bids. Nothing in the service reads
/// the stored rows back.
#[async_trait]
pub trait RateSink: Send + Sync {
    /// Stores one row for `bid`. Every call appends, even for a repeated value.
    async fn save_bid(&self, deadline: &Deadline, bid: &str) -> Result<()>;
}
