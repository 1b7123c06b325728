//! Deadline-bound execution context.
//!
//! A [`Deadline`] carries an absolute expiry. Steps run through
//! [`Deadline::run`] are dropped the moment the expiry passes, which closes
//! any socket or storage handle the step still owns. Child deadlines never
//! outlive their parent, and dropping the enclosing task drops every step
//! still running inside it.

use anyhow::Result;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
#[error("{step} exceeded its deadline of {budget:?}")]
pub struct DeadlineExceeded {
    pub step: String,
    pub budget: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Deadline {
            expires_at: Instant::now() + budget,
            budget,
        }
    }

    /// Derives a deadline that expires after `budget` or with `self`,
    /// whichever comes first.
    pub fn child(&self, budget: Duration) -> Self {
        let own = Instant::now() + budget;
        Deadline {
            expires_at: own.min(self.expires_at),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Drives `step` to completion unless the deadline passes first, in which
    /// case the future is dropped and [`DeadlineExceeded`] is returned.
    pub async fn run<T, F>(&self, name: &str, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(self.expires_at, step).await {
            Ok(result) => result,
            Err(_) => Err(DeadlineExceeded {
                step: name.to_string(),
                budget: self.budget,
            }
            .into()),
        }
    }
}
