//! Core abstractions shared by the service and the client

pub mod config;
pub mod deadline;
pub mod log;
pub mod quote;
pub mod sink;

// Re-export main types for cleaner imports
pub use deadline::{Deadline, DeadlineExceeded};
pub use quote::{PairQuote, QuoteSource, RateQuote, RateResponse};
pub use sink::RateSink;
