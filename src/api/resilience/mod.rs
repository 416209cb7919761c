//! Retry and fetch-limit settings for long-running data pulls

pub mod config;
pub mod retry;

pub use config::{FetchConfig, FetchConfigBuilder};
pub use retry::{Backoff, RetryConfig, RetryableError};
