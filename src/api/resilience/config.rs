//! Fetch configuration with builder pattern
//!
//! Bounds for a paginated pull: page size, row cap, proactive token refresh
//! interval and the retry policy applied to each page.

use super::super::constants::MAX_PAGE_SIZE;
use super::retry::RetryConfig;

/// Limits for one paginated fetch run
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub page_size: usize,
    pub max_rows: usize,
    /// Re-check the access token after this many rows since the last check
    pub refresh_every_rows: usize,
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_rows: 100_000,
            refresh_every_rows: 20_000,
            retry: RetryConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Create a new builder for FetchConfig
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::new()
    }
}

/// Builder for FetchConfig
#[derive(Debug, Clone, Default)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.config.max_rows = max_rows;
        self
    }

    pub fn refresh_every_rows(mut self, rows: usize) -> Self {
        self.config.refresh_every_rows = rows;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the configuration. The page size is clamped to what the server accepts.
    pub fn build(mut self) -> FetchConfig {
        self.config.page_size = self.config.page_size.clamp(1, MAX_PAGE_SIZE);
        self.config.retry.max_attempts = self.config.retry.max_attempts.max(1);
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.page_size, 500);
        assert_eq!(config.max_rows, 100_000);
        assert_eq!(config.refresh_every_rows, 20_000);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_builder_clamps_page_size() {
        let config = FetchConfig::builder().page_size(5000).max_rows(250).build();
        assert_eq!(config.page_size, 500);
        assert_eq!(config.max_rows, 250);

        let config = FetchConfig::builder().page_size(0).max_attempts(0).build();
        assert_eq!(config.page_size, 1);
        assert_eq!(config.retry.max_attempts, 1);
    }
}
