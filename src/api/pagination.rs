//! Offset pagination over a table's rows
//!
//! Pages are pulled strictly in order. A transient failure retries the same
//! offset after a delay, a 401 forces a token refresh first, and anything else
//! stops the run. Whatever was fetched before a stop is returned.

use super::constants::MAX_PAGE_SIZE;
use super::error::ApiResult;
use super::models::Filter;
use super::resilience::{FetchConfig, RetryableError};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::fmt;

/// Log a progress line every this many rows
const PROGRESS_EVERY_ROWS: usize = 10_000;

/// Something that can serve one page of table rows
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, table_id: &str, filters: &[Filter], limit: usize, offset: usize) -> ApiResult<Vec<Value>>;

    /// Make sure a usable access token is cached
    async fn ensure_token(&self) -> bool;

    /// Discard the cached access token and obtain a new one
    async fn force_refresh(&self) -> bool;
}

/// Position of one pagination run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchCursor {
    pub offset: usize,
    pub fetched: usize,
    pub page_size: usize,
    pub since_refresh: usize,
    /// Failed attempts at the current offset
    pub attempt: u32,
}

impl FetchCursor {
    fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    fn advance(&mut self, rows: usize) {
        self.offset += rows;
        self.fetched += rows;
        self.since_refresh += rows;
        self.attempt = 0;
    }
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// A short page marked the end of the table
    Complete,
    /// The row cap was reached; rows were truncated to it
    RowCap,
    /// No usable token could be obtained
    AuthRequired,
    /// One page kept failing with transient errors
    RetriesExhausted { offset: usize, last_error: String },
    /// A failure that retrying will not fix
    Failed { offset: usize, error: String },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Complete => write!(f, "complete"),
            StopReason::RowCap => write!(f, "row limit reached"),
            StopReason::AuthRequired => write!(f, "authentication required"),
            StopReason::RetriesExhausted { offset, last_error } => {
                write!(f, "gave up at offset {} after retries: {}", offset, last_error)
            }
            StopReason::Failed { offset, error } => write!(f, "failed at offset {}: {}", offset, error),
        }
    }
}

/// A failure seen during the run, whether or not it was recovered
#[derive(Debug, Clone, PartialEq)]
pub struct FetchIssue {
    pub offset: usize,
    pub attempt: u32,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub rows: Vec<Value>,
    pub pages: usize,
    pub requests: usize,
    pub stop: StopReason,
    pub issues: Vec<FetchIssue>,
}

impl FetchReport {
    /// Every row the table had (or the cap allowed) was fetched
    pub fn is_complete(&self) -> bool {
        matches!(self.stop, StopReason::Complete | StopReason::RowCap)
    }
}

/// Fetch all rows of `table_id` matching `filters`.
///
/// Never fails: problems end the run and are described by the report's
/// `stop` and `issues`.
pub async fn fetch_all(
    source: &dyn PageSource,
    table_id: &str,
    filters: &[Filter],
    config: &FetchConfig,
) -> FetchReport {
    // A page size above what the server returns would make the first full page
    // look short and end the run early
    let mut cursor = FetchCursor::new(config.page_size.clamp(1, MAX_PAGE_SIZE));
    let mut report = FetchReport {
        rows: Vec::new(),
        pages: 0,
        requests: 0,
        stop: StopReason::Complete,
        issues: Vec::new(),
    };

    if !source.ensure_token().await {
        warn!("No valid token for table {}, not fetching", table_id);
        report.stop = StopReason::AuthRequired;
        return report;
    }

    let mut next_progress = PROGRESS_EVERY_ROWS;

    loop {
        if cursor.fetched >= config.max_rows {
            report.rows.truncate(config.max_rows);
            info!("Row limit {} reached for table {}", config.max_rows, table_id);
            report.stop = StopReason::RowCap;
            break;
        }

        if config.refresh_every_rows > 0 && cursor.since_refresh >= config.refresh_every_rows {
            debug!("Proactive token check after {} rows", cursor.since_refresh);
            if !source.ensure_token().await {
                warn!("Proactive token refresh failed at offset {}", cursor.offset);
                report.issues.push(FetchIssue {
                    offset: cursor.offset,
                    attempt: cursor.attempt,
                    error: "proactive token refresh failed".to_string(),
                });
            }
            cursor.since_refresh = 0;
        }

        report.requests += 1;
        let failure = match source
            .fetch_page(table_id, filters, cursor.page_size, cursor.offset)
            .await
        {
            Ok(page) => {
                let count = page.len();
                report.pages += 1;
                report.rows.extend(page);
                cursor.advance(count);

                if cursor.fetched >= next_progress {
                    info!("Fetched {} rows from table {}", cursor.fetched, table_id);
                    next_progress = (cursor.fetched / PROGRESS_EVERY_ROWS + 1) * PROGRESS_EVERY_ROWS;
                }

                if count < cursor.page_size {
                    report.rows.truncate(config.max_rows);
                    report.stop = StopReason::Complete;
                    break;
                }
                continue;
            }
            Err(failure) => failure,
        };

        let kind = RetryableError::from_failure(&failure);
        cursor.attempt += 1;
        report.issues.push(FetchIssue {
            offset: cursor.offset,
            attempt: cursor.attempt,
            error: failure.to_string(),
        });

        if !kind.is_recoverable() {
            warn!("Fetch of table {} failed at offset {}: {}", table_id, cursor.offset, failure);
            report.stop = StopReason::Failed {
                offset: cursor.offset,
                error: failure.to_string(),
            };
            break;
        }

        if cursor.attempt >= config.retry.max_attempts {
            warn!(
                "Giving up on table {} at offset {} after {} attempts: {}",
                table_id, cursor.offset, cursor.attempt, failure
            );
            report.stop = StopReason::RetriesExhausted {
                offset: cursor.offset,
                last_error: failure.to_string(),
            };
            break;
        }

        if kind == RetryableError::AuthError {
            info!("Access token rejected at offset {}, refreshing", cursor.offset);
            if !source.force_refresh().await {
                report.stop = StopReason::AuthRequired;
                break;
            }
            cursor.since_refresh = 0;
            continue;
        }

        let delay = config.retry.delay_for(&kind, cursor.attempt);
        warn!(
            "Transient failure at offset {} (attempt {}/{}), retrying in {:?}: {}",
            cursor.offset, cursor.attempt, config.retry.max_attempts, delay, failure
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    info!(
        "Fetched {} rows from table {} in {} requests ({})",
        report.rows.len(),
        table_id,
        report.requests,
        report.stop
    );
    report
}
