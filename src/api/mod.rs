pub mod client;
pub mod constants;
pub mod error;
pub mod manager;
pub mod models;
pub mod pagination;
pub mod resilience;

pub use client::ApiClient;
pub use error::{ApiFailure, ApiResult};
pub use manager::{ClientManager, EnvironmentStatus};
pub use models::{AggregateQuery, AuthRequired, Environment, Filter, Metric, SessionCredential};
pub use pagination::{FetchCursor, FetchIssue, FetchReport, PageSource, StopReason, fetch_all};
pub use resilience::{FetchConfig, RetryConfig};
