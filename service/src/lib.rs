//! Tasa Rate Service
//!
//! Drives derivation runs: snapshot the pair graph and manual overrides,
//! fetch tracked quotes concurrently, derive, write back, and keep a report
//! of the last run for administrative visibility.

pub mod config;
pub mod metrics;
pub mod report;
pub mod service;
pub mod state;

pub use config::ServiceConfig;
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use report::{RunReport, RunStatus};
pub use service::{quote_requests, RateService};
pub use state::ServiceState;
