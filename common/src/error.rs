//! Error types for the Tasa rate engine.

use thiserror::Error;

/// Main error type for Tasa operations.
///
/// Errors tied to a single pair (configuration, missing quotes, bad arithmetic,
/// failed writes) never abort a run for other pairs; only `NoQuotesAvailable`
/// and `RunInProgress` are run-level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TasaError {
    /// Bad pair configuration: missing or inactive base, bad percentage, bad
    /// tracking parameters.
    #[error("Configuration error for {pair}: {reason}")]
    ConfigurationError { pair: String, reason: String },

    /// Base-pair references form a cycle.
    #[error("Cycle detected in base pair references: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// The quote source could not price a pair.
    #[error("Quote unavailable for {pair}: {reason}")]
    QuoteUnavailable { pair: String, reason: String },

    /// A rate this pair depends on was not resolved in this run.
    #[error("Missing dependency for {pair}: {missing} not available")]
    MissingDependency { pair: String, missing: String },

    /// Non-positive result, overflow or division by zero.
    #[error("Invalid computation for {pair}: {reason}")]
    InvalidComputation { pair: String, reason: String },

    /// Rate store write or read failed.
    #[error("Persistence error for {pair}: {reason}")]
    PersistenceError { pair: String, reason: String },

    /// Every marketplace query of a run failed.
    #[error("No quotes available: {failed} of {attempted} queries failed")]
    NoQuotesAvailable { attempted: usize, failed: usize },

    /// A run is already executing.
    #[error("A derivation run is already in progress")]
    RunInProgress,

    /// Malformed or duplicate currency.
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl TasaError {
    /// Shorthand for a configuration error.
    pub fn config(pair: impl Into<String>, reason: impl Into<String>) -> Self {
        TasaError::ConfigurationError {
            pair: pair.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a persistence error.
    pub fn persistence(pair: impl Into<String>, reason: impl ToString) -> Self {
        TasaError::PersistenceError {
            pair: pair.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Persistence failures are retried by the next scheduled run, not
    /// immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TasaError::QuoteUnavailable { .. }
                | TasaError::PersistenceError { .. }
                | TasaError::NoQuotesAvailable { .. }
                | TasaError::RunInProgress
        )
    }

    /// Get error code for reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            TasaError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            TasaError::CycleDetected(_) => "CYCLE_DETECTED",
            TasaError::QuoteUnavailable { .. } => "QUOTE_UNAVAILABLE",
            TasaError::MissingDependency { .. } => "MISSING_DEPENDENCY",
            TasaError::InvalidComputation { .. } => "INVALID_COMPUTATION",
            TasaError::PersistenceError { .. } => "PERSISTENCE_ERROR",
            TasaError::NoQuotesAvailable { .. } => "NO_QUOTES_AVAILABLE",
            TasaError::RunInProgress => "RUN_IN_PROGRESS",
            TasaError::InvalidCurrency(_) => "INVALID_CURRENCY",
            TasaError::NotFound(_) => "NOT_FOUND",
        }
    }
}

/// Result type alias for Tasa operations.
pub type Result<T> = std::result::Result<T, TasaError>;
