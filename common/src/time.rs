//! Time utilities and defaults for Tasa runs.

use chrono::{DateTime, Duration, Utc};

/// Timing defaults.
pub mod constants {
    use super::Duration;

    /// Interval between scheduled derivation runs (5 minutes).
    pub fn default_run_interval() -> Duration {
        Duration::minutes(5)
    }

    /// Per-query marketplace timeout (30 seconds).
    pub fn default_quote_timeout() -> Duration {
        Duration::seconds(30)
    }

    /// Inactive rate rows older than this are pruned (7 days).
    pub fn default_history_retention() -> Duration {
        Duration::days(7)
    }
}

/// A timestamp, always UTC.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Cut-off timestamp for a retention window ending now, or `None` when the
/// window reaches past the representable range.
pub fn retention_cutoff(retention: Duration) -> Option<Timestamp> {
    now().checked_sub_signed(retention)
}

/// Duration extensions for convenient conversion.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_cutoff_is_in_the_past() {
        let cutoff = retention_cutoff(constants::default_history_retention()).unwrap();
        assert!(cutoff < now());
        assert!(now() - cutoff >= Duration::days(7));
    }

    #[test]
    fn test_retention_cutoff_out_of_range() {
        assert_eq!(retention_cutoff(Duration::days(100_000_000)), None);
    }

    #[test]
    fn test_negative_duration_as_std_is_zero() {
        assert_eq!(Duration::seconds(-5).as_std(), std::time::Duration::ZERO);
        assert_eq!(
            constants::default_quote_timeout().as_std(),
            std::time::Duration::from_secs(30)
        );
    }
}
