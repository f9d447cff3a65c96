//! Schedule oracle abstraction.
//!
//! Recurrence specs are opaque to the supervisor. An oracle turns a spec and a
//! reference instant into the next fire time.

use chrono::{DateTime, Utc};

use crate::core::ScheduleError;

/// Computes the next occurrence of a recurrence spec.
///
/// # Example
///
/// ```rust,ignore
/// struct Hourly;
///
/// impl ScheduleOracle for Hourly {
///     fn next_after(&self, _spec: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
///         Ok(after + chrono::Duration::hours(1))
///     }
/// }
/// ```
pub trait ScheduleOracle: Send + Sync {
    /// Next fire time strictly after `after`, or an error for a malformed spec.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::Malformed` when the spec cannot be parsed.
    fn next_after(&self, spec: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError>;
}
