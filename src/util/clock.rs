//! Wall-clock helpers.

use chrono::{DateTime, Utc};

/// Current instant in UTC.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds left until `deadline`, zero once it has passed.
#[must_use]
pub fn remaining_ms(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((deadline - now).num_milliseconds()).unwrap_or(0)
}
