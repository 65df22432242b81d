use chrono::{DateTime, Months, Utc};
use serde::Serialize;

/// Start of the next quota window: one calendar month after the last reset.
/// Month-end dates clamp, so Jan 31 rolls over on the last day of February.
pub fn next_reset(last_reset: DateTime<Utc>) -> DateTime<Utc> {
    last_reset
        .checked_add_months(Months::new(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// True once `now` has reached the end of the current window.
pub fn reset_due(last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= next_reset(last_reset)
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub dreams_count: i64,
    pub dreams_limit: i64,
    pub remaining: i64,
    pub next_reset: DateTime<Utc>,
}

impl QuotaStatus {
    pub fn new(dreams_count: i64, dreams_limit: i64, last_reset: DateTime<Utc>) -> Self {
        Self {
            dreams_count,
            dreams_limit,
            remaining: (dreams_limit - dreams_count).max(0),
            next_reset: next_reset(last_reset),
        }
    }
}
