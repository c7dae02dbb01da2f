//! Timestamp utilities
//!
//! Timestamps are stored as integer microseconds since the Unix epoch.

use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as stored microseconds
pub fn now_micros() -> i64 {
    now().timestamp_micros()
}

/// Convert stored microseconds back to a timestamp
pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Internal(format!("timestamp out of range: {}", micros)))
}
