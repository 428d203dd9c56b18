//! Program-day clock
//!
//! Maps event timestamps to a 1-based day index relative to the campaign
//! epoch. Day 1 starts at the epoch instant; a timestamp one hour before the
//! epoch lands on day 0. Callers treat day < 1 as "not yet running".

use chrono::{NaiveDateTime, Utc};

use crate::error::MannaError;

/// Format for the configured epoch start, e.g. `2023-05-13T22:20`.
pub const EPOCH_FORMAT: &str = "%Y-%m-%dT%H:%M";

const SECS_PER_DAY: i64 = 86_400;

/// Parse the configured epoch start (UTC) into unix seconds.
pub fn parse_epoch(start_at: &str) -> Result<i64, MannaError> {
    let dt = NaiveDateTime::parse_from_str(start_at, EPOCH_FORMAT)
        .map_err(|e| MannaError::Config(format!("Invalid epoch start '{}': {}", start_at, e)))?;
    Ok(dt.and_utc().timestamp())
}

/// 1-based program day for a timestamp. Floor division, so pre-epoch
/// timestamps yield day <= 0 rather than wrapping to day 1.
pub fn program_day(epoch_secs: i64, ts_secs: i64) -> i64 {
    1 + (ts_secs - epoch_secs).div_euclid(SECS_PER_DAY)
}

/// Program day of the current wall-clock instant.
pub fn today(epoch_secs: i64) -> i64 {
    program_day(epoch_secs, Utc::now().timestamp())
}
