//! Calendar codec.
//!
//! Daily bucket records are keyed by a `YYYY-MM-DD` string computed from a
//! UTC unix timestamp. The on-chain program computes the same string with the
//! same walk, so this module must not drift from it: midnight normalisation,
//! a year walk from 1970 using the proleptic Gregorian leap rule, then a month
//! walk over a leap-aware table.

use chrono::Utc;

use crate::error::{MushiError, MushiResult};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// 9999-12-31 23:59:59 UTC, the last instant with a four-digit year.
pub const MAX_TIMESTAMP: i64 = 253_402_300_799;

const EPOCH_YEAR: i64 = 1970;
const DAYS_IN_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Start of the UTC day containing `timestamp`. Only `0..=MAX_TIMESTAMP`
/// is accepted.
pub fn midnight(timestamp: i64) -> MushiResult<i64> {
    if !(0..=MAX_TIMESTAMP).contains(&timestamp) {
        return Err(MushiError::InvalidTimestamp(timestamp));
    }
    Ok(timestamp - timestamp % SECONDS_PER_DAY)
}

pub fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Encodes a unix timestamp as the bucket key `YYYY-MM-DD`.
pub fn day_string(timestamp: i64) -> MushiResult<String> {
    let mut days = midnight(timestamp)? / SECONDS_PER_DAY;

    let mut year = EPOCH_YEAR;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }

    let mut month = 0usize;
    while month < DAYS_IN_MONTH.len() {
        let len = if month == 1 && is_leap_year(year) {
            29
        } else {
            DAYS_IN_MONTH[month]
        };
        if days < len {
            break;
        }
        days -= len;
        month += 1;
    }

    Ok(format!("{:04}-{:02}-{:02}", year, month + 1, days + 1))
}

/// Current wall-clock time as a unix timestamp.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Bucket key of the current UTC day.
pub fn today() -> MushiResult<String> {
    day_string(now_unix())
}

/// Bucket key `days` whole days after `timestamp`.
pub fn day_string_after(timestamp: i64, days: u64) -> MushiResult<String> {
    let offset = i64::try_from(days)
        .ok()
        .and_then(|d| d.checked_mul(SECONDS_PER_DAY))
        .and_then(|secs| timestamp.checked_add(secs))
        .ok_or_else(|| MushiError::invalid_input(format!("{days} days overflows the calendar")))?;
    day_string(offset)
}
