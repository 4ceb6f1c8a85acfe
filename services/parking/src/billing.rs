//! Time-based parking fees
//!
//! Billing is a pure function of the entry/exit timestamps and the hourly
//! rate: `max(1, floor(seconds / 3600)) * rate`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ParkingError, ParkingResult};

pub const SECONDS_PER_HOUR: i64 = 3600;

/// Rate used when nothing else is configured, in currency units per hour
pub const DEFAULT_RATE_PER_HOUR: i64 = 20;

/// Fee breakdown for one stay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fee {
    pub duration_seconds: i64,
    /// At least one hour; partial hours beyond the first are not billed
    pub billable_hours: i64,
    pub amount: i64,
}

/// Compute the fee for a stay from `entry` to `exit`.
///
/// `exit` before `entry` is an internal fault, never a user error.
pub fn compute_fee(
    entry: DateTime<Utc>,
    exit: DateTime<Utc>,
    rate_per_hour: i64,
) -> ParkingResult<Fee> {
    let duration_seconds = (exit - entry).num_seconds();
    if duration_seconds < 0 {
        return Err(ParkingError::Internal(format!(
            "Exit time {} precedes entry time {}",
            exit, entry
        )));
    }

    let billable_hours = (duration_seconds / SECONDS_PER_HOUR).max(1);
    let amount = billable_hours.checked_mul(rate_per_hour).ok_or_else(|| {
        ParkingError::Internal(format!(
            "Fee overflow for {} hours at rate {}",
            billable_hours, rate_per_hour
        ))
    })?;

    Ok(Fee {
        duration_seconds,
        billable_hours,
        amount,
    })
}
