//! Timestamp assembly from split date/time components.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Fill sentinel for timestamps: the Unix epoch.
pub const TIMESTAMP_FILL: i64 = 0;

/// Seconds since the Unix epoch for the given UTC components.
///
/// Returns None for impossible dates (month 13, hour 25, ...).
pub fn timestamp_from_parts(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(
        i32::try_from(year).ok()?,
        u32::try_from(month).ok()?,
        u32::try_from(day).ok()?,
    )?;
    let datetime = date.and_hms_opt(
        u32::try_from(hour).ok()?,
        u32::try_from(minute).ok()?,
        u32::try_from(second).ok()?,
    )?;
    Some(Utc.from_utc_datetime(&datetime).timestamp())
}

/// Timestamps with the same dimensions as their component fields.
///
/// Values are seconds since the epoch; records with any missing component
/// hold [`TIMESTAMP_FILL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeArray {
    dims: Vec<usize>,
    seconds: Vec<i64>,
}

impl DateTimeArray {
    pub fn new(dims: Vec<usize>, seconds: Vec<i64>) -> Self {
        Self { dims, seconds }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }

    /// Raw epoch seconds, fill included.
    pub fn seconds(&self) -> &[i64] {
        &self.seconds
    }

    pub fn fill_value(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn is_missing(&self, idx: usize) -> bool {
        self.seconds.get(idx).map_or(true, |s| *s == TIMESTAMP_FILL)
    }

    /// Timestamp at `idx`, None when it carries the fill value.
    pub fn get(&self, idx: usize) -> Option<DateTime<Utc>> {
        if self.is_missing(idx) {
            return None;
        }
        DateTime::<Utc>::from_timestamp(self.seconds[idx], 0)
    }

    /// Timestamp at `idx`, with the epoch standing in for missing values.
    pub fn get_or_fill(&self, idx: usize) -> DateTime<Utc> {
        self.get(idx).unwrap_or_else(|| self.fill_value())
    }
}
