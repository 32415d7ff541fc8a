use chrono::{DateTime, Utc};

use crate::error::{FormatError, FormatResult};

/// The current time, truncated to whole milliseconds so it survives a round
/// trip through a header.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

pub(crate) fn to_millis(time: &DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp_millis()).unwrap_or(0)
}

pub(crate) fn from_millis(millis: u64) -> FormatResult<DateTime<Utc>> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| FormatError::corrupt_header(format!("generate time {millis} out of range")))
}
