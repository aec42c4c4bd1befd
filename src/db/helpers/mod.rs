use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use chrono::DateTime;
use rusqlite::types::ValueRef;

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} value {value} out of range"))
}

/// Display form of a row key, e.g. `2023-11-14 22:13:20` (UTC).
pub fn format_epoch_seconds(seconds: i64) -> Result<String> {
    DateTime::from_timestamp(seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .ok_or_else(|| anyhow!("time {seconds} is outside the representable range"))
}

/// Text rendering of a column value; NULL becomes an empty string.
///
/// Whole-number reals keep one decimal (`52.0`, not `52`) so exported files
/// match the format earlier exports were written in.
pub fn value_to_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) if v.is_finite() && v.fract() == 0.0 => format!("{v:.1}"),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
