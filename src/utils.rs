//! Utility functions for progress reporting and formatting
use time::{format_description, OffsetDateTime};

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Whole-percent progress, 100 when there is nothing to do
pub fn progress_percent(done: u32, total: u32) -> u32 {
    if total == 0 {
        return 100;
    }
    ((done as u64 * 100) / total as u64) as u32
}
