//! Shared utility functions used across multiple modules.

/// Truncate text to at most 180 characters for status details.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
