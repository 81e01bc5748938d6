//! Human-readable formatting helpers

/// Format a duration in milliseconds as `m:ss`
pub fn format_duration(duration_ms: u64) -> String {
    let seconds = duration_ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
