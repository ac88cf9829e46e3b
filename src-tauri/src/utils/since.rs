// Human-scaled timestamps for table cells
use chrono::{DateTime, Utc};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

const DISPLAY_FORMAT: &str = "%d %b %Y | %I:%M";

/// Coarse relative age such as "3m ago", floored to the largest unit that is at least 1
pub fn since(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    // Clock skew can put server timestamps slightly in the future
    let secs = (now - timestamp).num_seconds().max(0);

    if secs >= DAY {
        format!("{}d ago", secs / DAY)
    } else if secs >= HOUR {
        format!("{}h ago", secs / HOUR)
    } else if secs >= MINUTE {
        format!("{}m ago", secs / MINUTE)
    } else {
        format!("{}s ago", secs)
    }
}

pub fn since_now(timestamp: DateTime<Utc>) -> String {
    since(timestamp, Utc::now())
}

/// Absolute time for submission/completion columns, "N/A" when unset
pub fn format_display_time(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|ts| ts.format(DISPLAY_FORMAT).to_string())
        .unwrap_or_else(|| "N/A".to_string())
}
