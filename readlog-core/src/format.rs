//! Formatting helpers shared across the CLI and analytics.

use chrono::{DateTime, Utc};

/// Format elapsed seconds as `H:MM:SS`, or `M:SS` under an hour.
pub fn format_clock(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Format a reading-time estimate given in hours.
///
/// Under an hour: `"45m"`. Under a day: `"2h 30m"`. Otherwise whole days.
pub fn format_hours(hours: f64) -> String {
    if !hours.is_finite() || hours <= 0.0 {
        return "0m".to_string();
    }

    let total_minutes = (hours * 60.0).round() as i64;
    if total_minutes < 60 {
        format!("{}m", total_minutes.max(1))
    } else if hours < 24.0 {
        let h = total_minutes / 60;
        let m = total_minutes % 60;
        format!("{}h {}m", h, m)
    } else {
        let days = (hours / 24.0).round() as i64;
        if days == 1 {
            "1 day".to_string()
        } else {
            format!("{} days", days)
        }
    }
}

/// Format total reading minutes for display (e.g., "12h 5m").
pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// Format a percentage change for display (e.g., "+23%" or "-15%").
pub fn format_delta(delta: f64) -> String {
    if delta >= 0.0 {
        format!("+{:.0}%", delta)
    } else {
        format!("{:.0}%", delta)
    }
}

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}
