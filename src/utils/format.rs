use chrono::{DateTime, Local, Utc};

use crate::models::TimeRecord;

/// `HH:MM:SS`, zero padded. Hours keep counting past 24.
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// `YYYY-MM-DD HH:MM` in local time.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

pub fn format_stop_summary(record: &TimeRecord) -> String {
    format!(
        "Last stopped at: {} ({}m {}s)",
        format_timestamp(&record.timestamp),
        record.seconds / 60,
        record.seconds % 60
    )
}
