use std::fmt;

use chrono::{DateTime, Local};

/// One timestamped event shown on the log page.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:  {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// Append-only record of what happened during this session.
///
/// Entries are never removed or reordered; the log lives as long as the
/// application process.
#[derive(Debug, Default)]
pub struct SessionLog {
    entries: Vec<LogEntry>,
}

impl SessionLog {
    /// Append an informational event stamped with the current local time.
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        self.push_at(Local::now(), message);
    }

    /// Append a failure event stamped with the current local time.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.push_at(Local::now(), message);
    }

    pub fn push_at(&mut self, timestamp: DateTime<Local>, message: impl Into<String>) {
        self.entries.push(LogEntry {
            timestamp,
            message: message.into(),
        });
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut log = SessionLog::default();
        // Out-of-order timestamps must not reorder entries.
        let later = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = Local.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        log.push_at(later, "first");
        log.push_at(earlier, "second");
        log.info("third");

        let messages: Vec<&str> = log.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn renders_timestamp_then_message() {
        let ts = Local.with_ymd_and_hms(2024, 5, 1, 9, 3, 7).unwrap();
        let entry = LogEntry {
            timestamp: ts,
            message: "hello".into(),
        };
        assert_eq!(entry.to_string(), "2024-05-01 09:03:07:  hello");
    }
}
