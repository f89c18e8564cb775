//! Bounded, newest-first log of notable dashboard events.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::feed::FeedId;

pub const DEFAULT_ALERT_CAPACITY: usize = 10;

static ALERT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Millisecond timestamp plus a process-local sequence number.
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub feed_id: Option<FeedId>,
    /// Local wall-clock time, `HH:MM:SS`.
    pub timestamp: String,
}

impl Alert {
    pub fn new(message: impl Into<String>, severity: Severity, feed_id: Option<FeedId>) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = ALERT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("{}-{}", millis, seq),
            message: message.into(),
            severity,
            feed_id,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        }
    }
}

/// Alert payload pushed by the service over the streaming channel.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RemoteAlert {
    pub message: String,
    #[serde(default = "default_remote_severity")]
    pub severity: Severity,
    #[serde(default, alias = "feedId")]
    pub feed_id: Option<String>,
}

fn default_remote_severity() -> Severity {
    Severity::Medium
}

/// Fixed-capacity alert list. Index 0 is always the newest entry.
#[derive(Clone, Debug)]
pub struct AlertLog {
    entries: VecDeque<Alert>,
    capacity: usize,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ALERT_CAPACITY)
    }
}

impl AlertLog {
    /// A zero capacity is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, alert: Alert) {
        self.entries.push_front(alert);
        self.entries.truncate(self.capacity);
    }

    pub fn record(
        &mut self,
        message: impl Into<String>,
        severity: Severity,
        feed_id: Option<FeedId>,
    ) -> &Alert {
        self.push(Alert::new(message, severity, feed_id));
        &self.entries[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Alert> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first_and_bounded() {
        let mut log = AlertLog::with_capacity(5);
        for i in 0..12 {
            log.record(format!("event {i}"), Severity::Low, None);
            assert!(log.len() <= 5);
        }
        let messages: Vec<_> = log.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["event 11", "event 10", "event 9", "event 8", "event 7"]
        );
    }

    #[test]
    fn ids_are_unique() {
        let a = Alert::new("a", Severity::Low, None);
        let b = Alert::new("b", Severity::Low, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut log = AlertLog::default();
        log.record("same", Severity::High, None);
        log.record("same", Severity::High, None);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn remote_alert_defaults_severity() {
        let alert: RemoteAlert = serde_json::from_str(r#"{"message":"crowded"}"#).unwrap();
        assert_eq!(alert.severity, Severity::Medium);
        let alert: RemoteAlert =
            serde_json::from_str(r#"{"message":"x","severity":"critical","feedId":"feed2"}"#)
                .unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.feed_id.as_deref(), Some("feed2"));
    }
}
