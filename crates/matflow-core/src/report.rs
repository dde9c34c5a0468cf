//! Report log
//!
//! Append-only, timestamped record of what the orchestrator did. It is
//! persisted with every snapshot so a resumed run keeps its history.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One report message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// When it was reported
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub message: String,
}

/// Append-only report log
#[derive(Debug, Default)]
pub struct ReportLog {
    inner: Mutex<Vec<ReportEntry>>,
}

impl ReportLog {
    /// Empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and emit it through `tracing`
    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "matflow::report", "{message}");
        self.inner.lock().push(ReportEntry {
            timestamp: Utc::now(),
            message,
        });
    }

    /// Copy of every entry
    #[must_use]
    pub fn entries(&self) -> Vec<ReportEntry> {
        self.inner.lock().clone()
    }

    /// Messages only, in order
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.inner
            .lock()
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing was reported
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Clone for ReportLog {
    fn clone(&self) -> Self {
        Self {
            inner: Mutex::new(self.entries()),
        }
    }
}

impl PartialEq for ReportLog {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries()
    }
}

impl Serialize for ReportLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.lock().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReportLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self {
            inner: Mutex::new(Vec::deserialize(deserializer)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_appends_in_order() {
        let log = ReportLog::new();
        log.report("launching relax");
        log.report("relax finished");
        assert_eq!(log.messages(), vec!["launching relax", "relax finished"]);
        let entries = log.entries();
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[test]
    fn report_log_survives_serialization() {
        let log = ReportLog::new();
        log.report("a");
        let json = serde_json::to_string(&log).unwrap();
        let back: ReportLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
        assert_eq!(back.len(), 1);
    }
}
