//! Per-run report: stage name to stage result.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Shared by every step of one run and dropped when the run ends.
///
/// A stage that runs again after a loop-back overwrites its key.
#[derive(Debug, Clone, Default)]
pub struct Report {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, returning the value it replaced.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let report = Report::new();
        assert_eq!(report.insert("Final_Script", "draft 1"), None);
        assert_eq!(
            report.insert("Final_Script", "draft 2"),
            Some("draft 1".to_string())
        );
        assert_eq!(report.get("Final_Script").as_deref(), Some("draft 2"));
        assert_eq!(report.snapshot().len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let report = Report::new();
        let other = report.clone();
        other.insert("SEO_Analysis", "keywords");
        assert_eq!(report.get("SEO_Analysis").as_deref(), Some("keywords"));
    }
}
