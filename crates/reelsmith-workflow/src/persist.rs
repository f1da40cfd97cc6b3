//! Fire-and-forget archiving of stage outputs to the document store.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use reelsmith_tools::documents::{Database, DocumentStore};

/// `"<Stage Title> - YYYY-mm-dd HH:MM"`.
pub fn archive_title(stage_title: &str, at: DateTime<Local>) -> String {
    format!("{stage_title} - {}", at.format("%Y-%m-%d %H:%M"))
}

#[derive(Clone)]
pub struct StageArchive {
    store: Arc<dyn DocumentStore>,
}

impl StageArchive {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a stage output in the background. Failures are logged and
    /// never reach the step that produced the output.
    pub fn save(&self, stage_title: &str, text: &str) -> JoinHandle<()> {
        let store = self.store.clone();
        let title = archive_title(stage_title, Local::now());
        let text = text.to_string();
        tokio::spawn(async move {
            match store.persist(Database::Outputs, &title, &text, &[]).await {
                Ok(page_id) => debug!(%title, page_id, "Archived stage output"),
                Err(e) => warn!(%title, error = %e, "Failed to archive stage output"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_archive_title_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(archive_title("SEO Analysis", at), "SEO Analysis - 2024-03-07 09:05");
    }
}
