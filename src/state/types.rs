//! Types for the status store.

use chrono::{DateTime, Utc};

/// Transfer status of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageStatus {
    /// Scheduled, not yet transferred.
    New,
    /// Pushed to the target; `request_id` holds the async job.
    Processed,
    /// Fetch or push failed. Only `reset_failed` moves it back to `New`.
    Failed,
}

impl PageStatus {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A data extension known in the origin environment, optionally matched
/// to one in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub origin_instance: String,
    pub origin_external_key: String,
    pub target_instance: Option<String>,
    pub target_external_key: Option<String>,
}

impl CatalogEntry {
    /// Both sides are known, so rows can move.
    pub fn is_transfer_eligible(&self) -> bool {
        self.target_instance.is_some() && self.target_external_key.is_some()
    }
}

/// A page to be created by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub url: String,
    pub catalog_entry_id: i64,
    pub has_natural_key: bool,
}

/// A bounded slice of an entry's rows, identified by its fetch URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub id: i64,
    pub url: String,
    pub catalog_entry_id: i64,
    pub status: PageStatus,
    pub has_natural_key: bool,
    pub request_id: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Counts shown by the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub entries: u64,
    pub linked_entries: u64,
    pub pages_new: u64,
    pub pages_processed: u64,
    pub pages_failed: u64,
    pub last_run_started: Option<DateTime<Utc>>,
    pub last_run_completed: Option<DateTime<Utc>>,
}

/// Statistics recorded when a populate run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRunStats {
    pub entries_linked: u64,
    pub pages_scheduled: u64,
    pub pages_processed: u64,
    pub pages_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_status_roundtrip() {
        for status in [PageStatus::New, PageStatus::Processed, PageStatus::Failed] {
            assert_eq!(PageStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(PageStatus::from_str("pending"), None);
    }

    #[test]
    fn test_entry_eligibility_requires_target() {
        let mut entry = CatalogEntry {
            id: 1,
            name: "Customers".into(),
            origin_instance: "qa".into(),
            origin_external_key: "CUST".into(),
            target_instance: None,
            target_external_key: None,
        };
        assert!(!entry.is_transfer_eligible());
        entry.target_instance = Some("prod".into());
        assert!(!entry.is_transfer_eligible());
        entry.target_external_key = Some("CUST-P".into());
        assert!(entry.is_transfer_eligible());
    }
}
