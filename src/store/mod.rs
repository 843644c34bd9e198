//! Persistence for test history and the scan log.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    BuildId, MergeOutcome, ScanLogRecord, ScanStatus, TestCaseResult, TestHistoryRecord,
};

/// Key-value store holding test history and the scan log.
///
/// Implementations must make `create_history` and `append_result` atomic per
/// key: concurrent collectors for different builds may race on the same test.
#[async_trait]
pub trait Store: Send + Sync {
    async fn history(&self, test_name: &str) -> Result<Option<TestHistoryRecord>>;

    /// Create the record with `first` as its only snapshot.
    ///
    /// Returns `false` without writing if the record already exists.
    async fn create_history(&self, test_name: &str, first: &TestCaseResult) -> Result<bool>;

    /// Append `result` unless a snapshot for its build is already recorded.
    /// Failed results also add their build to `failed_in`.
    async fn append_result(&self, test_name: &str, result: &TestCaseResult)
        -> Result<MergeOutcome>;

    /// Insert or overwrite the log entry for a build.
    async fn record_scan(&self, record: &ScanLogRecord) -> Result<()>;

    async fn update_scan_status(&self, build_id: BuildId, status: ScanStatus) -> Result<()>;

    /// Builds whose scan started after `cutoff`.
    async fn scanned_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<BuildId>>;

    async fn scan_entry(&self, build_id: BuildId) -> Result<Option<ScanLogRecord>>;
}
