use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Store;
use crate::error::{FailTrackError, Result};
use crate::models::{
    BuildId, MergeOutcome, ScanLogRecord, ScanStatus, TestCaseResult, TestHistoryRecord,
};

/// Process-local store, used for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    history: Mutex<HashMap<String, TestHistoryRecord>>,
    scans: Mutex<BTreeMap<BuildId, ScanLogRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| FailTrackError::Store("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn history(&self, test_name: &str) -> Result<Option<TestHistoryRecord>> {
        Ok(lock(&self.history)?.get(test_name).cloned())
    }

    async fn create_history(&self, test_name: &str, first: &TestCaseResult) -> Result<bool> {
        let mut history = lock(&self.history)?;
        if history.contains_key(test_name) {
            return Ok(false);
        }

        let mut record = TestHistoryRecord::new(first.clone());
        record.test_name = test_name.to_string();
        history.insert(test_name.to_string(), record);
        Ok(true)
    }

    async fn append_result(
        &self,
        test_name: &str,
        result: &TestCaseResult,
    ) -> Result<MergeOutcome> {
        let mut history = lock(&self.history)?;
        let record = history
            .get_mut(test_name)
            .ok_or_else(|| FailTrackError::Store(format!("no history for {test_name}")))?;

        Ok(record.push(result.clone()))
    }

    async fn record_scan(&self, record: &ScanLogRecord) -> Result<()> {
        lock(&self.scans)?.insert(record.build_id, record.clone());
        Ok(())
    }

    async fn update_scan_status(&self, build_id: BuildId, status: ScanStatus) -> Result<()> {
        let mut scans = lock(&self.scans)?;
        let entry = scans
            .get_mut(&build_id)
            .ok_or_else(|| FailTrackError::Store(format!("no scan log entry for build {build_id}")))?;

        entry.status = status;
        Ok(())
    }

    async fn scanned_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<BuildId>> {
        Ok(lock(&self.scans)?
            .values()
            .filter(|r| r.started_at > cutoff)
            .map(|r| r.build_id)
            .collect())
    }

    async fn scan_entry(&self, build_id: BuildId) -> Result<Option<ScanLogRecord>> {
        Ok(lock(&self.scans)?.get(&build_id).cloned())
    }
}
