use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use log::{error, info, warn};

use crate::error::Result;
use crate::models::{
    BuildId, BuildInfo, CollectionReport, CollectionStatus, MergeOutcome, ScanLogRecord,
    ScanStatus, TestCaseResult, TestStatus,
};
use crate::providers::CiSource;
use crate::store::Store;

/// Collects the non-passing tests of one build into the test history.
pub struct Collector {
    ci: Arc<dyn CiSource>,
    store: Arc<dyn Store>,
}

impl Collector {
    pub fn new(ci: Arc<dyn CiSource>, store: Arc<dyn Store>) -> Self {
        Self { ci, store }
    }

    pub async fn collect(&self, build_id: BuildId) -> Result<CollectionReport> {
        self.store
            .record_scan(&ScanLogRecord::running(build_id))
            .await?;
        info!("Build {build_id}: scan started");

        let outcome = self.gather_and_merge(build_id).await;
        self.finalize(build_id).await;

        match &outcome {
            Ok(report) if report.status == CollectionStatus::Degraded => warn!(
                "Build {build_id}: collected {} results, {} tests could not be stored",
                report.results.len(),
                report.failed_tests.len()
            ),
            Ok(report) => info!(
                "Build {build_id}: collected {} results ({} new tests, {} appended, {} already recorded)",
                report.results.len(),
                report.created,
                report.appended,
                report.already_recorded
            ),
            Err(e) => error!("Build {build_id}: collection failed: {e}"),
        }

        outcome
    }

    async fn finalize(&self, build_id: BuildId) {
        match self
            .store
            .update_scan_status(build_id, ScanStatus::Completed)
            .await
        {
            Ok(()) => info!("Build {build_id}: scan completed"),
            Err(e) => error!("Build {build_id}: failed to mark scan completed: {e}"),
        }
    }

    async fn fetch_results(&self, build: &BuildInfo) -> Result<Vec<TestCaseResult>> {
        if build.is_aborted() {
            info!("Build {}: aborted, skipping test report", build.id);
            return Ok(Vec::new());
        }

        let cases = self.ci.failing_cases(build.id).await?;

        // Jenkins may report the same case twice; keep the first occurrence
        let mut unique: IndexMap<String, TestCaseResult> = IndexMap::new();
        for case in cases {
            let result = TestCaseResult::from_reported(case, build);
            if result.status == TestStatus::Passed {
                continue;
            }
            unique.entry(result.history_key()).or_insert(result);
        }

        Ok(unique.into_values().collect())
    }

    async fn gather_and_merge(&self, build_id: BuildId) -> Result<CollectionReport> {
        let build = self.ci.build_info(build_id).await?;
        let results = self.fetch_results(&build).await?;

        let mut report = CollectionReport {
            build_id,
            build_result: build.result.clone(),
            status: CollectionStatus::Completed,
            collected_at: Utc::now(),
            results: Vec::with_capacity(results.len()),
            created: 0,
            appended: 0,
            already_recorded: 0,
            failed_tests: Vec::new(),
        };

        for result in results {
            match self.merge(&result).await {
                Ok(MergeOutcome::Created) => report.created += 1,
                Ok(MergeOutcome::Appended) => report.appended += 1,
                Ok(MergeOutcome::AlreadyRecorded) => report.already_recorded += 1,
                Err(e) => {
                    let key = result.history_key();
                    error!("Build {build_id}: failed to store {key}: {e}");
                    report.failed_tests.push(key);
                }
            }
            report.results.push(result);
        }

        if !report.failed_tests.is_empty() {
            report.status = CollectionStatus::Degraded;
        }

        Ok(report)
    }

    /// Fold one result into its test's history.
    pub async fn merge(&self, result: &TestCaseResult) -> Result<MergeOutcome> {
        let key = result.history_key();

        match self.store.history(&key).await? {
            None => {
                if self.store.create_history(&key, result).await? {
                    return Ok(MergeOutcome::Created);
                }
                // another collector created it first
            }
            Some(record) if record.contains_build(result.build_id) => {
                return Ok(MergeOutcome::AlreadyRecorded);
            }
            Some(_) => {}
        }

        self.store.append_result(&key, result).await
    }
}
