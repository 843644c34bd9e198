use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BuildId = u64;

const ABORTED: &str = "ABORTED";

/// Build metadata as reported by the CI server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub id: BuildId,
    /// Epoch milliseconds.
    pub timestamp: i64,
    /// `None` while the build is still running.
    pub result: Option<String>,
}

impl BuildInfo {
    pub fn is_aborted(&self) -> bool {
        self.result.as_deref() == Some(ABORTED)
    }
}

/// A test case exactly as the CI server reported it.
#[derive(Debug, Clone, Default)]
pub struct ReportedCase {
    pub class_name: String,
    pub name: String,
    pub status: String,
    pub duration: f64,
    pub error_details: Option<String>,
    pub error_stack_trace: Option<String>,
    pub skipped: bool,
    pub skipped_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Passed,
    Failed,
    Fixed,
}

impl TestStatus {
    /// `FIXED` and `PASSED` survive; every other status counts as a failure.
    pub fn normalize(raw: &str) -> Self {
        match raw {
            "PASSED" => Self::Passed,
            "FIXED" => Self::Fixed,
            _ => Self::Failed,
        }
    }
}

/// One non-passing test case of one build, enriched with the build's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    pub suite_class_name: String,
    pub test_name: String,
    pub status: TestStatus,
    pub duration_seconds: f64,
    pub error_details: Option<String>,
    pub error_stack_trace: Option<String>,
    pub skipped: bool,
    pub skipped_message: Option<String>,
    pub build_id: BuildId,
    pub build_timestamp: i64,
    pub build_result: Option<String>,
}

impl TestCaseResult {
    pub fn from_reported(case: ReportedCase, build: &BuildInfo) -> Self {
        Self {
            status: TestStatus::normalize(&case.status),
            suite_class_name: case.class_name,
            test_name: case.name,
            duration_seconds: case.duration,
            error_details: case.error_details,
            error_stack_trace: case.error_stack_trace,
            skipped: case.skipped,
            skipped_message: case.skipped_message,
            build_id: build.id,
            build_timestamp: build.timestamp,
            build_result: build.result.clone(),
        }
    }

    /// Key of the history record this result belongs to.
    pub fn history_key(&self) -> String {
        format!("{}.{}", self.suite_class_name, self.test_name)
    }

    pub fn counts_as_failure(&self) -> bool {
        self.status == TestStatus::Failed
    }
}

/// Failure history of a single test, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestHistoryRecord {
    pub test_name: String,
    pub failed_in: BTreeSet<BuildId>,
    /// Snapshots in insertion order, at most one per build.
    pub results: Vec<TestCaseResult>,
}

impl TestHistoryRecord {
    pub fn new(first: TestCaseResult) -> Self {
        let mut record = Self {
            test_name: first.history_key(),
            failed_in: BTreeSet::new(),
            results: Vec::new(),
        };
        record.push(first);
        record
    }

    pub fn contains_build(&self, build_id: BuildId) -> bool {
        self.results.iter().any(|r| r.build_id == build_id)
    }

    /// Appends `result` unless a snapshot for its build is already recorded.
    pub fn push(&mut self, result: TestCaseResult) -> MergeOutcome {
        if self.contains_build(result.build_id) {
            return MergeOutcome::AlreadyRecorded;
        }

        if result.counts_as_failure() {
            self.failed_in.insert(result.build_id);
        }
        self.results.push(result);
        MergeOutcome::Appended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeOutcome {
    Created,
    Appended,
    AlreadyRecorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Running,
    Completed,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogRecord {
    pub build_id: BuildId,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
}

impl ScanLogRecord {
    pub fn running(build_id: BuildId) -> Self {
        Self {
            build_id,
            status: ScanStatus::Running,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionStatus {
    Completed,
    /// Some tests could not be persisted.
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionReport {
    pub build_id: BuildId,
    pub build_result: Option<String>,
    pub status: CollectionStatus,
    pub collected_at: DateTime<Utc>,
    pub results: Vec<TestCaseResult>,
    pub created: usize,
    pub appended: usize,
    pub already_recorded: usize,
    pub failed_tests: Vec<String>,
}
