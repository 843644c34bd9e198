//! SQLite-backed store.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::{schema, Store};
use crate::error::{FailTrackError, Result};
use crate::models::{
    BuildId, MergeOutcome, ScanLogRecord, ScanStatus, TestCaseResult, TestHistoryRecord,
};

pub type Pool = R2D2Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

fn to_sql_id(build_id: BuildId) -> Result<i64> {
    i64::try_from(build_id)
        .map_err(|_| FailTrackError::Store(format!("build id {build_id} out of range")))
}

fn from_sql_id(raw: i64) -> Result<BuildId> {
    BuildId::try_from(raw).map_err(|_| FailTrackError::Store(format!("negative build id {raw}")))
}

// Fixed width with a Z suffix keeps lexical order equal to time order.
fn to_sql_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_sql_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FailTrackError::Store(format!("invalid timestamp {raw:?}: {e}")))
}

/// Insert a snapshot row, plus a failure row for failed results.
fn insert_snapshot(
    tx: &Transaction<'_>,
    test_name: &str,
    build_id: i64,
    result_json: &str,
    failed: bool,
) -> Result<MergeOutcome> {
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO test_results (test_name, build_id, result_json)
         VALUES (?1, ?2, ?3)",
        params![test_name, build_id, result_json],
    )?;
    if inserted == 0 {
        return Ok(MergeOutcome::AlreadyRecorded);
    }

    if failed {
        tx.execute(
            "INSERT OR IGNORE INTO test_failures (test_name, build_id) VALUES (?1, ?2)",
            params![test_name, build_id],
        )?;
    }

    Ok(MergeOutcome::Appended)
}

impl SqliteStore {
    /// Open (or create) the database and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });

        let pool = R2D2Pool::new(manager)?;

        let conn = pool.get()?;
        schema::migrate(&conn)?;

        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| FailTrackError::Store(format!("database task failed: {e}")))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn history(&self, test_name: &str) -> Result<Option<TestHistoryRecord>> {
        let test_name = test_name.to_string();

        self.with_conn(move |conn| {
            // one read transaction so snapshots and failures come from the same commit
            let tx = conn.transaction()?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM test_history WHERE test_name = ?1)",
                params![test_name],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(None);
            }

            let results = {
                let mut stmt = tx.prepare(
                    "SELECT result_json FROM test_results WHERE test_name = ?1 ORDER BY id",
                )?;
                let results = stmt
                    .query_map(params![test_name], |row| row.get::<_, String>(0))?
                    .map(|json| -> Result<TestCaseResult> { Ok(serde_json::from_str(&json?)?) })
                    .collect::<Result<Vec<_>>>()?;
                results
            };

            let failed_in = {
                let mut stmt =
                    tx.prepare("SELECT build_id FROM test_failures WHERE test_name = ?1")?;
                let failed_in = stmt
                    .query_map(params![test_name], |row| row.get::<_, i64>(0))?
                    .map(|id| from_sql_id(id?))
                    .collect::<Result<BTreeSet<_>>>()?;
                failed_in
            };

            tx.commit()?;

            Ok(Some(TestHistoryRecord {
                test_name,
                failed_in,
                results,
            }))
        })
        .await
    }

    async fn create_history(&self, test_name: &str, first: &TestCaseResult) -> Result<bool> {
        let test_name = test_name.to_string();
        let build_id = to_sql_id(first.build_id)?;
        let result_json = serde_json::to_string(first)?;
        let failed = first.counts_as_failure();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO test_history (test_name) VALUES (?1)",
                params![test_name],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            insert_snapshot(&tx, &test_name, build_id, &result_json, failed)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn append_result(
        &self,
        test_name: &str,
        result: &TestCaseResult,
    ) -> Result<MergeOutcome> {
        let test_name = test_name.to_string();
        let build_id = to_sql_id(result.build_id)?;
        let result_json = serde_json::to_string(result)?;
        let failed = result.counts_as_failure();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM test_history WHERE test_name = ?1)",
                params![test_name],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(FailTrackError::Store(format!("no history for {test_name}")));
            }

            let outcome = insert_snapshot(&tx, &test_name, build_id, &result_json, failed)?;
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn record_scan(&self, record: &ScanLogRecord) -> Result<()> {
        let build_id = to_sql_id(record.build_id)?;
        let status = record.status.as_str();
        let started_at = to_sql_time(record.started_at);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO scan_log (build_id, status, started_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(build_id) DO UPDATE SET
                    status = excluded.status,
                    started_at = excluded.started_at",
                params![build_id, status, started_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn update_scan_status(&self, build_id: BuildId, status: ScanStatus) -> Result<()> {
        let id = to_sql_id(build_id)?;

        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE scan_log SET status = ?1 WHERE build_id = ?2",
                params![status.as_str(), id],
            )?;
            if updated == 0 {
                return Err(FailTrackError::Store(format!(
                    "no scan log entry for build {build_id}"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn scanned_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<BuildId>> {
        let cutoff = to_sql_time(cutoff);

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT build_id FROM scan_log WHERE started_at > ?1 ORDER BY build_id DESC",
            )?;
            let builds = stmt
                .query_map(params![cutoff], |row| row.get::<_, i64>(0))?
                .map(|id| from_sql_id(id?))
                .collect::<Result<Vec<_>>>()?;
            Ok(builds)
        })
        .await
    }

    async fn scan_entry(&self, build_id: BuildId) -> Result<Option<ScanLogRecord>> {
        let id = to_sql_id(build_id)?;

        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT status, started_at FROM scan_log WHERE build_id = ?1",
                    params![id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let Some((status, started_at)) = row else {
                return Ok(None);
            };

            let status = ScanStatus::parse(&status)
                .ok_or_else(|| FailTrackError::Store(format!("unknown scan status {status:?}")))?;

            Ok(Some(ScanLogRecord {
                build_id,
                status,
                started_at: from_sql_time(&started_at)?,
            }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::models::TestStatus;

    fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("failtrack.db")).unwrap();
        (dir, store)
    }

    fn result(build_id: BuildId, status: TestStatus) -> TestCaseResult {
        TestCaseResult {
            suite_class_name: "com.example.PaymentTest".to_string(),
            test_name: "refundsPartially".to_string(),
            status,
            duration_seconds: 2.25,
            error_details: Some("expected 10 but was 9".to_string()),
            error_stack_trace: Some("at PaymentTest.refundsPartially".to_string()),
            skipped: false,
            skipped_message: None,
            build_id,
            build_timestamp: 1_700_000_000_000,
            build_result: Some("UNSTABLE".to_string()),
        }
    }

    const KEY: &str = "com.example.PaymentTest.refundsPartially";

    #[tokio::test]
    async fn test_history_missing_is_none() {
        let (_dir, store) = open_temp();

        assert!(store.history(KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_then_read_history() {
        let (_dir, store) = open_temp();
        let first = result(50, TestStatus::Failed);

        assert!(store.create_history(KEY, &first).await.unwrap());
        assert!(!store.create_history(KEY, &result(51, TestStatus::Failed)).await.unwrap());

        let record = store.history(KEY).await.unwrap().unwrap();
        assert_eq!(record.test_name, KEY);
        assert_eq!(record.failed_in, BTreeSet::from([50]));
        assert_eq!(record.results, vec![first]);
    }

    #[tokio::test]
    async fn test_append_keeps_order_and_dedups() {
        let (_dir, store) = open_temp();
        store.create_history(KEY, &result(50, TestStatus::Failed)).await.unwrap();

        let fixed = store.append_result(KEY, &result(52, TestStatus::Fixed)).await.unwrap();
        let failed = store.append_result(KEY, &result(51, TestStatus::Failed)).await.unwrap();
        let dup = store.append_result(KEY, &result(51, TestStatus::Failed)).await.unwrap();

        assert_eq!(fixed, MergeOutcome::Appended);
        assert_eq!(failed, MergeOutcome::Appended);
        assert_eq!(dup, MergeOutcome::AlreadyRecorded);

        let record = store.history(KEY).await.unwrap().unwrap();
        let builds: Vec<_> = record.results.iter().map(|r| r.build_id).collect();
        assert_eq!(builds, vec![50, 52, 51]);
        assert_eq!(record.failed_in, BTreeSet::from([50, 51]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_history_reads_are_consistent_during_appends() {
        let (_dir, store) = open_temp();
        store.create_history(KEY, &result(1, TestStatus::Failed)).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for build_id in 2..=60 {
                    store
                        .append_result(KEY, &result(build_id, TestStatus::Failed))
                        .await
                        .unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let record = store.history(KEY).await.unwrap().unwrap();
            let snapshots: BTreeSet<_> = record.results.iter().map(|r| r.build_id).collect();
            assert_eq!(snapshots, record.failed_in);
        }
        writer.await.unwrap();

        let record = store.history(KEY).await.unwrap().unwrap();
        assert_eq!(record.results.len(), 60);
        assert_eq!(record.failed_in.len(), 60);
    }

    #[tokio::test]
    async fn test_append_without_record_fails() {
        let (_dir, store) = open_temp();

        let outcome = store.append_result(KEY, &result(1, TestStatus::Failed)).await;

        assert!(matches!(outcome, Err(FailTrackError::Store(_))));
    }

    #[tokio::test]
    async fn test_scan_log_lifecycle() {
        let (_dir, store) = open_temp();
        let now = Utc::now();
        store
            .record_scan(&ScanLogRecord {
                build_id: 101,
                status: ScanStatus::Completed,
                started_at: now - TimeDelta::days(8),
            })
            .await
            .unwrap();
        store.record_scan(&ScanLogRecord::running(102)).await.unwrap();
        store.record_scan(&ScanLogRecord::running(103)).await.unwrap();

        store.update_scan_status(103, ScanStatus::Completed).await.unwrap();

        let recent = store.scanned_since(now - TimeDelta::days(5)).await.unwrap();
        assert_eq!(recent, vec![103, 102]);

        let entry = store.scan_entry(103).await.unwrap().unwrap();
        assert_eq!(entry.status, ScanStatus::Completed);
        assert!(store.scan_entry(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_scan_overwrites_existing_entry() {
        let (_dir, store) = open_temp();
        let old = Utc::now() - TimeDelta::days(30);
        store
            .record_scan(&ScanLogRecord {
                build_id: 7,
                status: ScanStatus::Completed,
                started_at: old,
            })
            .await
            .unwrap();

        store.record_scan(&ScanLogRecord::running(7)).await.unwrap();

        let entry = store.scan_entry(7).await.unwrap().unwrap();
        assert_eq!(entry.status, ScanStatus::Running);
        assert!(entry.started_at > old);
    }

    #[tokio::test]
    async fn test_update_missing_scan_entry_fails() {
        let (_dir, store) = open_temp();

        let outcome = store.update_scan_status(5, ScanStatus::Completed).await;

        assert!(matches!(outcome, Err(FailTrackError::Store(_))));
    }
}
