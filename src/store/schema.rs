//! Database schema and migrations.

use rusqlite::Connection;

use crate::error::Result;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS test_history (
            test_name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS test_results (
            id INTEGER PRIMARY KEY,
            test_name TEXT NOT NULL,
            build_id INTEGER NOT NULL,
            result_json TEXT NOT NULL,
            UNIQUE (test_name, build_id),
            FOREIGN KEY (test_name) REFERENCES test_history(test_name)
        );

        CREATE TABLE IF NOT EXISTS test_failures (
            test_name TEXT NOT NULL,
            build_id INTEGER NOT NULL,
            PRIMARY KEY (test_name, build_id),
            FOREIGN KEY (test_name) REFERENCES test_history(test_name)
        );

        CREATE TABLE IF NOT EXISTS scan_log (
            build_id INTEGER PRIMARY KEY,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scan_log_started ON scan_log(started_at);",
    )?;

    Ok(())
}
