// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Tally.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use std::path::Path;
use tally_types::LedgerPartition;
use tracing::debug;

use crate::error::Result;

/// SQLite handle shared by every component.
///
/// All access goes through one connection, so statements never interleave.
/// Multi-statement mutations use [`Database::with_transaction`].
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        debug!(path, "Opened ledger database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS trend_logs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                register_json   TEXT NOT NULL,
                mode            TEXT NOT NULL,
                interval_json   TEXT,
                on_change_json  TEXT,
                active_until_ms INTEGER NOT NULL,
                status          TEXT NOT NULL DEFAULT 'running',
                created_at_ms   INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metering_accounts (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                kind           TEXT NOT NULL,
                name           TEXT NOT NULL,
                price          REAL NOT NULL,
                currency       TEXT NOT NULL,
                start_time_ms  INTEGER NOT NULL,
                created_at_ms  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS account_bindings (
                account_id     INTEGER NOT NULL,
                position       INTEGER NOT NULL,
                trend_log_id   INTEGER NOT NULL,
                register_json  TEXT NOT NULL,
                first_value    REAL NOT NULL,
                current_value  REAL NOT NULL,
                PRIMARY KEY (account_id, position),
                FOREIGN KEY (account_id) REFERENCES metering_accounts(id) ON DELETE CASCADE,
                FOREIGN KEY (trend_log_id) REFERENCES trend_logs(id)
            );

            CREATE INDEX IF NOT EXISTS idx_account_bindings_trend_log
                ON account_bindings(trend_log_id);

            CREATE TABLE IF NOT EXISTS report_schedules (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                name           TEXT NOT NULL,
                created_at_ms  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS report_schedule_logs (
                schedule_id    INTEGER NOT NULL,
                position       INTEGER NOT NULL,
                trend_log_id   INTEGER NOT NULL,
                PRIMARY KEY (schedule_id, position),
                FOREIGN KEY (schedule_id) REFERENCES report_schedules(id) ON DELETE CASCADE
            );",
        )?;

        for partition in LedgerPartition::ALL {
            let table = partition.table_name();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    trend_log_id    INTEGER NOT NULL,
                    value           REAL NOT NULL,
                    timestamp_ms    INTEGER NOT NULL,
                    exported        INTEGER NOT NULL DEFAULT 0,
                    exported_at_ms  INTEGER,
                    expires_at_ms   INTEGER
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_log_state
                    ON {table}(trend_log_id, exported, timestamp_ms);
                CREATE INDEX IF NOT EXISTS idx_{table}_exported_at
                    ON {table}(exported_at_ms);"
            ))?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` against the connection without a transaction.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Runs `f` inside an IMMEDIATE transaction. Commits only when `f`
    /// returns `Ok`; any error rolls every statement back.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

pub(crate) fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Reads a millisecond timestamp column.
pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

pub(crate) fn optional_time_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let ms: Option<i64> = row.get(idx)?;
    ms.map(|ms| {
        DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
    })
    .transpose()
}

/// Decodes a unit enum stored as its serde tag (`"on_change"`, `"billing"`, ...).
pub(crate) fn decode_tag<T: DeserializeOwned>(tag: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(tag))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/data/tally.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();

        let tables: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'trend_log_entries%'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 3);
        assert!(path.exists());
    }

    #[test]
    fn reopening_keeps_schema_and_rows() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO report_schedules (name, created_at_ms) VALUES ('weekly', 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM report_schedules", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO report_schedules (name, created_at_ms) VALUES ('a', 0)",
                [],
            )?;
            Err(crate::TallyError::validation("abort"))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM report_schedules", [], |row| {
                    row.get(0)
                })?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
