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

//! Append-only entry store, one table per [`LedgerPartition`].
//!
//! The free functions take a `&Connection` so that callers can compose them
//! inside a single transaction. [`TrendLogLedger`] wraps them for standalone
//! use. Entries are ordered by `(timestamp, id)`, which keeps ties between
//! equal timestamps stable in insertion order.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::Arc;
use tally_types::{LedgerPartition, TrendLogEntry, TrendLogId};
use tracing::{debug, error};

use crate::db::{Database, millis, optional_time_column, time_column};
use crate::error::{Result, TallyError};

const ENTRY_COLUMNS: &str =
    "id, trend_log_id, value, timestamp_ms, exported, exported_at_ms, expires_at_ms";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TrendLogEntry> {
    Ok(TrendLogEntry {
        id: row.get(0)?,
        trend_log_id: TrendLogId(row.get(1)?),
        value: row.get(2)?,
        timestamp: time_column(row, 3)?,
        exported: row.get(4)?,
        exported_at: optional_time_column(row, 5)?,
        expires_at: optional_time_column(row, 6)?,
    })
}

pub(crate) fn append(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
    value: f64,
    timestamp: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<TrendLogEntry> {
    if !value.is_finite() {
        return Err(TallyError::validation(format!(
            "entry value for trend log {trend_log_id} must be finite"
        )));
    }

    let table = partition.table_name();
    conn.execute(
        &format!(
            "INSERT INTO {table} (trend_log_id, value, timestamp_ms, exported, expires_at_ms)
             VALUES (?1, ?2, ?3, 0, ?4)"
        ),
        params![
            trend_log_id.0,
            value,
            millis(timestamp),
            expires_at.map(millis)
        ],
    )?;

    Ok(TrendLogEntry {
        id: conn.last_insert_rowid(),
        trend_log_id,
        value,
        timestamp,
        exported: false,
        exported_at: None,
        expires_at,
    })
}

pub(crate) fn first_unexported(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
) -> Result<Option<TrendLogEntry>> {
    let table = partition.table_name();
    let entry = conn
        .query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM {table}
                 WHERE trend_log_id = ?1 AND exported = 0
                 ORDER BY timestamp_ms ASC, id ASC LIMIT 1"
            ),
            params![trend_log_id.0],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub(crate) fn latest_unexported(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
) -> Result<Option<TrendLogEntry>> {
    let table = partition.table_name();
    let entry = conn
        .query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM {table}
                 WHERE trend_log_id = ?1 AND exported = 0
                 ORDER BY timestamp_ms DESC, id DESC LIMIT 1"
            ),
            params![trend_log_id.0],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub(crate) fn latest(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
) -> Result<Option<TrendLogEntry>> {
    let table = partition.table_name();
    let entry = conn
        .query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM {table}
                 WHERE trend_log_id = ?1
                 ORDER BY timestamp_ms DESC, id DESC LIMIT 1"
            ),
            params![trend_log_id.0],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// Marks every unexported entry of `trend_log_id` as exported except the
/// newest one, which is returned and becomes the next baseline.
///
/// Callers must run this inside a transaction. The update is filtered on
/// `exported = 0`, so it can only ever move entries from unexported to
/// exported.
pub(crate) fn close_older_than_latest_unexported(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
    now: DateTime<Utc>,
) -> Result<TrendLogEntry> {
    let Some(retained) = latest_unexported(conn, partition, trend_log_id)? else {
        error!(
            trend_log_id = %trend_log_id,
            partition = %partition,
            "Rebase requested but the ledger holds no unexported entry"
        );
        return Err(TallyError::LedgerInconsistency {
            trend_log_id,
            partition,
        });
    };

    let table = partition.table_name();
    let closed = conn.execute(
        &format!(
            "UPDATE {table} SET exported = 1, exported_at_ms = ?1
             WHERE trend_log_id = ?2 AND exported = 0 AND id <> ?3"
        ),
        params![millis(now), trend_log_id.0, retained.id],
    )?;

    debug!(
        trend_log_id = %trend_log_id,
        partition = %partition,
        closed,
        retained_id = retained.id,
        retained_value = retained.value,
        "Rebased ledger"
    );
    Ok(retained)
}

pub(crate) fn entries(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
    limit: Option<usize>,
) -> Result<Vec<TrendLogEntry>> {
    let table = partition.table_name();
    // -1 means no limit in SQLite
    let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM {table}
         WHERE trend_log_id = ?1
         ORDER BY timestamp_ms DESC, id DESC LIMIT ?2"
    ))?;
    let mut rows = stmt
        .query_map(params![trend_log_id.0, limit], entry_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.reverse();
    Ok(rows)
}

pub(crate) fn range(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TrendLogEntry>> {
    let table = partition.table_name();
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM {table}
         WHERE trend_log_id = ?1 AND timestamp_ms >= ?2 AND timestamp_ms <= ?3
         ORDER BY timestamp_ms ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map(
            params![trend_log_id.0, millis(from), millis(to)],
            entry_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// First and last entry inside `[from, to]`.
pub(crate) fn bounds(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Option<(TrendLogEntry, TrendLogEntry)>> {
    let table = partition.table_name();
    let edge = |order: &str| {
        conn.query_row(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM {table}
                 WHERE trend_log_id = ?1 AND timestamp_ms >= ?2 AND timestamp_ms <= ?3
                 ORDER BY timestamp_ms {order}, id {order} LIMIT 1"
            ),
            params![trend_log_id.0, millis(from), millis(to)],
            entry_from_row,
        )
        .optional()
    };

    match (edge("ASC")?, edge("DESC")?) {
        (Some(first), Some(last)) => Ok(Some((first, last))),
        _ => Ok(None),
    }
}

pub(crate) fn delete_all(
    conn: &Connection,
    partition: LedgerPartition,
    trend_log_id: TrendLogId,
) -> Result<usize> {
    let table = partition.table_name();
    Ok(conn.execute(
        &format!("DELETE FROM {table} WHERE trend_log_id = ?1"),
        params![trend_log_id.0],
    )?)
}

/// Standalone access to the three ledger partitions.
#[derive(Debug, Clone)]
pub struct TrendLogLedger {
    db: Arc<Database>,
}

impl TrendLogLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Appends an unexported entry. No deduplication by timestamp.
    pub fn append(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<TrendLogEntry> {
        self.db
            .with_conn(|conn| append(conn, partition, trend_log_id, value, timestamp, None))
    }

    pub fn append_expiring(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
        value: f64,
        timestamp: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<TrendLogEntry> {
        self.db.with_conn(|conn| {
            append(
                conn,
                partition,
                trend_log_id,
                value,
                timestamp,
                Some(expires_at),
            )
        })
    }

    /// Oldest entry that has not been exported yet.
    pub fn first_unexported(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
    ) -> Result<Option<TrendLogEntry>> {
        self.db
            .with_conn(|conn| first_unexported(conn, partition, trend_log_id))
    }

    pub fn latest_unexported(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
    ) -> Result<Option<TrendLogEntry>> {
        self.db
            .with_conn(|conn| latest_unexported(conn, partition, trend_log_id))
    }

    pub fn latest(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
    ) -> Result<Option<TrendLogEntry>> {
        self.db.with_conn(|conn| latest(conn, partition, trend_log_id))
    }

    /// Rebase primitive; see [`close_older_than_latest_unexported`].
    pub fn close_older_than_latest_unexported(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
        now: DateTime<Utc>,
    ) -> Result<TrendLogEntry> {
        self.db.with_transaction(|conn| {
            close_older_than_latest_unexported(conn, partition, trend_log_id, now)
        })
    }

    /// Newest `limit` entries in chronological order, or all of them.
    pub fn entries(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
        limit: Option<usize>,
    ) -> Result<Vec<TrendLogEntry>> {
        self.db
            .with_conn(|conn| entries(conn, partition, trend_log_id, limit))
    }

    pub fn range(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TrendLogEntry>> {
        self.db
            .with_conn(|conn| range(conn, partition, trend_log_id, from, to))
    }

    /// `last - first` inside `[from, to]`, or `None` when the range is empty.
    pub fn period_consumption(
        &self,
        partition: LedgerPartition,
        trend_log_id: TrendLogId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let bounds = self
            .db
            .with_conn(|conn| bounds(conn, partition, trend_log_id, from, to))?;
        Ok(bounds.map(|(first, last)| last.value - first.value))
    }

    /// Deletes exported entries whose `exported_at` is older than `cutoff`.
    pub fn purge_exported_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.db.with_transaction(|conn| {
            let mut deleted = 0;
            for partition in LedgerPartition::ALL {
                let table = partition.table_name();
                deleted += conn.execute(
                    &format!(
                        "DELETE FROM {table} WHERE exported = 1 AND exported_at_ms < ?1"
                    ),
                    params![millis(cutoff)],
                )?;
            }
            Ok(deleted)
        })
    }

    /// Deletes entries past their `expires_at`. Unexported entries of logs
    /// bound to a metering account are kept so no baseline disappears.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.db.with_transaction(|conn| {
            let mut deleted = 0;
            for partition in LedgerPartition::ALL {
                let table = partition.table_name();
                deleted += conn.execute(
                    &format!(
                        "DELETE FROM {table}
                         WHERE expires_at_ms IS NOT NULL AND expires_at_ms < ?1
                           AND (exported = 1
                                OR trend_log_id NOT IN (SELECT trend_log_id FROM account_bindings))"
                    ),
                    params![millis(now)],
                )?;
            }
            Ok(deleted)
        })
    }
}
