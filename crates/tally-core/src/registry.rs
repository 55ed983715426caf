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

//! Trend-log configuration and the mode to partition routing.

use chrono::{DateTime, Months, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::Arc;
use tally_types::{
    Interval, LedgerPartition, LogMode, NewTrendLog, OnChangeSettings, RegisterRef,
    TrendLogConfig, TrendLogEntry, TrendLogId, TrendLogStatus, TrendLogUpdate,
};
use tracing::{info, warn};

use crate::db::{Database, decode_tag, millis, time_column};
use crate::error::{Result, TallyError};
use crate::ledger;
use crate::schedules;
use crate::value_source::ValueSource;

const MIN_PERCENTAGE_THRESHOLD: f64 = 0.5;

struct TrendLogRow {
    id: i64,
    register_json: String,
    mode: String,
    interval_json: Option<String>,
    on_change_json: Option<String>,
    active_until: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TrendLogRow {
    const COLUMNS: &'static str = "id, register_json, mode, interval_json, on_change_json, active_until_ms, status, created_at_ms";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            register_json: row.get(1)?,
            mode: row.get(2)?,
            interval_json: row.get(3)?,
            on_change_json: row.get(4)?,
            active_until: time_column(row, 5)?,
            status: row.get(6)?,
            created_at: time_column(row, 7)?,
        })
    }

    fn decode(self) -> Result<TrendLogConfig> {
        Ok(TrendLogConfig {
            id: TrendLogId(self.id),
            register: serde_json::from_str(&self.register_json)?,
            mode: decode_tag(self.mode)?,
            interval: self
                .interval_json
                .as_deref()
                .map(serde_json::from_str::<Interval>)
                .transpose()?,
            on_change: self
                .on_change_json
                .as_deref()
                .map(serde_json::from_str::<OnChangeSettings>)
                .transpose()?,
            active_until: self.active_until,
            status: decode_tag(self.status)?,
            created_at: self.created_at,
        })
    }
}

pub(crate) fn load(conn: &Connection, id: TrendLogId) -> Result<TrendLogConfig> {
    conn.query_row(
        &format!(
            "SELECT {} FROM trend_logs WHERE id = ?1",
            TrendLogRow::COLUMNS
        ),
        params![id.0],
        TrendLogRow::from_row,
    )
    .optional()?
    .ok_or(TallyError::NotFound {
        entity: "trend log",
        id: id.0,
    })?
    .decode()
}

pub(crate) fn resolve_partition(conn: &Connection, id: TrendLogId) -> Result<LedgerPartition> {
    let mode: Option<String> = conn
        .query_row(
            "SELECT mode FROM trend_logs WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()?;
    let mode: LogMode = decode_tag(mode.ok_or(TallyError::NotFound {
        entity: "trend log",
        id: id.0,
    })?)?;
    Ok(mode.partition())
}

/// On-change entries carry an expiry; other modes keep entries until exported.
pub(crate) fn entry_expiry(
    config: &TrendLogConfig,
    timestamp: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if config.mode != LogMode::OnChange {
        return None;
    }
    let months = config.on_change?.cleanup_months;
    timestamp.checked_add_months(Months::new(months))
}

/// Appends `value` to the partition owning `config`.
pub(crate) fn record_entry(
    conn: &Connection,
    config: &TrendLogConfig,
    value: f64,
    timestamp: DateTime<Utc>,
) -> Result<TrendLogEntry> {
    ledger::append(
        conn,
        config.mode.partition(),
        config.id,
        value,
        timestamp,
        entry_expiry(config, timestamp),
    )
}

fn validate_register(register: &RegisterRef) -> Result<()> {
    if register.analyzer_id.trim().is_empty() {
        return Err(TallyError::validation("register.analyzer_id must be set"));
    }
    if register.register_id.trim().is_empty() {
        return Err(TallyError::validation("register.register_id must be set"));
    }
    if !register.scale.is_finite() || register.scale == 0.0 {
        return Err(TallyError::validation(
            "register.scale must be a non-zero number",
        ));
    }
    Ok(())
}

fn validate_schedule(
    mode: LogMode,
    interval: Option<Interval>,
    on_change: Option<OnChangeSettings>,
) -> Result<()> {
    if let Some(interval) = interval
        && interval.amount == 0
    {
        return Err(TallyError::validation("interval.amount must be at least 1"));
    }

    match mode {
        LogMode::FixedInterval => {
            if interval.is_none() {
                return Err(TallyError::validation(
                    "interval is required for fixed-interval logging",
                ));
            }
            if on_change.is_some() {
                return Err(TallyError::validation(
                    "on-change settings do not apply to fixed-interval logging",
                ));
            }
        }
        LogMode::OnChange => {
            let Some(settings) = on_change else {
                return Err(TallyError::validation(
                    "on_change settings are required for on-change logging",
                ));
            };
            if settings.cleanup_months == 0 {
                return Err(TallyError::validation(
                    "on_change.cleanup_months must be at least 1",
                ));
            }
            match settings.percentage_threshold {
                Some(t) if t.is_finite() && t >= MIN_PERCENTAGE_THRESHOLD => {}
                Some(_) | None => {
                    return Err(TallyError::validation(format!(
                        "on_change.percentage_threshold must be at least {MIN_PERCENTAGE_THRESHOLD}"
                    )));
                }
            }
        }
        LogMode::CumulativeCounter => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct TrendLogFilter {
    pub analyzer_id: Option<String>,
    pub mode: Option<LogMode>,
}

/// Owns trend-log configuration and answers which partition holds a log.
#[derive(Debug, Clone)]
pub struct TrendLogRegistry {
    db: Arc<Database>,
    source: Arc<dyn ValueSource>,
}

impl TrendLogRegistry {
    pub fn new(db: Arc<Database>, source: Arc<dyn ValueSource>) -> Self {
        Self { db, source }
    }

    pub async fn create(&self, draft: NewTrendLog) -> Result<TrendLogConfig> {
        self.create_at(draft, Utc::now()).await
    }

    /// Validates and stores a new trend log. One best-effort live read seeds
    /// the first entry; if the value source is down the poller records it
    /// later instead.
    pub async fn create_at(&self, draft: NewTrendLog, now: DateTime<Utc>) -> Result<TrendLogConfig> {
        validate_register(&draft.register)?;
        if draft.active_until <= now {
            return Err(TallyError::validation("active_until must be in the future"));
        }
        validate_schedule(draft.mode, draft.interval, draft.on_change)?;

        let initial = match self.source.current_value(&draft.register).await {
            Ok(value) if value.is_finite() => Some(value),
            Ok(value) => {
                warn!(register_id = %draft.register.register_id, value, "Ignoring non-finite initial value");
                None
            }
            Err(e) => {
                warn!(
                    register_id = %draft.register.register_id,
                    error = %e,
                    "Initial read failed, first entry deferred to the poller"
                );
                None
            }
        };

        let config = self.db.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO trend_logs (register_json, mode, interval_json, on_change_json, active_until_ms, status, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    serde_json::to_string(&draft.register)?,
                    draft.mode.as_str(),
                    draft.interval.as_ref().map(serde_json::to_string).transpose()?,
                    draft.on_change.as_ref().map(serde_json::to_string).transpose()?,
                    millis(draft.active_until),
                    TrendLogStatus::Running.as_str(),
                    millis(now),
                ],
            )?;

            let config = TrendLogConfig {
                id: TrendLogId(conn.last_insert_rowid()),
                register: draft.register,
                mode: draft.mode,
                interval: draft.interval,
                on_change: draft.on_change,
                active_until: draft.active_until,
                status: TrendLogStatus::Running,
                created_at: now,
            };
            if let Some(value) = initial {
                record_entry(conn, &config, value, now)?;
            }
            Ok(config)
        })?;

        info!(
            trend_log_id = %config.id,
            mode = config.mode.as_str(),
            seeded = initial.is_some(),
            "Created trend log"
        );
        Ok(config)
    }

    pub fn update(&self, id: TrendLogId, patch: TrendLogUpdate) -> Result<TrendLogConfig> {
        self.update_at(id, patch, Utc::now())
    }

    /// Only the schedule, the on-change settings, expiry and status may
    /// change. Mode and register are fixed for the lifetime of the log.
    pub fn update_at(
        &self,
        id: TrendLogId,
        patch: TrendLogUpdate,
        now: DateTime<Utc>,
    ) -> Result<TrendLogConfig> {
        let config = self.db.with_transaction(|conn| {
            let mut config = load(conn, id)?;

            if let Some(mode) = patch.mode
                && mode != config.mode
            {
                return Err(TallyError::validation(format!(
                    "logging mode of trend log {id} cannot change from {} to {}",
                    config.mode.as_str(),
                    mode.as_str()
                )));
            }
            if let Some(register) = &patch.register
                && *register != config.register
            {
                return Err(TallyError::validation(format!(
                    "register of trend log {id} cannot be changed"
                )));
            }

            if let Some(interval) = patch.interval {
                config.interval = Some(interval);
            }
            if let Some(on_change) = patch.on_change {
                config.on_change = Some(on_change);
            }
            if let Some(active_until) = patch.active_until {
                if active_until <= now {
                    return Err(TallyError::validation("active_until must be in the future"));
                }
                config.active_until = active_until;
            }
            if let Some(status) = patch.status {
                config.status = status;
            }
            validate_schedule(config.mode, config.interval, config.on_change)?;

            conn.execute(
                "UPDATE trend_logs SET interval_json = ?1, on_change_json = ?2, active_until_ms = ?3, status = ?4
                 WHERE id = ?5",
                params![
                    config.interval.as_ref().map(serde_json::to_string).transpose()?,
                    config.on_change.as_ref().map(serde_json::to_string).transpose()?,
                    millis(config.active_until),
                    config.status.as_str(),
                    id.0,
                ],
            )?;
            Ok(config)
        })?;

        info!(trend_log_id = %id, "Updated trend log");
        Ok(config)
    }

    pub fn set_status(&self, id: TrendLogId, status: TrendLogStatus) -> Result<TrendLogConfig> {
        self.update(
            id,
            TrendLogUpdate {
                status: Some(status),
                ..TrendLogUpdate::default()
            },
        )
    }

    pub fn get(&self, id: TrendLogId) -> Result<TrendLogConfig> {
        self.db.with_conn(|conn| load(conn, id))
    }

    pub fn list(&self, filter: &TrendLogFilter) -> Result<Vec<TrendLogConfig>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM trend_logs ORDER BY id",
                TrendLogRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map([], TrendLogRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            let config = row.decode()?;
            let analyzer_matches = filter
                .analyzer_id
                .as_ref()
                .is_none_or(|a| *a == config.register.analyzer_id);
            let mode_matches = filter.mode.is_none_or(|m| m == config.mode);
            if analyzer_matches && mode_matches {
                configs.push(config);
            }
        }
        Ok(configs)
    }

    /// Which ledger partition owns `id`, read from its stored mode.
    pub fn resolve_partition(&self, id: TrendLogId) -> Result<LedgerPartition> {
        self.db.with_conn(|conn| resolve_partition(conn, id))
    }

    /// Appends a reading on behalf of the poller.
    pub fn record(
        &self,
        id: TrendLogId,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<TrendLogEntry> {
        self.db.with_conn(|conn| {
            let config = load(conn, id)?;
            record_entry(conn, &config, value, timestamp)
        })
    }

    /// Refuses while any metering account binds the log. Otherwise removes
    /// the log, its ledger entries and its report-schedule references.
    pub fn delete(&self, id: TrendLogId) -> Result<()> {
        let removed = self.db.with_transaction(|conn| {
            let config = load(conn, id)?;

            let bindings: i64 = conn.query_row(
                "SELECT COUNT(*) FROM account_bindings WHERE trend_log_id = ?1",
                params![id.0],
                |row| row.get(0),
            )?;
            if bindings > 0 {
                return Err(TallyError::Conflict(format!(
                    "trend log {id} is bound to {bindings} metering account binding(s)"
                )));
            }

            let removed = ledger::delete_all(conn, config.mode.partition(), id)?;
            schedules::prune_trend_log(conn, id)?;
            conn.execute("DELETE FROM trend_logs WHERE id = ?1", params![id.0])?;
            Ok(removed)
        })?;

        info!(trend_log_id = %id, entries = removed, "Deleted trend log");
        Ok(())
    }
}
