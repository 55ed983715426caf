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

//! Periodic report schedules. Only membership is stored here; generating
//! and sending the reports happens elsewhere.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Arc;
use tally_types::{ReportSchedule, ReportScheduleDraft, ScheduleId, TrendLogId};
use tracing::{debug, info};

use crate::db::{Database, millis, time_column};
use crate::error::{Result, TallyError};
use crate::registry;

fn load(conn: &Connection, id: ScheduleId) -> Result<ReportSchedule> {
    let head = conn
        .query_row(
            "SELECT id, name, created_at_ms FROM report_schedules WHERE id = ?1",
            params![id.0],
            |row| Ok((row.get::<_, String>(1)?, time_column(row, 2)?)),
        )
        .optional()?;
    let (name, created_at) = head.ok_or(TallyError::NotFound {
        entity: "report schedule",
        id: id.0,
    })?;

    let mut stmt = conn.prepare(
        "SELECT trend_log_id FROM report_schedule_logs WHERE schedule_id = ?1 ORDER BY position",
    )?;
    let trend_log_ids = stmt
        .query_map(params![id.0], |row| Ok(TrendLogId(row.get(0)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(ReportSchedule {
        id,
        name,
        trend_log_ids,
        created_at,
    })
}

/// Drops `trend_log_id` from every schedule. A schedule left without logs
/// is deleted.
pub(crate) fn prune_trend_log(conn: &Connection, trend_log_id: TrendLogId) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT schedule_id FROM report_schedule_logs WHERE trend_log_id = ?1",
    )?;
    let affected = stmt
        .query_map(params![trend_log_id.0], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for schedule_id in affected {
        let others: i64 = conn.query_row(
            "SELECT COUNT(*) FROM report_schedule_logs WHERE schedule_id = ?1 AND trend_log_id <> ?2",
            params![schedule_id, trend_log_id.0],
            |row| row.get(0),
        )?;

        if others == 0 {
            conn.execute(
                "DELETE FROM report_schedules WHERE id = ?1",
                params![schedule_id],
            )?;
            debug!(schedule_id, trend_log_id = %trend_log_id, "Deleted emptied report schedule");
        } else {
            conn.execute(
                "DELETE FROM report_schedule_logs WHERE schedule_id = ?1 AND trend_log_id = ?2",
                params![schedule_id, trend_log_id.0],
            )?;
            debug!(schedule_id, trend_log_id = %trend_log_id, "Pulled trend log from report schedule");
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ReportSchedules {
    db: Arc<Database>,
}

impl ReportSchedules {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(&self, draft: ReportScheduleDraft) -> Result<ReportSchedule> {
        if draft.name.trim().is_empty() {
            return Err(TallyError::validation("schedule name must be set"));
        }
        if draft.trend_log_ids.is_empty() {
            return Err(TallyError::validation(
                "a report schedule needs at least one trend log",
            ));
        }

        let schedule = self.db.with_transaction(|conn| {
            for id in &draft.trend_log_ids {
                registry::load(conn, *id)?;
            }

            conn.execute(
                "INSERT INTO report_schedules (name, created_at_ms) VALUES (?1, ?2)",
                params![draft.name, millis(Utc::now())],
            )?;
            let id = ScheduleId(conn.last_insert_rowid());

            let mut stmt = conn.prepare(
                "INSERT INTO report_schedule_logs (schedule_id, position, trend_log_id) VALUES (?1, ?2, ?3)",
            )?;
            for (position, trend_log_id) in draft.trend_log_ids.iter().enumerate() {
                stmt.execute(params![id.0, position, trend_log_id.0])?;
            }
            load(conn, id)
        })?;

        info!(schedule_id = %schedule.id, name = %schedule.name, "Created report schedule");
        Ok(schedule)
    }

    pub fn get(&self, id: ScheduleId) -> Result<ReportSchedule> {
        self.db.with_conn(|conn| load(conn, id))
    }

    pub fn list(&self) -> Result<Vec<ReportSchedule>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM report_schedules ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| Ok(ScheduleId(row.get(0)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids.into_iter().map(|id| load(conn, id)).collect()
        })
    }
}
