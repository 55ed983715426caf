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

//! Closing a billing cycle.
//!
//! An export walks `Idle -> Fetching -> Computing -> Rendering -> Committing
//! -> Done` and drops to `Failed` from any phase. Everything before
//! `Committing` is read-only, and `Committing` is a single transaction, so a
//! failed export leaves the ledgers and the account exactly as they were.
//!
//! The locks of every bound trend log are held from the first read to the
//! commit. Two exports touching the same log therefore run one after the
//! other, and the second one sees the baseline the first one wrote.

use chrono::{DateTime, Duration, Utc};
use futures_util::future::try_join_all;
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;
use tally_types::{AccountId, BillingReport, LedgerPartition, TrendLogBinding};
use tracing::{debug, error, info};

use crate::accounts::{self, AccountProfile};
use crate::db::{Database, millis};
use crate::error::{ErrorKind, Result, TallyError};
use crate::ledger;
use crate::locks::TrendLogLocks;
use crate::registry;
use crate::report::{Reading, RenderedReport, ReportRenderer, build_report};
use crate::value_source::ValueSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    Idle,
    Fetching,
    Computing,
    Rendering,
    Committing,
    Done,
    Failed,
}

#[derive(Debug)]
struct ExportRun {
    account_id: AccountId,
    state: ExportState,
}

impl ExportRun {
    fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            state: ExportState::Idle,
        }
    }

    fn advance(&mut self, next: ExportState) {
        debug!(account_id = %self.account_id, from = ?self.state, to = ?next, "Export state");
        self.state = next;
    }

    fn fail(&mut self, e: &TallyError) {
        if e.kind() == ErrorKind::LedgerInconsistency {
            error!(
                account_id = %self.account_id,
                phase = ?self.state,
                error = %e,
                "Export halted by a ledger integrity problem"
            );
        } else {
            error!(
                account_id = %self.account_id,
                phase = ?self.state,
                kind = e.kind().as_str(),
                error = %e,
                "Export failed"
            );
        }
        self.state = ExportState::Failed;
    }
}

/// Result of a completed export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub report: BillingReport,
    pub document: RenderedReport,
}

#[derive(Debug, Clone)]
pub struct BillingExporter {
    db: Arc<Database>,
    source: Arc<dyn ValueSource>,
    locks: Arc<TrendLogLocks>,
    renderer: Arc<dyn ReportRenderer>,
    profile: AccountProfile,
}

impl BillingExporter {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn ValueSource>,
        locks: Arc<TrendLogLocks>,
        renderer: Arc<dyn ReportRenderer>,
        profile: AccountProfile,
    ) -> Self {
        Self {
            db,
            source,
            locks,
            renderer,
            profile,
        }
    }

    pub async fn export(&self, id: AccountId) -> Result<ExportOutcome> {
        self.export_at(id, Utc::now()).await
    }

    pub async fn export_at(&self, id: AccountId, now: DateTime<Utc>) -> Result<ExportOutcome> {
        let mut run = ExportRun::new(id);
        match self.run(&mut run, id, now).await {
            Ok(outcome) => {
                run.advance(ExportState::Done);
                info!(
                    account_id = %id,
                    used_total = outcome.report.used_total,
                    total_cost = outcome.report.total_cost,
                    "Exported metering account"
                );
                Ok(outcome)
            }
            Err(e) => {
                run.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        run: &mut ExportRun,
        id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<ExportOutcome> {
        let snapshot = self
            .db
            .with_conn(|conn| accounts::load(conn, self.profile, id))?;
        let trend_log_ids = snapshot.trend_log_ids();
        let _guard = self.locks.acquire(&trend_log_ids).await;

        let account = self
            .db
            .with_conn(|conn| accounts::load(conn, self.profile, id))?;
        if account.trend_log_ids() != trend_log_ids {
            return Err(TallyError::Conflict(format!(
                "bindings of account {id} changed while the export was waiting"
            )));
        }

        run.advance(ExportState::Fetching);
        let current = try_join_all(
            account
                .bindings
                .iter()
                .map(|binding| self.source.current_value(&binding.register)),
        )
        .await?;

        run.advance(ExportState::Computing);
        let baselines: Vec<(LedgerPartition, f64)> = self.db.with_conn(|conn| {
            account
                .bindings
                .iter()
                .map(|binding| -> Result<(LedgerPartition, f64)> {
                    let trend_log_id = binding.trend_log_id;
                    let (partition, first) =
                        accounts::baseline(conn, self.profile.selector, trend_log_id)?;
                    let first = first.ok_or(TallyError::LedgerInconsistency {
                        trend_log_id,
                        partition,
                    })?;
                    Ok((partition, first.value))
                })
                .collect()
        })?;

        let readings: Vec<(TrendLogBinding, Reading)> = account
            .bindings
            .iter()
            .zip(&baselines)
            .zip(current)
            .map(|((binding, (_, first_value)), current_value)| {
                (
                    binding.clone(),
                    Reading {
                        first_value: *first_value,
                        current_value,
                    },
                )
            })
            .collect();
        let report = build_report(&account, &readings, now);

        run.advance(ExportState::Rendering);
        let document = self.renderer.render(&report)?;

        run.advance(ExportState::Committing);
        self.db.with_transaction(|conn| {
            if accounts::load(conn, self.profile, id)?.trend_log_ids() != trend_log_ids {
                return Err(TallyError::Conflict(format!(
                    "bindings of account {id} changed during the export"
                )));
            }

            for (position, ((binding, reading), (partition, _))) in
                readings.iter().zip(&baselines).enumerate()
            {
                let trend_log_id = binding.trend_log_id;

                // The newest reading becomes the next baseline. When the ledger
                // lags behind the live read, the live read is recorded first,
                // after the newest unexported entry so it is the one retained.
                let latest = ledger::latest_unexported(conn, *partition, trend_log_id)?;
                if let Some(latest) = latest
                    && (latest.value - reading.current_value).abs() > f64::EPSILON
                {
                    let at = now.max(latest.timestamp + Duration::milliseconds(1));
                    let config = registry::load(conn, trend_log_id)?;
                    registry::record_entry(conn, &config, reading.current_value, at)?;
                    debug!(
                        trend_log_id = %trend_log_id,
                        ledger_value = latest.value,
                        live_value = reading.current_value,
                        %at,
                        "Recorded live read as the new baseline entry"
                    );
                }

                ledger::close_older_than_latest_unexported(conn, *partition, trend_log_id, now)?;

                let updated = conn.execute(
                    "UPDATE account_bindings SET first_value = ?1, current_value = ?1
                     WHERE account_id = ?2 AND position = ?3 AND trend_log_id = ?4",
                    params![reading.current_value, id.0, position, trend_log_id.0],
                )?;
                if updated != 1 {
                    return Err(TallyError::Conflict(format!(
                        "binding {position} of account {id} no longer points at trend log {trend_log_id}"
                    )));
                }
            }

            conn.execute(
                "UPDATE metering_accounts SET start_time_ms = ?1 WHERE id = ?2",
                params![millis(now), id.0],
            )?;
            Ok(())
        })?;

        Ok(ExportOutcome { report, document })
    }
}
