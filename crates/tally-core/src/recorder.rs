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

//! Recording policy applied to raw observations from the poller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tally_types::{LogMode, TrendLogConfig, TrendLogEntry, TrendLogId};
use tracing::trace;

use crate::db::Database;
use crate::error::Result;
use crate::{ledger, registry};

/// Last value that made it into the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastSample {
    pub value: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    IntervalNotElapsed,
    Unchanged,
    BelowThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Record,
    Skip(SkipReason),
}

/// `true` when `value` moved at least `threshold` percent away from `last`.
/// From zero any change counts.
pub fn threshold_exceeded(last: f64, value: f64, threshold: f64) -> bool {
    if last == 0.0 {
        return value != 0.0;
    }
    ((value - last) / last).abs() * 100.0 >= threshold
}

#[expect(clippy::float_cmp, reason = "register readings are compared exactly")]
pub fn decide(
    config: &TrendLogConfig,
    last: Option<LastSample>,
    value: f64,
    now: DateTime<Utc>,
) -> Decision {
    if !config.is_active_at(now) {
        return Decision::Skip(SkipReason::Inactive);
    }
    let Some(last) = last else {
        return Decision::Record;
    };

    match (config.mode, config.interval) {
        (LogMode::FixedInterval | LogMode::CumulativeCounter, Some(interval)) => {
            if now.signed_duration_since(last.at) >= interval.as_duration() {
                Decision::Record
            } else {
                Decision::Skip(SkipReason::IntervalNotElapsed)
            }
        }
        (LogMode::OnChange, _) => {
            if value == last.value {
                return Decision::Skip(SkipReason::Unchanged);
            }
            let threshold = config
                .on_change
                .and_then(|s| s.percentage_threshold)
                .unwrap_or(0.0);
            if threshold_exceeded(last.value, value, threshold) {
                Decision::Record
            } else {
                Decision::Skip(SkipReason::BelowThreshold)
            }
        }
        (LogMode::CumulativeCounter | LogMode::FixedInterval, None) => {
            if value == last.value {
                Decision::Skip(SkipReason::Unchanged)
            } else {
                Decision::Record
            }
        }
    }
}

/// Applies [`decide`] to observations and appends the ones that pass.
///
/// The last sample is read from the ledger on every observation, so entries
/// written elsewhere (exports, manual backfills) are taken into account.
#[derive(Debug, Clone)]
pub struct TrendRecorder {
    db: Arc<Database>,
}

impl TrendRecorder {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns the stored entry, or `None` when the policy skipped the value.
    pub fn observe(
        &self,
        id: TrendLogId,
        value: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<TrendLogEntry>> {
        self.db.with_transaction(|conn| {
            let config = registry::load(conn, id)?;
            let last = ledger::latest(conn, config.mode.partition(), id)?.map(|e| LastSample {
                value: e.value,
                at: e.timestamp,
            });

            match decide(&config, last, value, now) {
                Decision::Record => registry::record_entry(conn, &config, value, now).map(Some),
                Decision::Skip(reason) => {
                    trace!(trend_log_id = %id, value, ?reason, "Observation skipped");
                    Ok(None)
                }
            }
        })
    }
}
