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

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::ledger::TrendLogLedger;

/// Outcome of one [`RetentionPolicy::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionSweep {
    pub exported: usize,
    pub expired: usize,
}

/// Removes entries nobody will read again: exported entries once they are
/// older than the retention window, and on-change entries past their expiry.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub exported_retention: Duration,
}

impl RetentionPolicy {
    pub fn days(days: u32) -> Self {
        Self {
            exported_retention: Duration::days(i64::from(days)),
        }
    }

    pub fn sweep(&self, ledger: &TrendLogLedger, now: DateTime<Utc>) -> Result<RetentionSweep> {
        let sweep = RetentionSweep {
            exported: ledger.purge_exported_before(now - self.exported_retention)?,
            expired: ledger.purge_expired(now)?,
        };
        if sweep.exported > 0 || sweep.expired > 0 {
            info!(
                exported = sweep.exported,
                expired = sweep.expired,
                "Retention sweep removed entries"
            );
        }
        Ok(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tally_types::{LedgerPartition, TrendLogId};

    #[test]
    fn exported_entries_leave_after_the_window() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO trend_logs (id, register_json, mode, active_until_ms, status, created_at_ms)
                 VALUES (1, '{}', 'cumulative_counter', 0, 'running', 0)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let ledger = TrendLogLedger::new(Arc::clone(&db));
        let partition = LedgerPartition::CumulativeCounter;
        let id = TrendLogId(1);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ledger.append(partition, id, 1.0, t0).unwrap();
        ledger.append(partition, id, 2.0, t0 + Duration::days(1)).unwrap();
        ledger
            .close_older_than_latest_unexported(partition, id, t0 + Duration::days(2))
            .unwrap();

        let policy = RetentionPolicy::days(365);
        let early = policy.sweep(&ledger, t0 + Duration::days(300)).unwrap();
        assert_eq!(early, RetentionSweep::default());

        let late = policy.sweep(&ledger, t0 + Duration::days(400)).unwrap();
        assert_eq!(late.exported, 1);
        let left = ledger.entries(partition, id, None).unwrap();
        assert_eq!(left.len(), 1);
        assert!(!left[0].exported);
    }
}
