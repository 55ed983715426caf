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
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::TrendLogId;

/// One of the three physically separate entry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerPartition {
    FixedInterval,
    OnChange,
    CumulativeCounter,
}

impl LedgerPartition {
    pub const ALL: [Self; 3] = [Self::FixedInterval, Self::OnChange, Self::CumulativeCounter];

    pub fn table_name(self) -> &'static str {
        match self {
            Self::FixedInterval => "trend_log_entries",
            Self::OnChange => "trend_log_entries_onchange",
            Self::CumulativeCounter => "trend_log_entries_kwh",
        }
    }
}

impl fmt::Display for LedgerPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLogEntry {
    pub id: i64,
    pub trend_log_id: TrendLogId,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub exported: bool,
    pub exported_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}
