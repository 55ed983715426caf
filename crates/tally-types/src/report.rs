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

use crate::ids::{AccountId, ScheduleId, TrendLogId};

/// One row of a billing report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLine {
    pub trend_log_id: TrendLogId,
    pub location_name: String,
    pub first_value: f64,
    pub current_value: f64,
    /// Signed; a meter reset shows up as a negative delta.
    pub used_delta: f64,
    pub cost: f64,
}

/// Content of an exported bill, independent of the document format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingReport {
    pub account_id: AccountId,
    pub account_name: String,
    pub currency: String,
    pub price: f64,
    pub lines: Vec<ReportLine>,
    pub used_total: f64,
    pub total_cost: f64,
    pub days_elapsed: i64,
    pub start_date: DateTime<Utc>,
    pub report_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSchedule {
    pub id: ScheduleId,
    pub name: String,
    pub trend_log_ids: Vec<TrendLogId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportScheduleDraft {
    pub name: String,
    pub trend_log_ids: Vec<TrendLogId>,
}
