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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonFilter {
    Hour,
    Day,
    #[default]
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyConsumption {
    /// 1-based calendar month.
    pub month: u32,
    pub value: f64,
    pub start: DateTime<Utc>,
}

/// Consumption in the current calendar period next to the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub filter: ComparisonFilter,
    pub current_value: f64,
    pub previous_value: f64,
    pub current_start: DateTime<Utc>,
    pub previous_start: DateTime<Utc>,
    pub percentage_change: f64,
    /// Only filled for [`ComparisonFilter::Year`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub current_months: Vec<MonthlyConsumption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_months: Vec<MonthlyConsumption>,
}
