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

//! Shared data types for the Tally metering ledger.
//!
//! Everything in here is plain serde data: trend-log configuration, ledger
//! entries, metering accounts (billing cycles and consumption widgets) and
//! the rows of a billing report. Storage and behaviour live in `tally-core`.

pub mod account;
pub mod ids;
pub mod ledger;
pub mod report;
pub mod trend_log;
pub mod usage;

pub use account::{
    AccountDraft, AccountKind, AccountUpdate, BillingCycle, ConsumptionWidget, MeteringAccount,
    TrendLogBinding,
};
pub use ids::{AccountId, ScheduleId, TrendLogId};
pub use ledger::{LedgerPartition, TrendLogEntry};
pub use report::{BillingReport, ReportLine, ReportSchedule, ReportScheduleDraft};
pub use trend_log::{
    ByteOrder, DataType, Interval, IntervalUnit, LogMode, NewTrendLog, OnChangeSettings,
    RegisterRef, TrendLogConfig, TrendLogStatus, TrendLogUpdate,
};
pub use usage::{ComparisonFilter, MonthlyConsumption, PeriodComparison};
