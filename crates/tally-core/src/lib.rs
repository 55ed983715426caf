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

//! Metering ledger and billing-cycle engine.
//!
//! Trend logs sample meter registers into one of three ledger partitions.
//! Billing cycles and consumption widgets are both [`MeteringAccounts`]
//! that bind trend logs and price the consumption between a baseline and a
//! live reading. [`BillingExporter`] closes a cycle and rebases its ledgers.

pub mod accounts;
pub mod db;
pub mod error;
pub mod exporter;
pub mod ledger;
pub mod locks;
pub mod recorder;
pub mod registry;
pub mod report;
pub mod retention;
pub mod schedules;
pub mod usage;
pub mod value_source;

pub use accounts::{AccountProfile, LedgerSelector, MeteringAccounts};
pub use db::Database;
pub use error::{ErrorKind, Result, TallyError};
pub use exporter::{BillingExporter, ExportOutcome, ExportState};
pub use ledger::TrendLogLedger;
pub use locks::{TrendLogGuard, TrendLogLocks};
pub use recorder::{Decision, LastSample, SkipReason, TrendRecorder};
pub use registry::{TrendLogFilter, TrendLogRegistry};
pub use report::{HtmlReportRenderer, RenderedReport, ReportRenderer};
pub use retention::{RetentionPolicy, RetentionSweep};
pub use schedules::ReportSchedules;
pub use usage::UsageReports;
pub use value_source::{HttpValueSource, StaticValueSource, ValueSource};
