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

use askama::Template;
use chrono::{DateTime, Utc};
use tally_types::{BillingReport, MeteringAccount, ReportLine, TrendLogBinding};

use crate::error::{Result, TallyError};

/// Printed under every report. The amount only prices active energy.
pub const REPORT_NOTE: &str = "This amount is based solely on your active energy consumption. \
    Fixed charges, penalties and taxes are added separately to your utility bill.";

/// A baseline and a live reading for one binding, ready to be priced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub first_value: f64,
    pub current_value: f64,
}

/// Prices each binding. Deltas are signed; a counter that went backwards
/// produces a negative line rather than being clamped.
pub fn build_report(
    account: &MeteringAccount,
    readings: &[(TrendLogBinding, Reading)],
    report_date: DateTime<Utc>,
) -> BillingReport {
    let lines: Vec<ReportLine> = readings
        .iter()
        .map(|(binding, reading)| {
            let used_delta = reading.current_value - reading.first_value;
            ReportLine {
                trend_log_id: binding.trend_log_id,
                location_name: binding.register.location_name().to_owned(),
                first_value: reading.first_value,
                current_value: reading.current_value,
                used_delta,
                cost: used_delta * account.price,
            }
        })
        .collect();

    let used_total: f64 = lines.iter().map(|l| l.used_delta).sum();

    BillingReport {
        account_id: account.id,
        account_name: account.name.clone(),
        currency: account.currency.clone(),
        price: account.price,
        total_cost: used_total * account.price,
        used_total,
        lines,
        days_elapsed: report_date
            .signed_duration_since(account.start_time)
            .num_days(),
        start_date: account.start_time,
        report_date,
    }
}

/// Finished report document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: String,
}

/// Turns a [`BillingReport`] into a document. Failing here aborts an export
/// before anything is written.
pub trait ReportRenderer: Send + Sync + std::fmt::Debug {
    fn render(&self, report: &BillingReport) -> Result<RenderedReport>;
}

#[derive(Debug, Template)]
#[template(path = "billing_report.html")]
struct BillingReportTemplate {
    account_name: String,
    rows: Vec<ReportRow>,
    start_date: String,
    report_date: String,
    days_elapsed: i64,
    used_total: String,
    total_cost: String,
    note: &'static str,
}

#[derive(Debug)]
struct ReportRow {
    location: String,
    first_value: String,
    current_value: String,
    used: String,
    cost: String,
}

fn kwh(value: f64) -> String {
    format!("{value:.2} kWh")
}

fn money(value: f64, currency: &str) -> String {
    if currency.is_empty() {
        format!("{value:.2}")
    } else {
        format!("{value:.2} {currency}")
    }
}

/// HTML rendition of the energy consumption report.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReportRenderer;

impl ReportRenderer for HtmlReportRenderer {
    fn render(&self, report: &BillingReport) -> Result<RenderedReport> {
        let template = BillingReportTemplate {
            account_name: report.account_name.clone(),
            rows: report
                .lines
                .iter()
                .map(|line| ReportRow {
                    location: line.location_name.clone(),
                    first_value: kwh(line.first_value),
                    current_value: kwh(line.current_value),
                    used: kwh(line.used_delta),
                    cost: money(line.cost, &report.currency),
                })
                .collect(),
            start_date: report.start_date.format("%d.%m.%Y").to_string(),
            report_date: report.report_date.format("%d.%m.%Y").to_string(),
            days_elapsed: report.days_elapsed,
            used_total: kwh(report.used_total),
            total_cost: money(report.total_cost, &report.currency),
            note: REPORT_NOTE,
        };

        let body = template
            .render()
            .map_err(|e| TallyError::Render(e.to_string()))?;

        Ok(RenderedReport {
            file_name: format!("energy-report-{}.html", report.report_date.format("%Y-%m-%d")),
            content_type: "text/html; charset=utf-8",
            body,
        })
    }
}
