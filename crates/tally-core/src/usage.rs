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

//! Period-over-period consumption for a single trend log.
//!
//! Periods are UTC calendar periods. Consumption inside a period is the
//! difference between its last and first entry; a year is the sum of its
//! monthly values.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use rusqlite::Connection;
use std::sync::Arc;
use tally_types::{
    ComparisonFilter, LedgerPartition, MonthlyConsumption, PeriodComparison, TrendLogId,
};

use crate::db::Database;
use crate::error::{Result, TallyError};
use crate::{ledger, registry};

/// Relative change from `previous` to `current` in percent.
pub fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    }
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
        .ok_or_else(|| TallyError::validation(format!("no calendar month {year}-{month}")))
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 { (year - 1, 12) } else { (year, month - 1) }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// Start of the current and of the previous period.
fn period_starts(
    filter: ComparisonFilter,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let midnight = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
    match filter {
        ComparisonFilter::Hour => {
            let current = midnight + Duration::hours(i64::from(now.hour()));
            Ok((current, current - Duration::hours(1)))
        }
        ComparisonFilter::Day => Ok((midnight, midnight - Duration::days(1))),
        ComparisonFilter::Month => {
            let (py, pm) = previous_month(now.year(), now.month());
            Ok((month_start(now.year(), now.month())?, month_start(py, pm)?))
        }
        ComparisonFilter::Year => Ok((month_start(now.year(), 1)?, month_start(now.year() - 1, 1)?)),
    }
}

fn consumption(
    conn: &Connection,
    partition: LedgerPartition,
    id: TrendLogId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<f64> {
    Ok(ledger::bounds(conn, partition, id, from, to)?
        .map_or(0.0, |(first, last)| last.value - first.value))
}

/// Monthly values for `months` of `year`. The month containing `now` ends at
/// `now`, every other month at the millisecond before the next one starts.
fn monthly(
    conn: &Connection,
    partition: LedgerPartition,
    id: TrendLogId,
    year: i32,
    months: u32,
    now: DateTime<Utc>,
) -> Result<Vec<MonthlyConsumption>> {
    (1..=months)
        .map(|month| {
            let start = month_start(year, month)?;
            let (ny, nm) = next_month(year, month);
            let end = (month_start(ny, nm)? - Duration::milliseconds(1)).min(now);
            Ok(MonthlyConsumption {
                month,
                value: consumption(conn, partition, id, start, end)?,
                start,
            })
        })
        .collect()
}

/// Usage comparison over the ledger partition a trend log writes to.
#[derive(Debug, Clone)]
pub struct UsageReports {
    db: Arc<Database>,
}

impl UsageReports {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn compare(&self, id: TrendLogId, filter: ComparisonFilter) -> Result<PeriodComparison> {
        self.compare_at(id, filter, Utc::now())
    }

    pub fn compare_at(
        &self,
        id: TrendLogId,
        filter: ComparisonFilter,
        now: DateTime<Utc>,
    ) -> Result<PeriodComparison> {
        let (current_start, previous_start) = period_starts(filter, now)?;

        self.db.with_conn(|conn| {
            let partition = registry::resolve_partition(conn, id)?;

            let (current_value, previous_value, current_months, previous_months) =
                if filter == ComparisonFilter::Year {
                    let current = monthly(conn, partition, id, now.year(), now.month(), now)?;
                    let previous = monthly(conn, partition, id, now.year() - 1, 12, now)?;
                    (
                        current.iter().map(|m| m.value).sum(),
                        previous.iter().map(|m| m.value).sum(),
                        current,
                        previous,
                    )
                } else {
                    let previous_end = current_start - Duration::milliseconds(1);
                    (
                        consumption(conn, partition, id, current_start, now)?,
                        consumption(conn, partition, id, previous_start, previous_end)?,
                        Vec::new(),
                        Vec::new(),
                    )
                };

            Ok(PeriodComparison {
                filter,
                current_value,
                previous_value,
                current_start,
                previous_start,
                percentage_change: percentage_change(current_value, previous_value),
                current_months,
                previous_months,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TrendLogLedger;
    use crate::registry::TrendLogRegistry;
    use crate::value_source::StaticValueSource;
    use tally_types::{
        ByteOrder, DataType, Interval, IntervalUnit, LogMode, NewTrendLog, RegisterRef,
    };

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    async fn counter_log(db: &Arc<Database>, created: DateTime<Utc>) -> TrendLogId {
        let source = Arc::new(StaticValueSource::new());
        let registry = TrendLogRegistry::new(Arc::clone(db), source);
        let draft = NewTrendLog {
            register: RegisterRef {
                analyzer_id: "an-1".to_owned(),
                analyzer_name: Some("Main".to_owned()),
                register_id: "kwh".to_owned(),
                address: 3000,
                data_type: DataType::Float64,
                scale: 1.0,
                byte_order: ByteOrder::Abcd,
            },
            mode: LogMode::CumulativeCounter,
            interval: Some(Interval::new(15, IntervalUnit::Minute)),
            on_change: None,
            active_until: created + Duration::days(800),
        };
        registry.create_at(draft, created).await.unwrap().id
    }

    #[test]
    fn percentage_change_edges() {
        assert!((percentage_change(150.0, 100.0) - 50.0).abs() < 1e-9);
        assert!((percentage_change(50.0, 100.0) + 50.0).abs() < 1e-9);
        assert!((percentage_change(5.0, 0.0) - 100.0).abs() < 1e-9);
        assert!(percentage_change(0.0, 0.0).abs() < 1e-9);
    }

    #[test]
    fn period_starts_follow_the_calendar() {
        let now = at(2025, 1, 15, 10, 42);
        assert_eq!(
            period_starts(ComparisonFilter::Hour, now).unwrap(),
            (at(2025, 1, 15, 10, 0), at(2025, 1, 15, 9, 0))
        );
        assert_eq!(
            period_starts(ComparisonFilter::Day, now).unwrap(),
            (at(2025, 1, 15, 0, 0), at(2025, 1, 14, 0, 0))
        );
        assert_eq!(
            period_starts(ComparisonFilter::Month, now).unwrap(),
            (at(2025, 1, 1, 0, 0), at(2024, 12, 1, 0, 0))
        );
        assert_eq!(
            period_starts(ComparisonFilter::Year, now).unwrap(),
            (at(2025, 1, 1, 0, 0), at(2024, 1, 1, 0, 0))
        );
    }

    #[tokio::test]
    async fn month_comparison_uses_first_and_last_entry_of_each_month() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let created = at(2025, 2, 1, 0, 0);
        let id = counter_log(&db, created).await;
        let ledger = TrendLogLedger::new(Arc::clone(&db));
        let partition = LedgerPartition::CumulativeCounter;

        // Creation seeded nothing because the static source had no value.
        ledger.append(partition, id, 100.0, at(2025, 2, 1, 0, 0)).unwrap();
        ledger.append(partition, id, 140.0, at(2025, 2, 28, 23, 0)).unwrap();
        ledger.append(partition, id, 150.0, at(2025, 3, 1, 0, 0)).unwrap();
        ledger.append(partition, id, 210.0, at(2025, 3, 20, 12, 0)).unwrap();

        let usage = UsageReports::new(Arc::clone(&db));
        let cmp = usage
            .compare_at(id, ComparisonFilter::Month, at(2025, 3, 21, 0, 0))
            .unwrap();

        assert!((cmp.current_value - 60.0).abs() < 1e-9);
        assert!((cmp.previous_value - 40.0).abs() < 1e-9);
        assert!((cmp.percentage_change - 50.0).abs() < 1e-9);
        assert!(cmp.current_months.is_empty());
    }

    #[tokio::test]
    async fn year_comparison_sums_months() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let id = counter_log(&db, at(2024, 1, 1, 0, 0)).await;
        let ledger = TrendLogLedger::new(Arc::clone(&db));
        let partition = LedgerPartition::CumulativeCounter;

        ledger.append(partition, id, 0.0, at(2024, 5, 1, 0, 0)).unwrap();
        ledger.append(partition, id, 10.0, at(2024, 5, 31, 0, 0)).unwrap();
        ledger.append(partition, id, 20.0, at(2024, 6, 2, 0, 0)).unwrap();
        ledger.append(partition, id, 30.0, at(2024, 6, 30, 0, 0)).unwrap();
        ledger.append(partition, id, 40.0, at(2025, 1, 2, 0, 0)).unwrap();
        ledger.append(partition, id, 45.0, at(2025, 1, 3, 0, 0)).unwrap();

        let usage = UsageReports::new(Arc::clone(&db));
        let cmp = usage
            .compare_at(id, ComparisonFilter::Year, at(2025, 1, 10, 0, 0))
            .unwrap();

        // Growth across a month boundary is not attributed to either month.
        assert!((cmp.previous_value - 20.0).abs() < 1e-9);
        assert!((cmp.current_value - 5.0).abs() < 1e-9);
        assert_eq!(cmp.previous_months.len(), 12);
        assert_eq!(cmp.current_months.len(), 1);
        assert!((cmp.previous_months[4].value - 10.0).abs() < 1e-9);
        assert!((cmp.percentage_change + 75.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_trend_log_is_not_found() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let usage = UsageReports::new(db);
        let err = usage
            .compare_at(TrendLogId(99), ComparisonFilter::Day, at(2025, 1, 1, 0, 0))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
