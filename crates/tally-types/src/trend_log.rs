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
use serde::{Deserialize, Serialize};

use crate::ids::TrendLogId;
use crate::ledger::LedgerPartition;

/// Raw register encoding on the Modbus side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ByteOrder {
    #[default]
    Abcd,
    Dcba,
    Badc,
    Cdab,
}

/// Points at one physical register of one analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRef {
    pub analyzer_id: String,
    /// Display name of the analyzer, used as the location in reports.
    #[serde(default)]
    pub analyzer_name: Option<String>,
    pub register_id: String,
    pub address: u16,
    pub data_type: DataType,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub byte_order: ByteOrder,
}

fn default_scale() -> f64 {
    1.0
}

impl RegisterRef {
    pub fn location_name(&self) -> &str {
        self.analyzer_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.analyzer_id)
    }
}

/// How a trend log decides when to record. Immutable once the log exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    FixedInterval,
    OnChange,
    CumulativeCounter,
}

impl LogMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FixedInterval => "fixed_interval",
            Self::OnChange => "on_change",
            Self::CumulativeCounter => "cumulative_counter",
        }
    }

    /// Ledger partition that stores entries for this mode.
    pub fn partition(self) -> LedgerPartition {
        match self {
            Self::FixedInterval => LedgerPartition::FixedInterval,
            Self::OnChange => LedgerPartition::OnChange,
            Self::CumulativeCounter => LedgerPartition::CumulativeCounter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    /// Counted as 30 days.
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub amount: u32,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn new(amount: u32, unit: IntervalUnit) -> Self {
        Self { amount, unit }
    }

    pub fn as_duration(self) -> Duration {
        let amount = i64::from(self.amount);
        match self.unit {
            IntervalUnit::Second => Duration::seconds(amount),
            IntervalUnit::Minute => Duration::minutes(amount),
            IntervalUnit::Hour => Duration::hours(amount),
            IntervalUnit::Day => Duration::days(amount),
            IntervalUnit::Week => Duration::weeks(amount),
            IntervalUnit::Month => Duration::days(amount * 30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnChangeSettings {
    /// Minimum relative change in percent. Not used by cumulative counters.
    #[serde(default)]
    pub percentage_threshold: Option<f64>,
    /// On-change entries expire this many months after they were recorded.
    pub cleanup_months: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendLogStatus {
    #[default]
    Running,
    Stopped,
}

impl TrendLogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLogConfig {
    pub id: TrendLogId,
    pub register: RegisterRef,
    pub mode: LogMode,
    pub interval: Option<Interval>,
    pub on_change: Option<OnChangeSettings>,
    pub active_until: DateTime<Utc>,
    pub status: TrendLogStatus,
    pub created_at: DateTime<Utc>,
}

impl TrendLogConfig {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TrendLogStatus::Running && now <= self.active_until
    }

    pub fn is_counter(&self) -> bool {
        self.mode == LogMode::CumulativeCounter
    }
}

/// Request to attach logging to a register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrendLog {
    pub register: RegisterRef,
    pub mode: LogMode,
    #[serde(default)]
    pub interval: Option<Interval>,
    #[serde(default)]
    pub on_change: Option<OnChangeSettings>,
    pub active_until: DateTime<Utc>,
}

/// Partial update of a trend log. `mode` and `register` are accepted only when
/// they repeat the stored values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendLogUpdate {
    #[serde(default)]
    pub mode: Option<LogMode>,
    #[serde(default)]
    pub register: Option<RegisterRef>,
    #[serde(default)]
    pub interval: Option<Interval>,
    #[serde(default)]
    pub on_change: Option<OnChangeSettings>,
    #[serde(default)]
    pub active_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<TrendLogStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register() -> RegisterRef {
        RegisterRef {
            analyzer_id: "an-1".to_owned(),
            analyzer_name: None,
            register_id: "reg-1".to_owned(),
            address: 40001,
            data_type: DataType::Float32,
            scale: 1.0,
            byte_order: ByteOrder::Abcd,
        }
    }

    #[test]
    fn month_interval_is_thirty_days() {
        let interval = Interval::new(2, IntervalUnit::Month);
        assert_eq!(interval.as_duration(), Duration::days(60));
    }

    #[test]
    fn modes_map_to_their_own_partition() {
        assert_eq!(
            LogMode::FixedInterval.partition().table_name(),
            "trend_log_entries"
        );
        assert_eq!(
            LogMode::OnChange.partition(),
            LedgerPartition::OnChange
        );
        assert_eq!(
            LogMode::CumulativeCounter.partition().table_name(),
            "trend_log_entries_kwh"
        );
    }

    #[test]
    fn location_falls_back_to_analyzer_id() {
        let mut reg = register();
        assert_eq!(reg.location_name(), "an-1");
        reg.analyzer_name = Some("Main hall".to_owned());
        assert_eq!(reg.location_name(), "Main hall");
    }

    #[test]
    fn register_defaults_from_json() {
        let reg: RegisterRef = serde_json::from_str(
            r#"{"analyzer_id":"a","register_id":"r","address":3,"data_type":"uint32"}"#,
        )
        .unwrap();
        assert!((reg.scale - 1.0).abs() < f64::EPSILON);
        assert_eq!(reg.byte_order, ByteOrder::Abcd);
        assert_eq!(reg.data_type, DataType::Uint32);
    }

    #[test]
    fn byte_order_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ByteOrder::Cdab).unwrap(), "\"CDAB\"");
    }
}
