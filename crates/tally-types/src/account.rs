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

use crate::ids::{AccountId, TrendLogId};
use crate::trend_log::RegisterRef;

/// Billing cycles and dashboard consumption widgets share one accounting
/// protocol and are told apart only by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Billing,
    Widget,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Widget => "widget",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLogBinding {
    pub trend_log_id: TrendLogId,
    pub register: RegisterRef,
    /// Baseline of the current cycle.
    pub first_value: f64,
    /// Most recent live read.
    pub current_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteringAccount {
    pub id: AccountId,
    pub kind: AccountKind,
    pub name: String,
    pub price: f64,
    pub currency: String,
    pub start_time: DateTime<Utc>,
    pub bindings: Vec<TrendLogBinding>,
    pub created_at: DateTime<Utc>,
}

impl MeteringAccount {
    pub fn trend_log_ids(&self) -> Vec<TrendLogId> {
        self.bindings.iter().map(|b| b.trend_log_id).collect()
    }
}

pub type BillingCycle = MeteringAccount;
pub type ConsumptionWidget = MeteringAccount;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDraft {
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub currency: String,
    pub trend_log_ids: Vec<TrendLogId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub trend_log_ids: Option<Vec<TrendLogId>>,
}
