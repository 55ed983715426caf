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

//! Error types for the ledger engine

use serde::Serialize;
use tally_types::{LedgerPartition, TrendLogId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TallyError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("value source unavailable for register {register_id}: {reason}")]
    ValueSourceUnavailable { register_id: String, reason: String },

    #[error("trend log {trend_log_id} has no unexported entry to use as a baseline")]
    MissingBaseline { trend_log_id: TrendLogId },

    #[error("ledger inconsistency in {partition} for trend log {trend_log_id}: no unexported entry left")]
    LedgerInconsistency {
        trend_log_id: TrendLogId,
        partition: LedgerPartition,
    },

    #[error("report rendering failed: {0}")]
    Render(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("stored data could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TallyError>;

/// Machine-readable error kind handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ValueSourceUnavailable,
    MissingBaseline,
    LedgerInconsistency,
    Render,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::ValueSourceUnavailable => "value_source_unavailable",
            Self::MissingBaseline => "missing_baseline",
            Self::LedgerInconsistency => "ledger_inconsistency",
            Self::Render => "render",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }

    /// Only a transient outage of the value source is worth retrying.
    pub fn is_retryable(self) -> bool {
        self == Self::ValueSourceUnavailable
    }
}

impl TallyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ValueSourceUnavailable { .. } => ErrorKind::ValueSourceUnavailable,
            Self::MissingBaseline { .. } => ErrorKind::MissingBaseline,
            Self::LedgerInconsistency { .. } => ErrorKind::LedgerInconsistency,
            Self::Render(_) => ErrorKind::Render,
            Self::Storage(_) | Self::Decode(_) | Self::Io(_) => ErrorKind::Storage,
            Self::HttpClient(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn unavailable(register_id: &str, reason: impl Into<String>) -> Self {
        Self::ValueSourceUnavailable {
            register_id: register_id.to_owned(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_value_source_outages_are_retryable() {
        let outage = TallyError::unavailable("reg-1", "timed out");
        assert!(outage.kind().is_retryable());

        let broken = TallyError::LedgerInconsistency {
            trend_log_id: TrendLogId(4),
            partition: LedgerPartition::CumulativeCounter,
        };
        assert_eq!(broken.kind(), ErrorKind::LedgerInconsistency);
        assert!(!broken.kind().is_retryable());
        assert!(broken.to_string().contains("trend_log_entries_kwh"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MissingBaseline).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorKind::MissingBaseline.as_str()));
    }

    #[test]
    fn client_construction_failure_is_internal() {
        let cause = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let err = TallyError::HttpClient(cause);
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.kind().is_retryable());
        assert_eq!(err.kind().as_str(), "internal");
    }
}
