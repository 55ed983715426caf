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

//! Live register reads from the polling service.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tally_types::RegisterRef;
use tracing::{debug, warn};

use crate::error::{Result, TallyError};

/// Current value of a register. Every failure is reported as
/// [`TallyError::ValueSourceUnavailable`]; implementations never retry.
#[async_trait]
pub trait ValueSource: Send + Sync + std::fmt::Debug {
    async fn current_value(&self, register: &RegisterRef) -> Result<f64>;
}

pub const DEFAULT_VALUE_PATH: &str = "/express-api/get-register-value";

/// Queries `GET {base_url}{path}?id={register_id}` and expects
/// `{"value": <number or numeric string>}`.
#[derive(Debug, Clone)]
pub struct HttpValueSource {
    base_url: String,
    path: String,
    client: Client,
}

impl HttpValueSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_path(base_url, DEFAULT_VALUE_PATH, timeout)
    }

    pub fn with_path(
        base_url: impl Into<String>,
        path: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TallyError::HttpClient)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            path: path.into(),
            client,
        })
    }
}

#[async_trait]
impl ValueSource for HttpValueSource {
    async fn current_value(&self, register: &RegisterRef) -> Result<f64> {
        let register_id = register.register_id.as_str();
        let url = format!("{}{}", self.base_url, self.path);
        debug!(register_id, url = %url, "Reading register value");

        let response = self
            .client
            .get(&url)
            .query(&[("id", register_id)])
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "request timed out".to_owned()
                } else {
                    format!("request failed: {e}")
                };
                warn!(register_id, %reason, "Value source unreachable");
                TallyError::unavailable(register_id, reason)
            })?;

        match response.status() {
            status if status.is_success() => {
                let body: Value = response.json().await.map_err(|e| {
                    TallyError::unavailable(register_id, format!("invalid response body: {e}"))
                })?;
                let value = parse_value(&body).ok_or_else(|| {
                    warn!(register_id, %body, "Value source returned no numeric value");
                    TallyError::unavailable(register_id, "response carried no numeric value")
                })?;
                debug!(register_id, value, "Register value read");
                Ok(value)
            }
            status => {
                warn!(register_id, %status, "Value source answered with an error status");
                Err(TallyError::unavailable(
                    register_id,
                    format!("polling service answered {status}"),
                ))
            }
        }
    }
}

fn parse_value(body: &Value) -> Option<f64> {
    let value = match body.get("value")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => return None,
    };
    value.is_finite().then_some(value)
}

/// In-process value source keyed by register id.
#[derive(Debug, Default)]
pub struct StaticValueSource {
    values: RwLock<HashMap<String, f64>>,
}

impl StaticValueSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, register_id: impl Into<String>, value: f64) {
        self.values.write().insert(register_id.into(), value);
    }

    /// Makes the register unreadable until it is set again.
    pub fn remove(&self, register_id: &str) {
        self.values.write().remove(register_id);
    }
}

#[async_trait]
impl ValueSource for StaticValueSource {
    async fn current_value(&self, register: &RegisterRef) -> Result<f64> {
        self.values
            .read()
            .get(&register.register_id)
            .copied()
            .ok_or_else(|| TallyError::unavailable(&register.register_id, "no value published"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tally_types::{ByteOrder, DataType};

    fn register(id: &str) -> RegisterRef {
        RegisterRef {
            analyzer_id: "an-1".to_owned(),
            analyzer_name: None,
            register_id: id.to_owned(),
            address: 1,
            data_type: DataType::Float32,
            scale: 1.0,
            byte_order: ByteOrder::Abcd,
        }
    }

    fn source(url: String) -> HttpValueSource {
        HttpValueSource::new(url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_reads_numeric_value() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", DEFAULT_VALUE_PATH)
            .match_query(Matcher::UrlEncoded("id".into(), "reg-7".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "value": 1234.5 }).to_string())
            .create_async()
            .await;

        let value = source(server.url())
            .current_value(&register("reg-7"))
            .await
            .unwrap();

        assert!((value - 1234.5).abs() < f64::EPSILON);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_accepts_numeric_string() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", DEFAULT_VALUE_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({ "value": " 42.25 " }).to_string())
            .create_async()
            .await;

        let value = source(server.url())
            .current_value(&register("reg-1"))
            .await
            .unwrap();

        assert!((value - 42.25).abs() < f64::EPSILON);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_unavailable() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", DEFAULT_VALUE_PATH)
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let err = source(server.url())
            .current_value(&register("reg-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, TallyError::ValueSourceUnavailable { .. }));
        // Exactly one request: no retries.
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_value_is_unavailable() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", DEFAULT_VALUE_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({ "value": null }).to_string())
            .create_async()
            .await;

        let err = source(server.url())
            .current_value(&register("reg-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::ValueSourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let source = HttpValueSource::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = source.current_value(&register("reg-1")).await.unwrap_err();
        assert!(err.kind().is_retryable());
    }

    #[test]
    fn parse_rejects_non_numeric_values() {
        assert_eq!(parse_value(&json!({ "value": "abc" })), None);
        assert_eq!(parse_value(&json!({ "value": true })), None);
        assert_eq!(parse_value(&json!({ "other": 1 })), None);
        assert_eq!(parse_value(&json!({ "value": "NaN" })), None);
        assert_eq!(parse_value(&json!({ "value": 3 })), Some(3.0));
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticValueSource::new();
        source.set("reg-1", 10.0);
        assert!((source.current_value(&register("reg-1")).await.unwrap() - 10.0).abs() < f64::EPSILON);

        source.remove("reg-1");
        assert!(source.current_value(&register("reg-1")).await.is_err());
    }
}
