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

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tally_core::value_source::DEFAULT_VALUE_PATH;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub value_source: ValueSourceSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub shared_secret: String,
}

/// Where live register values are read from.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueSourceSettings {
    pub base_url: String,
    #[serde(default = "default_value_path")]
    pub path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_exported_retention_days")]
    pub exported_retention_days: u32,
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8200
}

fn default_value_path() -> String {
    DEFAULT_VALUE_PATH.to_owned()
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_db_path() -> String {
    "./data/tally.db".to_owned()
}

fn default_exported_retention_days() -> u32 {
    365
}

fn default_retention_sweep_secs() -> u64 {
    3600
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            exported_retention_days: default_exported_retention_days(),
            retention_sweep_secs: default_retention_sweep_secs(),
        }
    }
}

impl ValueSourceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.auth.shared_secret.is_empty()
            || self.auth.shared_secret == "change-me-to-a-strong-random-secret"
        {
            bail!("auth.shared_secret must be set to a strong random value");
        }
        if !(self.value_source.base_url.starts_with("http://")
            || self.value_source.base_url.starts_with("https://"))
        {
            bail!("value_source.base_url must be an http(s) URL");
        }
        if !self.value_source.path.starts_with('/') {
            bail!("value_source.path must start with '/'");
        }
        if !(100..=10_000).contains(&self.value_source.timeout_ms) {
            bail!("value_source.timeout_ms must be between 100 and 10000");
        }
        if self.database.exported_retention_days == 0 {
            bail!("database.exported_retention_days must be at least 1");
        }
        if self.database.retention_sweep_secs == 0 {
            bail!("database.retention_sweep_secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn load(content: &str) -> Result<ServerConfig> {
        let file = write(content);
        ServerConfig::from_file(file.path().to_str().unwrap())
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = load(
            r#"
            [auth]
            shared_secret = "s3cret"

            [value_source]
            base_url = "http://127.0.0.1:3001"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8200);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.value_source.path, DEFAULT_VALUE_PATH);
        assert_eq!(config.value_source.timeout(), Duration::from_secs(3));
        assert_eq!(config.database.exported_retention_days, 365);
        assert_eq!(config.database.retention_sweep_secs, 3600);
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        let err = load(
            r#"
            [auth]
            shared_secret = "change-me-to-a-strong-random-secret"

            [value_source]
            base_url = "http://127.0.0.1:3001"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("shared_secret"));
    }

    #[test]
    fn timeout_must_stay_bounded() {
        let err = load(
            r#"
            [auth]
            shared_secret = "s3cret"

            [value_source]
            base_url = "http://127.0.0.1:3001"
            timeout_ms = 60000
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn value_source_section_is_required() {
        assert!(load("[auth]\nshared_secret = \"s3cret\"\n").is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = ServerConfig::from_file("/nonexistent/tally.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
