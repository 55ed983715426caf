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

//! Tally server - metering ledger and billing API.

mod api;
mod config;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{
    Database, HtmlReportRenderer, HttpValueSource, RetentionPolicy, TrendLogLedger,
};
use tracing::{info, warn};

use crate::api::{AppState, Services};
use crate::config::ServerConfig;

#[derive(Parser)]
#[command(name = "tally-server")]
#[command(about = "Metering ledger and billing-cycle server", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "./tally.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_file(&cli.config)?;
    info!(config = %cli.config, "Starting Tally server");

    let db = Arc::new(
        Database::open(&config.database.path)
            .with_context(|| format!("Failed to open database at {}", config.database.path))?,
    );
    let source = Arc::new(
        HttpValueSource::with_path(
            config.value_source.base_url.clone(),
            config.value_source.path.clone(),
            config.value_source.timeout(),
        )
        .context("Failed to build value source client")?,
    );
    let services = Services::new(Arc::clone(&db), source, Arc::new(HtmlReportRenderer));

    let state = AppState {
        services: Arc::new(services),
        shared_secret: Arc::from(config.auth.shared_secret.as_str()),
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    let retention = RetentionPolicy::days(config.database.exported_retention_days);
    let ledger = TrendLogLedger::new(db);
    let sweep_every = Duration::from_secs(config.database.retention_sweep_secs);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result.context("HTTP server failed")?;
        }
        () = run_retention(ledger, retention, sweep_every) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn run_retention(ledger: TrendLogLedger, policy: RetentionPolicy, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = policy.sweep(&ledger, Utc::now()) {
            warn!(error = %e, "Retention sweep failed");
        }
    }
}
