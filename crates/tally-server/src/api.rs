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

//! HTTP boundary over the ledger engine.

use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tally_core::{
    AccountProfile, BillingExporter, Database, ErrorKind, MeteringAccounts, ReportRenderer,
    ReportSchedules, TallyError, TrendLogFilter, TrendLogLedger, TrendLogLocks,
    TrendLogRegistry, TrendRecorder, UsageReports, ValueSource,
};
use tally_types::{
    AccountDraft, AccountId, AccountKind, AccountUpdate, ComparisonFilter, LogMode,
    MeteringAccount, NewTrendLog, PeriodComparison, ReportSchedule, ReportScheduleDraft,
    TrendLogConfig, TrendLogEntry, TrendLogId, TrendLogUpdate,
};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Every engine component the handlers reach, wired to one database.
#[derive(Debug)]
pub struct Services {
    pub registry: TrendLogRegistry,
    pub ledger: TrendLogLedger,
    pub recorder: TrendRecorder,
    pub usage: UsageReports,
    pub schedules: ReportSchedules,
    pub billing: MeteringAccounts,
    pub widgets: MeteringAccounts,
    pub billing_export: BillingExporter,
    pub widget_export: BillingExporter,
}

impl Services {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn ValueSource>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        let locks = Arc::new(TrendLogLocks::new());
        let exporter = |profile| {
            BillingExporter::new(
                Arc::clone(&db),
                Arc::clone(&source),
                Arc::clone(&locks),
                Arc::clone(&renderer),
                profile,
            )
        };

        Self {
            billing_export: exporter(AccountProfile::BILLING),
            widget_export: exporter(AccountProfile::WIDGET),
            registry: TrendLogRegistry::new(Arc::clone(&db), Arc::clone(&source)),
            ledger: TrendLogLedger::new(Arc::clone(&db)),
            recorder: TrendRecorder::new(Arc::clone(&db)),
            usage: UsageReports::new(Arc::clone(&db)),
            schedules: ReportSchedules::new(Arc::clone(&db)),
            billing: MeteringAccounts::billing_cycles(
                Arc::clone(&db),
                Arc::clone(&source),
                Arc::clone(&locks),
            ),
            widgets: MeteringAccounts::consumption_widgets(db, source, locks),
        }
    }

    fn accounts(&self, kind: AccountKind) -> &MeteringAccounts {
        match kind {
            AccountKind::Billing => &self.billing,
            AccountKind::Widget => &self.widgets,
        }
    }

    fn exporter(&self, kind: AccountKind) -> &BillingExporter {
        match kind {
            AccountKind::Billing => &self.billing_export,
            AccountKind::Widget => &self.widget_export,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub shared_secret: Arc<str>,
}

/// Engine error rendered as `{"error", "kind"}` with a matching status.
#[derive(Debug)]
pub struct ApiError(TallyError);

impl From<TallyError> for ApiError {
    fn from(e: TallyError) -> Self {
        Self(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ValueSourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::MissingBaseline => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::LedgerInconsistency
        | ErrorKind::Render
        | ErrorKind::Storage
        | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!(kind = kind.as_str(), error = %self.0, "Request failed");
        }
        (
            status,
            Json(json!({ "error": self.0.to_string(), "kind": kind })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn require_secret(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == &*state.shared_secret);

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected request without a valid shared secret");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "missing or invalid shared secret", "kind": "forbidden" })),
        )
            .into_response();
    }
    next.run(request).await
}

// ==================== Trend logs ====================

#[derive(Debug, Deserialize)]
struct TrendLogQuery {
    analyzer_id: Option<String>,
    mode: Option<LogMode>,
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn list_trend_logs(
    State(state): State<AppState>,
    Query(query): Query<TrendLogQuery>,
) -> ApiResult<Json<Vec<TrendLogConfig>>> {
    let filter = TrendLogFilter {
        analyzer_id: query.analyzer_id,
        mode: query.mode,
    };
    Ok(Json(state.services.registry.list(&filter)?))
}

async fn create_trend_log(
    State(state): State<AppState>,
    Json(draft): Json<NewTrendLog>,
) -> ApiResult<(StatusCode, Json<TrendLogConfig>)> {
    let config = state.services.registry.create(draft).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn get_trend_log(
    State(state): State<AppState>,
    Path(id): Path<TrendLogId>,
) -> ApiResult<Json<TrendLogConfig>> {
    Ok(Json(state.services.registry.get(id)?))
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn update_trend_log(
    State(state): State<AppState>,
    Path(id): Path<TrendLogId>,
    Json(patch): Json<TrendLogUpdate>,
) -> ApiResult<Json<TrendLogConfig>> {
    Ok(Json(state.services.registry.update(id, patch)?))
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn delete_trend_log(
    State(state): State<AppState>,
    Path(id): Path<TrendLogId>,
) -> ApiResult<StatusCode> {
    state.services.registry.delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct EntriesQuery {
    limit: Option<usize>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn list_entries(
    State(state): State<AppState>,
    Path(id): Path<TrendLogId>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Json<Vec<TrendLogEntry>>> {
    let services = &state.services;
    let partition = services.registry.resolve_partition(id)?;
    let entries = match (query.from, query.to) {
        (Some(from), Some(to)) => services.ledger.range(partition, id, from, to)?,
        (None, None) => services.ledger.entries(partition, id, query.limit)?,
        (Some(_), None) | (None, Some(_)) => {
            return Err(TallyError::Validation("from and to go together".to_owned()).into());
        }
    };
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct Observation {
    value: f64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct ObservationResponse {
    recorded: bool,
    entry: Option<TrendLogEntry>,
}

/// Poller hook. The recording policy decides whether the value is stored.
#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn record_observation(
    State(state): State<AppState>,
    Path(id): Path<TrendLogId>,
    Json(observation): Json<Observation>,
) -> ApiResult<Json<ObservationResponse>> {
    let at = observation.timestamp.unwrap_or_else(Utc::now);
    let entry = state.services.recorder.observe(id, observation.value, at)?;
    Ok(Json(ObservationResponse {
        recorded: entry.is_some(),
        entry,
    }))
}

#[derive(Debug, Deserialize)]
struct ComparisonQuery {
    #[serde(default)]
    filter: ComparisonFilter,
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn comparison(
    State(state): State<AppState>,
    Path(id): Path<TrendLogId>,
    Query(query): Query<ComparisonQuery>,
) -> ApiResult<Json<PeriodComparison>> {
    Ok(Json(state.services.usage.compare(id, query.filter)?))
}

// ==================== Billing cycles and widgets ====================

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn list_accounts(
    State(state): State<AppState>,
    Extension(kind): Extension<AccountKind>,
) -> ApiResult<Json<Vec<MeteringAccount>>> {
    Ok(Json(state.services.accounts(kind).list()?))
}

async fn create_account(
    State(state): State<AppState>,
    Extension(kind): Extension<AccountKind>,
    Json(draft): Json<AccountDraft>,
) -> ApiResult<(StatusCode, Json<MeteringAccount>)> {
    let account = state.services.accounts(kind).create(draft).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn update_account(
    State(state): State<AppState>,
    Extension(kind): Extension<AccountKind>,
    Path(id): Path<AccountId>,
    Json(patch): Json<AccountUpdate>,
) -> ApiResult<Json<MeteringAccount>> {
    Ok(Json(state.services.accounts(kind).update(id, patch).await?))
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn delete_account(
    State(state): State<AppState>,
    Extension(kind): Extension<AccountKind>,
    Path(id): Path<AccountId>,
) -> ApiResult<StatusCode> {
    state.services.accounts(kind).delete(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Closes the cycle and returns the report as a download.
async fn export_account(
    State(state): State<AppState>,
    Extension(kind): Extension<AccountKind>,
    Path(id): Path<AccountId>,
) -> ApiResult<Response> {
    let outcome = state.services.exporter(kind).export(id).await?;
    let document = outcome.document;
    Ok((
        [
            (header::CONTENT_TYPE, document.content_type.to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.file_name),
            ),
        ],
        document.body,
    )
        .into_response())
}

fn account_routes(kind: AccountKind) -> Router<AppState> {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route("/{id}", axum::routing::put(update_account).delete(delete_account))
        .route("/export/{id}", get(export_account))
        .layer(Extension(kind))
}

// ==================== Report schedules ====================

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn list_schedules(State(state): State<AppState>) -> ApiResult<Json<Vec<ReportSchedule>>> {
    Ok(Json(state.services.schedules.list()?))
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn create_schedule(
    State(state): State<AppState>,
    Json(draft): Json<ReportScheduleDraft>,
) -> ApiResult<(StatusCode, Json<ReportSchedule>)> {
    let schedule = state.services.schedules.create(draft)?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/trend-logs", get(list_trend_logs).post(create_trend_log))
        .route(
            "/api/trend-logs/{id}",
            get(get_trend_log)
                .put(update_trend_log)
                .delete(delete_trend_log),
        )
        .route(
            "/api/trend-logs/{id}/entries",
            get(list_entries).post(record_observation),
        )
        .route("/api/trend-logs/{id}/comparison", get(comparison))
        .nest("/api/billings", account_routes(AccountKind::Billing))
        .nest("/api/widgets", account_routes(AccountKind::Widget))
        .route(
            "/api/report-schedules",
            get(list_schedules).post(create_schedule),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_secret))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
