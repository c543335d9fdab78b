//! Axum server and routes.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use custos_crypto::FieldCodec;
use custos_recorder::{AuditRecorder, Details, RecorderError, RetryQueue};
use custos_types::{
    Actor, AlertStore, AuditLogFilter, AuditStore, AuthAction, DataAction, DateRange, ExportFormat,
    IdentityProvider, RemoteSink, RequestContext, RiskLevel, SecurityAlert,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Identity resolved from the request headers, pinned for the lifetime of
/// one recorder call.
struct RequestIdentity(Option<Actor>);

#[async_trait::async_trait]
impl IdentityProvider for RequestIdentity {
    async fn current_actor(&self) -> Option<Actor> {
        self.0.clone()
    }
}

/// Shared pipeline legs. A recorder is assembled per request so the actor
/// from the gateway headers rides along; every leg behind it is shared.
pub struct AppState {
    pub local: Arc<dyn AuditStore>,
    pub sink: Arc<dyn RemoteSink>,
    pub retry: Arc<RetryQueue>,
    pub alerts: Arc<dyn AlertStore>,
    pub codec: Option<FieldCodec>,
}

impl AppState {
    fn recorder_for(&self, actor: Option<Actor>) -> AuditRecorder {
        let recorder = AuditRecorder::new(
            Arc::new(RequestIdentity(actor)),
            Arc::clone(&self.local),
            Arc::clone(&self.sink),
            Arc::clone(&self.retry),
            Arc::clone(&self.alerts),
        );
        match &self.codec {
            Some(codec) => recorder.with_codec(codec.clone()),
            None => recorder,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/audit/data-access", post(handle_data_access))
        .route("/audit/data-change", post(handle_data_change))
        .route("/audit/phi-access", post(handle_phi_access))
        .route("/audit/ferpa-access", post(handle_ferpa_access))
        .route("/audit/auth-event", post(handle_auth_event))
        .route("/audit/admin-action", post(handle_admin_action))
        .route("/audit/data-export", post(handle_data_export))
        .route("/audit/correction", post(handle_correction))
        .route("/audit/list", get(handle_list))
        .route("/audit/report", get(handle_report))
        .route("/audit/export", get(handle_export))
        .route("/audit/alerts", get(handle_alerts))
        .route("/audit/clear", post(handle_clear))
        .route("/audit/retry", post(handle_retry))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            code: 200,
            message: "Success".to_string(),
            data: Some(data),
        })
    }

    fn err(code: i32, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code,
            message: message.into(),
            data: None,
        })
    }
}

/// Actor forwarded by the authenticating gateway. All three identity
/// headers must be present; otherwise the write proceeds as anonymous.
fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Some(Actor {
        user_id: get("x-user-id")?,
        email: get("x-user-email")?,
        role: get("x-user-role")?,
        organization_id: get("x-organization-id"),
    })
}

fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    RequestContext {
        ip: get("x-forwarded-for"),
        user_agent: get("user-agent"),
        session_id: get("x-session-id"),
        request_id: get("x-request-id"),
    }
}

#[derive(Debug, Serialize)]
pub struct EntryIdResponse {
    pub entry_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DataAccessRequest {
    pub action: DataAction,
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub details: Option<Details>,
}

async fn handle_data_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DataAccessRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_data_access(
            req.action,
            &req.resource_type,
            req.resource_id.as_deref(),
            req.resource_name.as_deref(),
            req.details,
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct DataChangeRequest {
    pub action: DataAction,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default)]
    pub before: Option<serde_json::Value>,
    #[serde(default)]
    pub after: Option<serde_json::Value>,
}

async fn handle_data_change(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DataChangeRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_data_change(
            req.action,
            &req.resource_type,
            &req.resource_id,
            req.before,
            req.after,
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct PhiAccessRequest {
    pub resource_type: String,
    pub resource_id: String,
    pub phi_type: String,
    pub access_granted: bool,
    #[serde(default)]
    pub justification: Option<String>,
}

async fn handle_phi_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PhiAccessRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_phi_access(
            &req.resource_type,
            &req.resource_id,
            &req.phi_type,
            req.access_granted,
            req.justification.as_deref(),
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct FerpaAccessRequest {
    pub child_id: String,
    pub child_name: String,
    pub action: DataAction,
    #[serde(default)]
    pub parent_requested: bool,
}

async fn handle_ferpa_access(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<FerpaAccessRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_ferpa_access(
            &req.child_id,
            &req.child_name,
            req.action,
            req.parent_requested,
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct AuthEventRequest {
    pub action: AuthAction,
    pub success: bool,
    #[serde(default)]
    pub details: Option<Details>,
}

async fn handle_auth_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AuthEventRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_auth_event(
            req.action,
            req.success,
            req.details,
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct AdminActionRequest {
    pub action: String,
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub details: Option<Details>,
}

async fn handle_admin_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AdminActionRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_admin_action(
            &req.action,
            &req.resource_type,
            req.resource_id.as_deref(),
            req.details,
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct DataExportRequest {
    pub export_type: String,
    pub record_count: usize,
    #[serde(default)]
    pub includes_phi: bool,
    #[serde(default)]
    pub includes_ferpa: bool,
    pub format: String,
}

async fn handle_data_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DataExportRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_data_export(
            &req.export_type,
            req.record_count,
            req.includes_phi,
            req.includes_ferpa,
            &req.format,
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub original_entry_id: String,
    pub resource_type: String,
    pub reason: String,
    #[serde(default)]
    pub details: Option<Details>,
}

async fn handle_correction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CorrectionRequest>,
) -> Json<ApiResponse<EntryIdResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    let entry_id = recorder
        .log_correction(
            &req.original_entry_id,
            &req.resource_type,
            &req.reason,
            req.details,
            context_from_headers(&headers),
        )
        .await;
    ApiResponse::ok(EntryIdResponse { entry_id })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl ListQuery {
    fn into_filter(self) -> AuditLogFilter {
        let range = match (self.from, self.to) {
            (Some(from), Some(to)) => Some(DateRange { from, to }),
            (Some(from), None) => Some(DateRange {
                from,
                to: Utc::now(),
            }),
            _ => None,
        };
        AuditLogFilter {
            actor_id: self.actor_id,
            resource_type: self.resource_type,
            action: self.action,
            risk_level: self.risk_level,
            range,
        }
    }
}

async fn handle_list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Json<ApiResponse<Vec<custos_types::AuditEntry>>> {
    match state.local.list(&q.into_filter()).await {
        Ok(entries) => ApiResponse::ok(entries),
        Err(e) => ApiResponse::err(500, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

async fn handle_report(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ReportQuery>,
) -> Json<ApiResponse<custos_types::ComplianceReport>> {
    // Default window: the trailing 30 days.
    let to = q.to.unwrap_or_else(Utc::now);
    let from = q.from.unwrap_or(to - Duration::days(30));
    match custos_recorder::generate_report(state.local.as_ref(), DateRange { from, to }).await {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => ApiResponse::err(500, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: String,
}

async fn handle_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<ExportQuery>,
) -> axum::response::Response {
    let format: ExportFormat = match q.format.parse() {
        Ok(f) => f,
        Err(e) => {
            return ApiResponse::<()>::err(400, e).into_response();
        }
    };
    let recorder = state.recorder_for(actor_from_headers(&headers));
    match recorder
        .export_audit_logs(format, &AuditLogFilter::default())
        .await
    {
        Ok(body) => {
            let content_type = match format {
                ExportFormat::Json => "application/json",
                ExportFormat::Csv => "text/csv",
            };
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => ApiResponse::<()>::err(500, e.to_string()).into_response(),
    }
}

async fn handle_alerts(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<SecurityAlert>>> {
    match state.alerts.list().await {
        Ok(alerts) => ApiResponse::ok(alerts),
        Err(e) => ApiResponse::err(500, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub archived: usize,
}

async fn handle_clear(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ClearRequest>,
) -> Json<ApiResponse<ClearResponse>> {
    let recorder = state.recorder_for(actor_from_headers(&headers));
    match recorder
        .clear_audit_logs(&req.reason, context_from_headers(&headers))
        .await
    {
        Ok(archived) => ApiResponse::ok(ClearResponse { archived }),
        Err(RecorderError::Forbidden(msg)) => ApiResponse::err(403, msg),
        Err(e) => ApiResponse::err(500, e.to_string()),
    }
}

async fn handle_retry(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<custos_types::RetryStats>> {
    let stats = state.retry.retry_all().await;
    ApiResponse::ok(stats)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub buffered_entries: usize,
    pub pending_retries: usize,
}

/// Liveness is proven by an actual store round trip, not by a canned body.
async fn handle_health(State(state): State<Arc<AppState>>) -> axum::response::Response {
    match state.local.list(&AuditLogFilter::default()).await {
        Ok(entries) => Json(HealthResponse {
            status: "ok",
            buffered_entries: entries.len(),
            pending_retries: state.retry.pending().await,
        })
        .into_response(),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ApiResponse::<()>::err(503, e.to_string()),
        )
            .into_response(),
    }
}
