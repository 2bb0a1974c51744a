use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use licensegate_config::{Config, SecretSource};
use licensegate_contracts::{
    CatalogEntry, CatalogPage, DecisionRequest, DecisionResponse, DeleteRequests, DeleteResponse,
    ErrorBody, ErrorResponse, RequestRecord, RequestStatus, StatusUpdate, Submission,
    SubmitResponse,
};
use licensegate_kernel::{
    build_record, catalog_gate, has_keyword_match, is_valid_principal, precheck,
    resolve_id_hint, resolve_status, resolve_tool, AutoApproval, RequestStore,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

mod catalog;
mod notify;

pub use catalog::{CatalogCache, CatalogError};
pub use notify::{Notifier, NotifyError, TOPIC_LABEL};

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "licensegate listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    build_app_with_secrets(cfg, SecretSource::Env).await
}

pub async fn build_app_with_secrets(cfg: Config, secrets: SecretSource) -> Result<Router, String> {
    let state = AppState::new(&cfg, secrets)?;
    Ok(Router::new()
        .route("/healthz", get(healthz))
        .merge(portal_routes())
        .nest("/api", portal_routes())
        .with_state(state))
}

/// Served both at the root and under `/api`.
fn portal_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/requests",
            get(list_requests)
                .post(submit_request)
                .delete(delete_requests),
        )
        .route("/requests/{id}/status", patch(update_request_status))
        .route("/approve", post(approve_request))
        .route("/reject", post(reject_request))
        .route("/test-notify", get(test_notify))
        .route("/catalog", get(search_catalog))
}

#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<RequestStore>>,
    catalog: Arc<CatalogCache>,
    notifier: Arc<Notifier>,
}

/// Result of an approve/reject. The status change is committed before notification is attempted,
/// so a failed notification still leaves the new status in place.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub request: RequestRecord,
    pub notification: NotificationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Delivered,
    Failed(String),
}

impl AppState {
    fn new(cfg: &Config, secrets: SecretSource) -> Result<Self, String> {
        Ok(Self {
            store: Arc::new(Mutex::new(RequestStore::new())),
            catalog: Arc::new(CatalogCache::new(&cfg.catalog.csv_path)),
            notifier: Arc::new(Notifier::new(&cfg.notify, secrets)?),
        })
    }

    async fn auto_approval(&self, sub: &Submission) -> AutoApproval {
        if let Err(reason_code) = precheck(sub) {
            return AutoApproval::Deny { reason_code };
        }
        match self.catalog.load().await {
            Ok(catalog) => catalog_gate(resolve_tool(sub).as_deref(), &catalog),
            Err(e) => {
                warn!(error = %e, "auto-approval skipped: catalog unavailable");
                AutoApproval::Deny {
                    reason_code: "catalog_unavailable",
                }
            }
        }
    }

    async fn submit(&self, sub: Submission) -> RequestRecord {
        let verdict = self.auto_approval(&sub).await;
        let status = resolve_status(&sub, verdict.is_approved());
        let hint = resolve_id_hint(&sub);
        let now = Utc::now();

        let record = {
            let mut store = self.store.lock().await;
            store.admit(hint.as_deref(), |id| build_record(id, &sub, status, now))
        };
        info!(
            request_id = %record.id,
            tool = %record.tool,
            status = record.status.as_str(),
            reason_code = verdict.reason_code(),
            "request admitted"
        );
        record
    }

    async fn set_status(&self, id: &str, status: RequestStatus) -> Result<RequestRecord, ApiError> {
        let updated = {
            let mut store = self.store.lock().await;
            store.update_status(id, status)
        };
        match updated {
            Some(record) => {
                info!(request_id = id, status = status.as_str(), "status updated");
                Ok(record)
            }
            None => Err(ApiError::not_found(format!("request {id} not found"))),
        }
    }

    async fn decide(
        &self,
        input: DecisionRequest,
        status: RequestStatus,
    ) -> Result<DecisionOutcome, ApiError> {
        let request_id = input
            .request_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::validation("requestId is required"))?
            .to_string();
        let principal = [input.user_upn.as_deref(), input.user_email.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|v| !v.is_empty())
            .unwrap_or_default()
            .to_string();
        if !is_valid_principal(&principal) {
            return Err(ApiError::validation(
                "userEmail or userUpn must be a valid user principal",
            ));
        }

        let request = self.set_status(&request_id, status).await?;
        let message = decision_message(&request);
        let notification = match self.notifier.notify(&principal, &message).await {
            Ok(()) => NotificationOutcome::Delivered,
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    status = status.as_str(),
                    error = %e,
                    "decision notification failed"
                );
                NotificationOutcome::Failed(e.to_string())
            }
        };
        Ok(DecisionOutcome {
            request,
            notification,
        })
    }
}

fn decision_message(request: &RequestRecord) -> String {
    let verb = match request.status {
        RequestStatus::Approved => "approved",
        RequestStatus::Rejected => "rejected",
        RequestStatus::Pending => "updated",
    };
    format!(
        "Your request {} for {} has been {verb}.",
        request.id, request.tool
    )
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request: Option<RequestRecord>,
}

impl ApiError {
    fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: message.into(),
            request: None,
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
            request: None,
        }
    }

    fn dependency(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            message: message.into(),
            request: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code.to_string(),
                message: self.message,
                details: None,
            },
            request: self.request,
        };
        (self.status, Json(body)).into_response()
    }
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Missing, non-JSON or mistyped bodies decode to the default value so field checks report them.
fn lenient_body<T: DeserializeOwned + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

/// Submissions never fail: an unreadable body is treated as an empty submission.
async fn submit_request(State(state): State<AppState>, body: Bytes) -> Json<SubmitResponse> {
    let sub: Submission = lenient_body(&body);
    let request = state.submit(sub).await;
    let message = if request.status == RequestStatus::Approved {
        "Request submitted and approved"
    } else {
        "Request submitted successfully"
    };
    Json(SubmitResponse {
        message: message.to_string(),
        request,
    })
}

async fn list_requests(State(state): State<AppState>) -> Json<Vec<RequestRecord>> {
    Json(state.store.lock().await.list())
}

async fn update_request_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<RequestRecord>, ApiError> {
    let input: StatusUpdate = lenient_body(&body);
    let raw = input
        .status
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation("status is required"))?;
    let status = RequestStatus::parse(raw).ok_or_else(|| {
        ApiError::validation(format!(
            "status must be one of Pending, Approved, Rejected; got {raw:?}"
        ))
    })?;
    state.set_status(&id, status).await.map(Json)
}

async fn delete_requests(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DeleteResponse>, ApiError> {
    let input: DeleteRequests = lenient_body(&body);
    let ids: Vec<String> = input
        .ids
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    if ids.is_empty() {
        return Err(ApiError::validation("ids must be a non-empty array"));
    }

    let (deleted_count, remaining) = {
        let mut store = state.store.lock().await;
        let deleted = store.delete_many(&ids);
        (deleted, store.len())
    };
    info!(deleted_count, remaining, "requests deleted");
    Ok(Json(DeleteResponse {
        deleted_count,
        remaining,
    }))
}

async fn approve_request(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DecisionResponse>, ApiError> {
    let input: DecisionRequest = lenient_body(&body);
    decision_response(state.decide(input, RequestStatus::Approved).await?)
}

async fn reject_request(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DecisionResponse>, ApiError> {
    let input: DecisionRequest = lenient_body(&body);
    decision_response(state.decide(input, RequestStatus::Rejected).await?)
}

fn decision_response(outcome: DecisionOutcome) -> Result<Json<DecisionResponse>, ApiError> {
    match outcome.notification {
        NotificationOutcome::Delivered => Ok(Json(DecisionResponse {
            success: true,
            request: outcome.request,
        })),
        NotificationOutcome::Failed(message) => Err(ApiError {
            request: Some(outcome.request),
            ..ApiError::dependency("notification_failed", message)
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestNotifyQuery {
    user_upn: Option<String>,
}

async fn test_notify(
    State(state): State<AppState>,
    Query(query): Query<TestNotifyQuery>,
) -> Result<Json<Value>, ApiError> {
    let principal = query.user_upn.unwrap_or_default();
    match state
        .notifier
        .notify(&principal, "Test notification from the license request portal.")
        .await
    {
        Ok(()) => Ok(Json(json!({"ok": true}))),
        Err(e) if e.is_client_error() => Err(ApiError::validation(e.to_string())),
        Err(e) => Err(ApiError::dependency("notification_failed", e.to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CatalogQuery {
    search: Option<String>,
    category: Option<String>,
    license_type: Option<String>,
    sort_by: Option<String>,
    order: Option<String>,
}

async fn search_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<CatalogPage>, ApiError> {
    let catalog = state
        .catalog
        .load()
        .await
        .map_err(|e| ApiError::dependency("catalog_unavailable", e.to_string()))?;
    let items = filter_catalog(&catalog, &query);
    Ok(Json(CatalogPage {
        total: items.len(),
        items,
    }))
}

fn filter_catalog(catalog: &[CatalogEntry], query: &CatalogQuery) -> Vec<CatalogEntry> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let same = |want: &Option<String>, have: &str| {
        want.as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or(true, |v| v.eq_ignore_ascii_case(have.trim()))
    };

    let mut items: Vec<CatalogEntry> = catalog
        .iter()
        .filter(|entry| search.map_or(true, |s| has_keyword_match(s, entry)))
        .filter(|entry| same(&query.category, &entry.category))
        .filter(|entry| same(&query.license_type, &entry.license_type))
        .cloned()
        .collect();

    let key = |entry: &CatalogEntry| -> String {
        match query.sort_by.as_deref() {
            Some("category") => entry.category.to_lowercase(),
            Some("licenseType") => entry.license_type.to_lowercase(),
            _ => entry.software_name.to_lowercase(),
        }
    };
    items.sort_by_cached_key(key);
    if query.order.as_deref() == Some("desc") {
        items.reverse();
    }
    items
}
