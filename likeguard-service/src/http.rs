use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use likeguard_core::{Identity, LikeError, LikeService, LikeStore, SubjectKind, SubjectRef};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

pub struct AppState<S: LikeStore> {
    pub service: LikeService<S>,
    pub admin_token: Option<String>,
}

pub fn router<S: LikeStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/likes/:subject_type/:subject_id", get(like_state::<S>))
        .route("/likes", post(toggle_like::<S>))
        .route("/admin/likes", delete(clear_ledger::<S>))
        .with_state(state)
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Handler-boundary error. Every component error is mapped to exactly one
/// status here; nothing propagates unmapped and nothing is retried
/// server-side.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Too many like actions")]
    Throttled { retry_after: Duration },
    #[error("Action not allowed")]
    Suspicious,
    #[error("Storage failure: {0}")]
    Store(String),
    #[error("Operator token required")]
    Unauthorized,
    #[error("Admin operations are not configured")]
    AdminDisabled,
}

impl From<LikeError> for ApiError {
    fn from(err: LikeError) -> Self {
        match err {
            LikeError::Validation(msg) => ApiError::Validation(msg),
            LikeError::Throttled { retry_after } => ApiError::Throttled { retry_after },
            LikeError::Suspicious => ApiError::Suspicious,
            LikeError::Store(msg) => ApiError::Store(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Throttled { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": "too many like actions, slow down" })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            // The message stays generic so the heuristic is not revealed;
            // the code field lets the frontend distinguish outcomes.
            ApiError::Suspicious => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "action not allowed",
                    "code": "network_duplicate",
                })),
            )
                .into_response(),
            ApiError::Store(msg) => {
                tracing::error!(error = %msg, "store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "operator token required" })),
            )
                .into_response(),
            ApiError::AdminDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "admin operations are not configured" })),
            )
                .into_response(),
        }
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Subject ids arrive as JSON numbers, decimal strings or kind-prefixed
/// strings depending on the caller; all three normalize to the same subject.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub subject_id: SubjectId,
    pub subject_type: String,
    pub identity: String,
    /// Client clock, kept for wire compatibility. Validated as present; the
    /// guard runs on the server clock.
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    identity: String,
}

#[derive(Serialize)]
struct StateBody {
    liked: bool,
    count: u64,
}

#[derive(Serialize)]
struct ToggleBody {
    action: &'static str,
    count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearBody {
    deleted_count: u64,
}

fn resolve_subject(kind_raw: &str, id: &SubjectId) -> Result<SubjectRef, ApiError> {
    let kind: SubjectKind = kind_raw.parse().map_err(ApiError::from)?;
    let subject = match id {
        SubjectId::Number(n) => SubjectRef::new(kind, *n),
        SubjectId::Text(raw) => SubjectRef::from_raw(kind, raw)?,
    };
    Ok(subject)
}

/// First hop of X-Forwarded-For when present, else the socket peer.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or(Some(peer.ip()))
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn like_state<S: LikeStore>(
    State(state): State<Arc<AppState<S>>>,
    Path((subject_type, subject_id)): Path<(String, String)>,
    Query(query): Query<StateQuery>,
) -> Result<Json<StateBody>, ApiError> {
    let subject = resolve_subject(&subject_type, &SubjectId::Text(subject_id))?;
    let identity = Identity::new(query.identity)?;

    let current = state.service.like_state(subject, &identity).await?;
    Ok(Json(StateBody {
        liked: current.liked,
        count: current.count,
    }))
}

async fn toggle_like<S: LikeStore>(
    State(state): State<Arc<AppState<S>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<ToggleRequest>,
) -> Result<Json<ToggleBody>, ApiError> {
    let request_id = Uuid::new_v4();
    let subject = resolve_subject(&body.subject_type, &body.subject_id)?;
    let identity = Identity::new(body.identity)?;
    if body.timestamp <= 0 {
        return Err(ApiError::Validation(
            "timestamp must be a positive epoch value".to_string(),
        ));
    }

    let network = client_ip(&headers, peer);
    let outcome = state
        .service
        .toggle(subject, &identity, network, SystemTime::now())
        .await?;

    tracing::info!(
        %request_id,
        %subject,
        liked = outcome.liked,
        count = outcome.count,
        "toggle handled"
    );
    Ok(Json(ToggleBody {
        action: if outcome.liked { "liked" } else { "unliked" },
        count: outcome.count,
    }))
}

async fn clear_ledger<S: LikeStore>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<ClearBody>, ApiError> {
    let expected = state.admin_token.as_deref().ok_or(ApiError::AdminDisabled)?;
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;
    if presented != expected {
        return Err(ApiError::Unauthorized);
    }

    let deleted_count = state.service.clear_ledger().await?;
    tracing::info!(deleted_count, "admin ledger clear");
    Ok(Json(ClearBody { deleted_count }))
}

// ============================================================================
// TESTS
// ============================================================================
