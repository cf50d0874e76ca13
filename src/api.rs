//! REST API server
//!
//! Thin HTTP surface over the assistant and the analytics tools. The caller's
//! identity arrives in `x-user-id`; authenticating it happens upstream.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::assistant::Assistant;
use crate::error::FinanceError;
use crate::llm::ToolCall;

pub const USER_ID_HEADER: &str = "x-user-id";

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

fn failure(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(ApiResponse::error(message.into())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
}

/// =============================
/// Helpers
/// =============================

pub fn status_for(error: &FinanceError) -> StatusCode {
    match error {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        FinanceError::MalformedFunctionCall | FinanceError::LlmError(_) | FinanceError::HttpError(_) => {
            StatusCode::BAD_GATEWAY
        }
        FinanceError::LlmTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(error: FinanceError) -> Reply {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!(status = status.as_u16(), "request failed: {}", error);
    }
    failure(status, error.to_string())
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

/// UUIDs pass through; anything else maps to the same UUID every time.
pub fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v.trim()).unwrap_or_else(|_| stable_uuid_from_string(v.trim()))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Assistant Endpoint
/// =============================

async fn ai_query(State(state): State<ApiState>, headers: HeaderMap, Json(req): Json<QueryRequest>) -> Reply {
    let Some(user_id) = user_id(&headers) else {
        return failure(StatusCode::BAD_REQUEST, "missing x-user-id header");
    };

    let session_id = parse_or_stable_uuid(req.session_id.as_deref(), &format!("{}:default-session", user_id));
    info!(user_id = %user_id, session_id = %session_id, "assistant query");

    match state.assistant.query(&user_id, &session_id.to_string(), &req.message).await {
        Ok(reply) => {
            let mut data = serde_json::to_value(&reply).unwrap_or(Value::Null);
            if let Some(obj) = data.as_object_mut() {
                obj.insert("sessionId".to_string(), Value::String(session_id.to_string()));
            }
            (StatusCode::OK, Json(ApiResponse::success(data)))
        }
        Err(e) => error_reply(e),
    }
}

/// =============================
/// Analytics Endpoint
/// =============================

/// Runs one catalog tool directly; the body is its argument object.
async fn run_tool(
    State(state): State<ApiState>,
    Path(tool): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let Some(user_id) = user_id(&headers) else {
        return failure(StatusCode::BAD_REQUEST, "missing x-user-id header");
    };

    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Map<String, Value>>(&body) {
            Ok(args) => args,
            Err(e) => return failure(StatusCode::BAD_REQUEST, format!("invalid JSON body: {}", e)),
        }
    };

    let call = ToolCall { name: tool, args };
    match state.assistant.tools().execute(&user_id, &call).await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::success(result.response))),
        Err(e) => error_reply(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Arc<Assistant>) -> Router {
    let state = ApiState { assistant };

    Router::new()
        .route("/health", get(health))
        .route("/api/ai/query", post(ai_query))
        .route("/api/analytics/:tool", post(run_tool))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    assistant: Arc<Assistant>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(assistant);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
