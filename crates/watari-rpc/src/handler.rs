//! JSON-RPC request handlers.

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;
use watari_core::{
    ItemKey, MangaKey, MigrationOptions, MigrationSession, SessionState, SourceId, WatariError,
};

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    // Handle built-in methods
    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    if method == "shutdown" {
        // Acknowledged only; the supervising process stops the server
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "shutting_down"}))),
        );
    }

    let result = dispatch_method(&state, method, &params).await;

    match result {
        Ok(value) => (StatusCode::OK, Json(JsonRpcResponse::success(id, value))),
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            let code = e.to_rpc_error_code();
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string())),
            )
        }
    }
}

// ============================================================================
// Helper macros for extracting parameters
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
macro_rules! get_str_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        $params
            .get($snake)
            .or_else(|| $params.get($camel))
            .and_then(|v| v.as_str())
    };
}

/// Extract a required string parameter or return an error.
macro_rules! require_str_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        match get_str_param!($params, $snake, $camel) {
            Some(s) => s.to_string(),
            None => {
                return Err(WatariError::InvalidParams {
                    message: format!("Missing required parameter: {}", $snake),
                });
            }
        }
    };
}

// ============================================================================
// Session lookup
// ============================================================================

/// Resolve the session named by the `session_id` parameter.
async fn lookup_session(
    state: &AppState,
    params: &Value,
) -> watari_core::Result<Arc<MigrationSession>> {
    let raw = require_str_param!(params, "session_id", "sessionId");
    let id = Uuid::parse_str(&raw).map_err(|e| WatariError::InvalidParams {
        message: format!("Invalid session id: {}", e),
    })?;

    let sessions = state.sessions.read().await;
    sessions
        .get(&id)
        .cloned()
        .ok_or_else(|| WatariError::InvalidParams {
            message: format!("Unknown session: {}", id),
        })
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate handler.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> watari_core::Result<Value> {
    match method {
        // ====================================================================
        // Sessions
        // ====================================================================
        "create_session" => {
            let keys: Vec<MangaKey> = params
                .get("items")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            if keys.is_empty() {
                return Err(WatariError::InvalidParams {
                    message: "items must be a non-empty array of manga keys".into(),
                });
            }

            let candidates: Vec<SourceId> = params
                .get("candidates")
                .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
                .unwrap_or_default()
                .into_iter()
                .map(SourceId::from)
                .collect();

            // Items must exist in the library; the session migrates stored
            // records, not ad-hoc manga.
            let mut manga = Vec::with_capacity(keys.len());
            for key in &keys {
                match state.store.get_record(key)? {
                    Some(record) => manga.push(record.manga),
                    None => {
                        return Err(WatariError::ItemNotFound {
                            key: key.to_string(),
                        });
                    }
                }
            }

            let session = Arc::new(MigrationSession::new(
                Arc::clone(&state.store),
                Arc::clone(&state.registry),
                state.events.clone(),
                MigrationOptions::default(),
            ));
            session.set_candidates(candidates).await?;
            let item_keys = session.add_all(manga).await;

            let session_id = Uuid::new_v4();
            state.sessions.write().await.insert(session_id, session);
            debug!("Created session {} with {} items", session_id, item_keys.len());

            Ok(json!({
                "sessionId": session_id.to_string(),
                "itemKeys": item_keys,
            }))
        }

        "cancel_session" => {
            let session = lookup_session(state, params).await?;
            session.cancel();
            Ok(json!({"success": true}))
        }

        "remove_item" => {
            let session = lookup_session(state, params).await?;
            let raw = require_str_param!(params, "item_key", "itemKey");
            let key: ItemKey = raw.parse().map_err(|e| WatariError::InvalidParams {
                message: format!("Invalid item key: {}", e),
            })?;
            session.remove_item(&key).await?;
            Ok(json!({"success": true}))
        }

        // ====================================================================
        // Search phase
        // ====================================================================
        "start_search" => {
            let session = lookup_session(state, params).await?;
            if session.state().await == SessionState::Running {
                return Err(WatariError::SessionBusy);
            }

            // The search runs in the background; clients poll session_status.
            let task = Arc::clone(&session);
            tokio::spawn(async move {
                if let Err(e) = task.start_search().await {
                    warn!("Search run failed: {}", e);
                }
            });

            Ok(json!({
                "success": true,
                "message": "Search started"
            }))
        }

        "session_status" => {
            let session = lookup_session(state, params).await?;
            let items = session.status().await;
            Ok(json!({
                "state": session.state().await,
                "total": items.len(),
                "matchedCount": session.matched_count().await,
                "items": items,
            }))
        }

        // ====================================================================
        // Commit phase
        // ====================================================================
        "confirm_migration" => {
            let session = lookup_session(state, params).await?;
            let summary = session.commit_migration().await?;
            Ok(serde_json::to_value(summary)?)
        }

        // ====================================================================
        // Catalog
        // ====================================================================
        "list_sources" => {
            let sources = state.registry.list().await;
            Ok(json!({
                "success": true,
                "sources": sources,
            }))
        }

        "list_library" => {
            let records = state.store.list_records()?;
            Ok(json!({
                "success": true,
                "manga": records,
            }))
        }

        // ====================================================================
        // Unknown
        // ====================================================================
        _ => {
            warn!("Method not found: {}", method);
            Err(WatariError::Other(format!("Method not found: {}", method)))
        }
    }
}
