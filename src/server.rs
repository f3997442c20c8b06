//! HTTP front end for a [`Session`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Liveness banner |
//! | `GET`  | `/health` | Version and session state |
//! | `POST` | `/api/setup` | Index a vault: `{ "vault_path": "..." }` |
//! | `POST` | `/api/chat` | Ask a question: `{ "message": "..." }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_initialized", "message": "the vault has not been initialized yet; run setup first" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `invalid_config`, `invalid_root`, `invalid_chunking`, `embedding_mismatch`, `bad_request` | 400 |
//! | `missing_credential` | 401 |
//! | `not_initialized` | 409 |
//! | `no_documents` | 422 |
//! | `generation_failed` | 502 |
//! | anything else | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat page
//! served from elsewhere can talk to the API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::{ErrorKind, VaultError};
use crate::session::Session;

/// Build the router. Split out from [`run_server`] so tests can drive it
/// without binding a socket.
pub fn router(session: Arc<Session>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/setup", post(handle_setup))
        .route("/api/chat", post(handle_chat))
        .layer(cors)
        .with_state(session)
}

/// Serve `session` on the configured bind address until the process exits.
pub async fn run_server(session: Arc<Session>) -> anyhow::Result<()> {
    let bind_addr = session.config().server.bind.clone();
    let app = router(session);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Vault server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        let status = match &err {
            VaultError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            VaultError::Uninitialized => StatusCode::CONFLICT,
            VaultError::NoDocuments(_) => StatusCode::UNPROCESSABLE_ENTITY,
            VaultError::Generation(_) => StatusCode::BAD_GATEWAY,
            VaultError::EmptyQuery => StatusCode::BAD_REQUEST,
            e if e.kind() == ErrorKind::Configuration => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, code = err.code(), "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET / and /health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "vault-harness is running" }))
}

async fn handle_health(State(session): State<Arc<Session>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "state": session.status().label(),
    }))
}

// ============ POST /api/setup ============

#[derive(Deserialize)]
struct SetupRequest {
    vault_path: String,
}

#[derive(Serialize)]
struct SetupResponse {
    status: &'static str,
    message: String,
    documents: usize,
    chunks: usize,
}

async fn handle_setup(
    State(session): State<Arc<Session>>,
    payload: Result<Json<SetupRequest>, JsonRejection>,
) -> Result<Json<SetupResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    if req.vault_path.trim().is_empty() {
        return Err(bad_request("vault_path must not be empty"));
    }

    let summary = session
        .initialize_index(&PathBuf::from(req.vault_path.trim()))
        .await?;

    Ok(Json(SetupResponse {
        status: "success",
        message: format!(
            "Indexed {} documents from {}",
            summary.documents,
            summary.vault.display()
        ),
        documents: summary.documents,
        chunks: summary.chunks,
    }))
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<String>,
}

async fn handle_chat(
    State(session): State<Arc<Session>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let answer = session.answer_query(&req.message).await?;
    Ok(Json(ChatResponse {
        response: answer.text,
        sources: answer.sources,
    }))
}
