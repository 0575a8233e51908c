//! Chat HTTP service.
//!
//! A thin front end over [`ConversationLoop`]: every request starts a fresh
//! conversation, so the service holds no chat state between requests.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Static chat page |
//! | `POST` | `/chat` | Answer a query (form field or JSON `query`) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /chat` answers `200 {"response": "..."}` whenever a query was
//! supplied, including when the model could not be reached; the response
//! text then carries the error message. Only a missing or blank query is a
//! `400`:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the page can be served
//! from elsewhere during development.

use axum::{
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agent::ConversationLoop;
use crate::config::Config;

const CHAT_PAGE: &str = include_str!("static/chat.html");

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    agent: Arc<ConversationLoop>,
}

/// Starts the chat server on `[server].bind`.
///
/// Builds the production conversation loop from the environment first, so a
/// missing API key or store setting fails before the socket is bound.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let agent = Arc::new(ConversationLoop::from_env(config)?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("chat server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(agent)).await?;
    Ok(())
}

/// The service's routes, for embedding or testing.
pub fn router(agent: Arc<ConversationLoop>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { agent })
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Handler for `POST /chat`.
///
/// Accepts `application/x-www-form-urlencoded` (the chat page) or
/// `application/json`.
async fn handle_chat(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<ChatResponse>, AppError> {
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let request = if is_json {
        Json::<ChatRequest>::from_request(req, &())
            .await
            .map_err(|e| bad_request(e.body_text()))?
            .0
    } else {
        Form::<ChatRequest>::from_request(req, &())
            .await
            .map_err(|e| bad_request(e.body_text()))?
            .0
    };

    let query = request.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let outcome = state.agent.run_turn(&[], query).await;
    tracing::info!(kind = ?outcome.kind, "chat request answered");

    Ok(Json(ChatResponse {
        response: outcome.answer,
    }))
}
