//! HTTP surface.
//!
//! An axum [`Router`] over a shared [`AppContext`]:
//!
//! | Method | Path            | Response                                   |
//! |--------|-----------------|--------------------------------------------|
//! | POST   | `/chat/message` | `{response}` or a streamed `text/plain`    |
//! | GET    | `/chat/health`  | `{status, backend}` or 503 `{detail}`      |
//! | GET    | `/vault/files`  | `{files, count}`                           |
//! | GET    | `/vault/file`   | `{path, content}`                          |
//! | GET    | `/vault/recent` | `{files, count}`                           |
//! | GET    | `/`, `/health`  | informational                              |
//!
//! Failures are returned as `{detail}` with the status mapped from the
//! [`ErrorKind`](crate::error::ErrorKind). [`serve`] also runs the Telegram
//! poller and the nudging scheduler, and stops all three on ctrl-c.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::app::AppContext;
use crate::commands::render;
use crate::error::{OpError, OpResult};
use crate::llm::{ChatMessage, Role};
use crate::scheduler::PeriodicRunner;
use crate::telegram::handlers::BotHandlers;
use crate::telegram::run_polling;
use crate::vault::DEFAULT_RECENT_LIMIT;

type AppState = Arc<AppContext>;

/// Error response: `{"detail": "..."}` with a mapped status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<OpError> for ApiError {
    fn from(err: OpError) -> Self {
        let status = StatusCode::from_u16(err.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// Build the router with CORS for the configured origins.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let origins: Vec<HeaderValue> = ctx
        .config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/chat/message", post(handle_chat_message))
        .route("/chat/health", get(handle_chat_health))
        .route("/vault/files", get(handle_vault_files))
        .route("/vault/file", get(handle_vault_file))
        .route("/vault/recent", get(handle_vault_recent))
        .layer(cors)
        .with_state(ctx)
}

/// Bind the HTTP listener and run until ctrl-c. The Telegram poller and the
/// nudge jobs share the same shutdown signal.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let bind_addr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    match &ctx.telegram {
        Some(client) => {
            let handlers = Arc::new(BotHandlers::new(ctx.clone()));
            background.push(tokio::spawn(run_polling(
                client.clone(),
                handlers,
                shutdown_rx.clone(),
            )));
        }
        None => tracing::info!("telegram bot token not set, bot disabled"),
    }

    if ctx.nudging.is_enabled() {
        let jobs = ctx.nudging.default_schedule()?;
        background.extend(PeriodicRunner::new(jobs).run(shutdown_rx.clone()));
    } else {
        tracing::info!("nudging disabled");
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "vaultmate listening at http://{bind_addr}");

    let served = axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
        })
        .await;

    let _ = shutdown_tx.send(true);
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }
    served.context("HTTP server failed")
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "vaultmate personal assistant API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_health(State(ctx): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "backend": ctx.llm.name(),
        "vault": ctx.vault.exists(),
    }))
}

async fn handle_chat_message(
    State(ctx): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };
    tracing::debug!(
        messages = request.messages.len(),
        stream = request.stream,
        "chat request"
    );

    if let Some(last) = request.messages.last() {
        if last.role == Role::User {
            if let Some(parsed) = ctx.commands.parse(&last.content) {
                tracing::info!(command = %parsed.name, "slash command");
                let worker = ctx.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    worker.commands.execute(&parsed, &worker.vault)
                })
                .await;
                let response = match outcome {
                    Ok(outcome) => render(&outcome),
                    Err(e) => format!("✗ Command failed: {e}"),
                };
                return Json(ChatResponse { response }).into_response();
            }
        }
    }

    if request.stream {
        let body = match ctx.llm.generate_stream(&request.messages).await {
            Ok(stream) => Body::from_stream(stream.map(|chunk| {
                Ok::<_, Infallible>(match chunk {
                    Ok(text) => text,
                    Err(e) => format!("Error: {}", e.user_message()),
                })
            })),
            Err(e) => Body::from(format!("Error: {}", e.user_message())),
        };
        return (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response();
    }

    let response = match ctx.reply(&request.messages).await {
        Ok(text) => text,
        Err(e) => format!("Error: {}", e.message),
    };
    Json(ChatResponse { response }).into_response()
}

async fn handle_chat_health(State(ctx): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    if ctx.llm.check_health().await {
        Ok(Json(json!({ "status": "healthy", "backend": ctx.llm.name() })))
    } else {
        Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "LLM service unavailable",
        ))
    }
}

async fn handle_vault_files(
    State(ctx): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let notes = blocking(ctx, |ctx| ctx.vault.list_all_notes()).await?;
    Ok(Json(json!({ "count": notes.len(), "files": notes })))
}

async fn handle_vault_file(
    State(ctx): State<AppState>,
    query: Result<Query<FileQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let path = query.path;
    let lookup = path.clone();
    let content = blocking(ctx, move |ctx| ctx.vault.read_note(&lookup)).await?;
    Ok(Json(json!({ "path": path, "content": content })))
}

async fn handle_vault_recent(
    State(ctx): State<AppState>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let files = blocking(ctx, move |ctx| ctx.vault.list_recent_notes(limit)).await?;
    Ok(Json(json!({ "count": files.len(), "files": files })))
}

/// Run a vault operation on the blocking pool.
async fn blocking<T, F>(ctx: AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppContext) -> OpResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&ctx))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("task failed: {e}")))?
        .map_err(ApiError::from)
}
