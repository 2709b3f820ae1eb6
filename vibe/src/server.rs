//! HTTP server exposing the orchestrator
//!
//! Contract only: POST /tasks takes a Task JSON and returns the persisted Run
//! record; GET /runs/:id reads one back. The interactive surface lives
//! elsewhere.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router as HttpRouter};
use tower_http::trace::TraceLayer;
use tracing::info;

use sessionstore::RunRecord;

use crate::domain::Task;
use crate::orchestrator::{CancelFlag, Orchestrator};
use crate::tools::{ApprovalMode, ApprovalPolicy};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

/// Build the HTTP app
pub fn app(orchestrator: Arc<Orchestrator>) -> HttpRouter {
    HttpRouter::new()
        .route("/health", get(health))
        .route("/tasks", post(submit_task))
        .route("/runs/:id", get(get_run))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { orchestrator })
}

/// Bind and serve until the process exits
pub async fn serve(orchestrator: Arc<Orchestrator>, port: u16) -> eyre::Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "HTTP server listening");
    axum::serve(listener, app(orchestrator)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn submit_task(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<Json<RunRecord>, (StatusCode, String)> {
    // Prompt mode has no gate over HTTP; risky plans resolve to denied
    let approval = match task.approval_mode {
        ApprovalMode::Auto => ApprovalPolicy::auto(),
        ApprovalMode::Prompt | ApprovalMode::Never => ApprovalPolicy::never(),
    };

    let outcome = state
        .orchestrator
        .run_task(&task, approval, CancelFlag::new())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let run = state
        .orchestrator
        .state()
        .get_run(&outcome.run_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "run vanished".to_string()))?;

    Ok(Json(run))
}

async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunRecord>, (StatusCode, String)> {
    let run = state
        .orchestrator
        .state()
        .get_run(&id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, format!("run {id} not found")))?;

    Ok(Json(run))
}
