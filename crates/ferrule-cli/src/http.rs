//! HTTP front end
//!
//! `POST /api/v1/execute` takes `{"language", "code", "input"?}` and answers
//! `200` with the execution result, or `400`/`422`/`500` with `{"detail"}`.
//! `GET /health` reports liveness.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ferrule::{ExecutionRequest, Runner};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::protocol::{self, Rejection};

/// Routes served by `ferrule http`
pub fn router(runner: Runner) -> Router {
    Router::new()
        .route("/api/v1/execute", post(execute))
        .route("/health", get(health))
        .with_state(runner)
}

/// Serve on `listen` until Ctrl-C
pub async fn serve(runner: Runner, listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(address = %listener.local_addr()?, "serving HTTP");

    axum::serve(listener, router(runner))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn execute(
    State(runner): State<Runner>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return reject(Rejection::unprocessable(rejection.body_text())),
    };

    let handled = tokio::spawn(async move { protocol::dispatch(&runner, &request).await }).await;
    match handled {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(rejection)) => reject(rejection),
        Err(error) => reject(Rejection::from_join_error(&error)),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

fn reject(rejection: Rejection) -> Response {
    let status =
        StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "detail": rejection.detail }))).into_response()
}
