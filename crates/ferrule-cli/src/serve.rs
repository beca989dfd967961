//! Newline-delimited JSON request server
//!
//! Each input line is one request `{"id"?, "language", "code", "input"?}`.
//! Each output line is either an execution result (with the request's `id`
//! echoed) or a rejection `{"id"?, "status", "detail"}`. Requests run
//! concurrently, so responses may arrive out of order.

use anyhow::{Context, Result};
use ferrule::{ExecutionRequest, ExecutionResult, Runner};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::protocol::{self, Rejection};

/// Pending responses buffered between request tasks and the writer
const RESPONSE_QUEUE: usize = 64;

/// One output line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Executed {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        #[serde(flatten)]
        result: ExecutionResult,
    },
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<Value>,
        status: u16,
        detail: String,
    },
}

impl Response {
    fn rejected(id: Option<Value>, rejection: Rejection) -> Self {
        Self::Rejected {
            id,
            status: rejection.status,
            detail: rejection.detail,
        }
    }
}

/// Turn one request line into its response
pub async fn handle_line(runner: &Runner, line: &[u8]) -> Response {
    let value: Value = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(e) => {
            let rejection = Rejection::unprocessable(format!("invalid JSON: {e}"));
            return Response::rejected(None, rejection);
        }
    };

    let id = value.get("id").cloned();
    let request: ExecutionRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            let rejection = Rejection::unprocessable(format!("invalid request: {e}"));
            return Response::rejected(id, rejection);
        }
    };

    match protocol::dispatch(runner, &request).await {
        Ok(result) => Response::Executed { id, result },
        Err(rejection) => Response::rejected(id, rejection),
    }
}

/// The `id` of a request line, if it has one
fn request_id(line: &[u8]) -> Option<Value> {
    serde_json::from_slice::<Value>(line).ok()?.get("id").cloned()
}

/// Response for a request whose handler task ended
fn answer(line: &[u8], handled: Result<Response, JoinError>) -> Response {
    handled.unwrap_or_else(|error| {
        Response::rejected(request_id(line), Rejection::from_join_error(&error))
    })
}

/// Serve requests from `input` until EOF, writing responses to `output`
///
/// Returns the writer once every accepted request has been answered. A read
/// error stops accepting new requests; requests already accepted are still
/// answered before the error is returned.
pub async fn serve<R, W>(runner: Runner, input: R, output: W) -> Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Response>(RESPONSE_QUEUE);

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_vec(&response).context("failed to encode response")?;
            line.push(b'\n');
            output
                .write_all(&line)
                .await
                .context("failed to write response")?;
            output.flush().await.context("failed to flush response")?;
        }
        anyhow::Ok(output)
    });

    let mut input = BufReader::new(input);
    let mut buf = Vec::new();
    let mut tasks = JoinSet::new();
    let mut accepted = 0usize;
    let mut read_error = None;

    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "failed to read request, answering accepted requests");
                read_error = Some(e);
                break;
            }
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        accepted += 1;

        let line = line.to_vec();
        let runner = runner.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            let handled = tokio::spawn({
                let line = line.clone();
                async move { handle_line(&runner, &line).await }
            })
            .await;

            if tx.send(answer(&line, handled)).await.is_err() {
                warn!("response writer stopped, dropping response");
            }
        });
    }
    debug!(accepted, "input closed, waiting for in-flight requests");

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "request task failed");
        }
    }
    drop(tx);

    let output = writer.await.context("response writer panicked")??;
    if let Some(e) = read_error {
        return Err(anyhow::Error::new(e).context("failed to read request"));
    }
    info!(accepted, "serve finished");
    Ok(output)
}
