//! Request handling shared by the stdio and HTTP front ends
//!
//! Both front ends accept the same request body and map failures to the same
//! statuses: `400` for a language outside the registry, `422` for a body that
//! is not a valid request, `500` when the host could not prepare or finish an
//! execution.

use ferrule::{ExecutionRequest, ExecutionResult, Runner};
use tokio::task::JoinError;
use tracing::error;

/// Rejection status for a language outside the registry
pub const STATUS_UNSUPPORTED: u16 = 400;
/// Rejection status for a body that is not a valid request
pub const STATUS_UNPROCESSABLE: u16 = 422;
/// Rejection status when the host could not prepare an execution
pub const STATUS_INTERNAL: u16 = 500;

/// A request refused before or instead of producing an execution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub detail: String,
}

impl Rejection {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(STATUS_UNPROCESSABLE, detail)
    }

    /// The task handling a request panicked or was cancelled
    pub fn from_join_error(error: &JoinError) -> Self {
        error!(%error, "request task failed");
        Self::new(STATUS_INTERNAL, "request handling failed")
    }
}

/// Check the language, then run the request
pub async fn dispatch(
    runner: &Runner,
    request: &ExecutionRequest,
) -> Result<ExecutionResult, Rejection> {
    let config = runner.config();
    if config.get_language(&request.language).is_err() {
        let supported = config.language_ids().join(", ");
        return Err(Rejection::new(
            STATUS_UNSUPPORTED,
            format!("Unsupported language. Supported: {supported}"),
        ));
    }

    runner.execute(request).await.map_err(|e| {
        error!(error = %e, "execution could not be prepared");
        Rejection::new(STATUS_INTERNAL, e.to_string())
    })
}
