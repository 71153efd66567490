//! Request-setup errors and their HTTP mapping.
//!
//! Only failures that happen before the first fragment is sent end up
//! here. Once streaming starts, problems are folded into the stream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::query::QueryBuildError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Query(#[from] QueryBuildError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::Unavailable(_) | StoreError::Timeout(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Store(StoreError::Transport(e)) if e.is_connect() || e.is_timeout() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    error: &'a str,
    message: &'a str,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status();
        let reason = status.canonical_reason().unwrap_or("Error");

        tracing::error!(error = %self, status = status.as_u16(), "metadata request failed");

        // Internal details stay in the log.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            reason.to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            status_code: status.as_u16(),
            error: reason,
            message: &message,
        };
        (status, Json(body)).into_response()
    }
}
