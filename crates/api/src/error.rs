use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use finsecure_core::decode::DecodeError;
use finsecure_core::domain::contract::ValidationError;
use finsecure_core::harness::HarnessError;
use finsecure_core::storage::StoreError;
use serde_json::json;

const TESTS_DISABLED_HINT: &str = "Use CI/CD or local environment to run tests";

/// Failures a handler reports to the caller. Server-side messages are passed through to the
/// response body; this service accepts that disclosure.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Invalid test type")]
    InvalidTestType,

    #[error("Test execution disabled in production")]
    TestsDisabled,

    #[error("Database connection failed")]
    StoreUnavailable,

    #[error("{0}")]
    Store(String),

    #[error("Test execution timeout")]
    TestTimeout,

    #[error("Error running tests: {0}")]
    TestExecution(String),

    #[error("Server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Decode(_) | Self::InvalidTestType => StatusCode::BAD_REQUEST,
            Self::TestsDisabled => StatusCode::FORBIDDEN,
            Self::StoreUnavailable
            | Self::Store(_)
            | Self::TestTimeout
            | Self::TestExecution(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => {
                tracing::error!(%detail, "database unavailable");
                Self::StoreUnavailable
            }
            StoreError::Query(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "database query failed");
                Self::Store(format!("{e:#}"))
            }
        }
    }
}

impl From<HarnessError> for ApiError {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::Timeout(_) => Self::TestTimeout,
            other => Self::TestExecution(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::TestsDisabled => json!({
                "error": self.to_string(),
                "message": TESTS_DISABLED_HINT,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        if status.is_server_error() {
            sentry::capture_message(&self.to_string(), sentry::Level::Error);
        }

        (status, Json(body)).into_response()
    }
}
