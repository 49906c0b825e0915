use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use libomnicast::error::PlatformError;
use libomnicast::OmnicastError;

/// Unified API error type.
///
/// Produces `{"success": false, "message": "...", "error": "..."}` where
/// `message` is a short summary and `error` the underlying cause.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
    error: String,
}

impl ApiErr {
    pub fn new(status: StatusCode, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error: error.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self::new(StatusCode::BAD_REQUEST, "Invalid request", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found", msg)
    }

    /// Attach the operation that failed as the summary message
    pub fn context(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<OmnicastError> for ApiErr {
    fn from(e: OmnicastError) -> Self {
        let status = match &e {
            OmnicastError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            OmnicastError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            OmnicastError::NotFound(_) => StatusCode::NOT_FOUND,
            OmnicastError::Platform(PlatformError::Validation(_)) => StatusCode::BAD_REQUEST,
            OmnicastError::Platform(PlatformError::Network(_)) => StatusCode::BAD_GATEWAY,
            OmnicastError::Platform(_)
            | OmnicastError::Config(_)
            | OmnicastError::Database(_)
            | OmnicastError::Unrecorded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("{}", e);
        }
        let message = match status {
            StatusCode::BAD_REQUEST => "Invalid request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::NOT_FOUND => "Not found",
            _ => "Request failed",
        };
        Self::new(status, message, e.to_string())
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "success": false,
                "message": self.message,
                "error": self.error,
            })),
        )
            .into_response()
    }
}
