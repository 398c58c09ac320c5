use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use collector_kernel::{CollectorError, InstanceFailure};
use serde::Serialize;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    failures: Vec<InstanceFailure>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<InstanceFailure>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            failures: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn service_unavailable(message: impl Into<String>, failures: Vec<InstanceFailure>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
            failures,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.status.as_str().to_string(),
            message: self.message,
            failures: self.failures,
        });
        (self.status, body).into_response()
    }
}

impl From<CollectorError> for AppError {
    fn from(err: CollectorError) -> Self {
        let message = err.to_string();
        match err {
            CollectorError::AccessDenied { .. } => AppError::forbidden(message),
            CollectorError::ApplicationNotFound(_) | CollectorError::TargetNotFound(_) => {
                AppError::not_found(message)
            }
            CollectorError::Validation { .. } | CollectorError::Config(_) => {
                AppError::bad_request(message)
            }
            CollectorError::AllInstancesUnreachable { failures, .. } => {
                AppError::service_unavailable(message, failures)
            }
        }
    }
}

impl From<collector_control::ConfigError> for AppError {
    fn from(err: collector_control::ConfigError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<collector_control::RepositoryError> for AppError {
    fn from(err: collector_control::RepositoryError) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<serde_urlencoded::de::Error> for AppError {
    fn from(err: serde_urlencoded::de::Error) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}
