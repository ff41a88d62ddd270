//! Error types for the dispatch service
//!
//! All fallible paths in the service return [`DispatchError`]. The enum
//! maps onto HTTP responses for the API surface and carries enough
//! classification for the worker to decide what is worth retrying.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Delivery failure: {message}")]
    Delivery { message: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Consistency error: {message}")]
    Consistency { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn delivery<S: Into<String>>(message: S) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn consistency<S: Into<String>>(message: S) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Delivery { .. } => StatusCode::BAD_GATEWAY,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Consistency { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Delivery { .. } => "DELIVERY_FAILURE",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Consistency { .. } => "CONSISTENCY_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::Serialization { .. } => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether another delivery attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database { .. } => true,
            Self::Delivery { .. } => true,
            Self::Timeout { .. } => true,
            Self::Validation { .. } => false,
            Self::NotFound { .. } => false,
            Self::Consistency { .. } => false,
            Self::Configuration { .. } => false,
            Self::Serialization { .. } => false,
            Self::Internal { .. } => false,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource: "database record".to_string(),
            },
            _ => Self::Database {
                message: err.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                operation: "webhook request".to_string(),
            }
        } else if err.is_connect() {
            Self::Delivery {
                message: format!("connection failed: {}", err),
            }
        } else {
            Self::Delivery {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for DispatchError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout {
            operation: "async operation".to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for DispatchError {
    fn from(err: validator::ValidationErrors) -> Self {
        let message = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let details: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| "invalid value".to_string())
                    })
                    .collect();
                format!("{}: {}", field, details.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::Validation {
            field: "request".to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            DispatchError::database("oops").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DispatchError::delivery("refused").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DispatchError::validation("user_id", "must be positive").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::not_found("notification").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DispatchError::timeout("delivery").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(DispatchError::database("x").error_code(), "DATABASE_ERROR");
        assert_eq!(DispatchError::delivery("x").error_code(), "DELIVERY_FAILURE");
        assert_eq!(
            DispatchError::consistency("x").error_code(),
            "CONSISTENCY_ERROR"
        );
        assert_eq!(DispatchError::not_found("x").error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DispatchError::database("x").is_retryable());
        assert!(DispatchError::delivery("x").is_retryable());
        assert!(DispatchError::timeout("x").is_retryable());
        assert!(!DispatchError::validation("f", "m").is_retryable());
        assert!(!DispatchError::consistency("x").is_retryable());
        assert!(!DispatchError::configuration("x").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = DispatchError::validation("user_id", "must be a positive integer");
        assert_eq!(
            err.to_string(),
            "Validation error: user_id - must be a positive integer"
        );

        let err = DispatchError::not_found("notification");
        assert_eq!(err.to_string(), "Not found: notification");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: DispatchError = json_err.into();
        assert!(matches!(err, DispatchError::Serialization { .. }));
    }

    #[test]
    fn test_from_validation_errors_joins_messages() {
        use relay_shared::CreateNotificationRequest;
        use validator::Validate;

        let request = CreateNotificationRequest {
            user_id: 0,
            payload: serde_json::Value::Null,
        };
        let err: DispatchError = request.validate().unwrap_err().into();
        let message = err.to_string();
        assert!(message.contains("user_id"));
        assert!(message.contains("payload"));
    }
}
