// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::middleware::response::ErrorEnvelope;
use crate::storage::StorageError;
use crate::validation::FieldErrors;

/// Every failure a handler can report. Converted into the error envelope
/// on the way out, so no collaborator error reaches the client raw.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    InvalidCredentials,
    NotAuthenticated,
    InvalidToken,

    // 404 Not Found
    NotFound(String),

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 422 Unprocessable Entity
    ValidationFailed {
        message: String,
        field_errors: FieldErrors,
    },
    ExtensionNotAllowed {
        extension: String,
        allowed: Vec<String>,
    },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ExtensionNotAllowed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::NotAuthenticated => "not_authenticated",
            ApiError::InvalidToken => "invalid_token",
            ApiError::NotFound(_) => "not_found",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::ValidationFailed { .. } => "validation_failed",
            ApiError::ExtensionNotAllowed { .. } => "extension_not_allowed",
            ApiError::InternalServerError(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }

    /// Client-safe message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidCredentials => "Invalid email or password.",
            ApiError::NotAuthenticated => "User is not authenticated.",
            ApiError::InvalidToken => "Invalid token.",
            ApiError::NotFound(msg) => msg,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::ValidationFailed { message, .. } => message,
            ApiError::ExtensionNotAllowed { .. } => "File extension not allowed.",
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    fn detail(&self) -> Option<Value> {
        match self {
            ApiError::ValidationFailed { field_errors, .. } => Some(json!({ "errors": field_errors })),
            ApiError::ExtensionNotAllowed { extension, allowed } => Some(json!({
                "extension": extension,
                "allowed": allowed,
            })),
            _ => None,
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.error_code(), self.message(), self.detail())
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn product_not_found() -> Self {
        ApiError::NotFound("Product not found.".to_string())
    }

    pub fn validation_failed(field_errors: FieldErrors) -> Self {
        ApiError::ValidationFailed {
            message: "Validation failed.".to_string(),
            field_errors,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<FieldErrors> for ApiError {
    fn from(field_errors: FieldErrors) -> Self {
        ApiError::validation_failed(field_errors)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Sqlx(e @ (sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))) => {
                tracing::error!("Database unreachable: {}", e);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::NotAuthenticated => ApiError::NotAuthenticated,
            AuthError::InvalidToken => ApiError::InvalidToken,
            AuthError::Database(e) => e.into(),
            other => {
                tracing::error!("Auth error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ExtensionNotAllowed { extension, allowed } => {
                ApiError::ExtensionNotAllowed { extension, allowed }
            }
            StorageError::Io(e) => {
                tracing::error!("Image storage error: {}", e);
                ApiError::internal_server_error("Failed to store uploaded file")
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_envelope())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_field_detail() {
        let mut errors = FieldErrors::default();
        errors.add("name", "The product name is required.");

        let body = serde_json::to_value(ApiError::from(errors).to_envelope()).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "validation_failed");
        assert_eq!(body["detail"]["errors"]["name"][0], "The product name is required.");
    }

    #[test]
    fn auth_errors_map_to_unauthorized() {
        let err = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), "invalid_credentials");

        let body = serde_json::to_value(err.to_envelope()).unwrap();
        assert!(body.get("detail").is_none());
    }

    #[test]
    fn missing_record_maps_to_not_found() {
        let err = ApiError::from(DatabaseError::NotFound("Product not found.".into()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Product not found.");
    }
}
