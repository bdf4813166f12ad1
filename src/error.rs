/// Unified error types for the Notemart service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the marketplace
#[derive(Error, Debug)]
pub enum MarketError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No authenticated principal
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but lacking role or ownership
    #[error("{0}")]
    Forbidden(String),

    /// Malformed or out-of-range request fields
    #[error("{0}")]
    InvalidInput(String),

    /// Request is well formed but not allowed for this caller and entity
    #[error("{0}")]
    InvalidOperation(String),

    /// Referenced entity is absent
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or already-done violation
    #[error("{0}")]
    Conflict(String),

    /// Operation not valid for the entity's lifecycle state
    #[error("{0}")]
    InvalidState(String),

    /// Insufficient wallet balance
    #[error("{0}")]
    PaymentRequired(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Object storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketError {
    /// Stable machine-readable code used in response bodies
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Unauthorized(_) => "Unauthorized",
            MarketError::Forbidden(_) => "Forbidden",
            MarketError::InvalidInput(_) => "InvalidInput",
            MarketError::InvalidOperation(_) => "InvalidOperation",
            MarketError::NotFound(_) => "NotFound",
            MarketError::Conflict(_) => "Conflict",
            MarketError::InvalidState(_) => "InvalidState",
            MarketError::PaymentRequired(_) => "PaymentRequired",
            MarketError::RateLimitExceeded { .. } => "RateLimitExceeded",
            MarketError::Database(_)
            | MarketError::Storage(_)
            | MarketError::Internal(_)
            | MarketError::Io(_) => "InternalServerError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MarketError::InvalidOperation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Conflict(_) | MarketError::InvalidState(_) => StatusCode::CONFLICT,
            MarketError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            MarketError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            MarketError::Database(_)
            | MarketError::Storage(_)
            | MarketError::Internal(_)
            | MarketError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for MarketError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .next()
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, detail)
            })
            .collect();
        MarketError::InvalidInput(fields.join("; "))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            // Don't leak details
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for marketplace operations
pub type MarketResult<T> = Result<T, MarketError>;

/// True when a database error is a UNIQUE or PRIMARY KEY violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MarketError::PaymentRequired("x".into()).status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            MarketError::InvalidState("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            MarketError::InvalidOperation("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(MarketError::Internal("x".into()).code(), "InternalServerError");
    }

    #[test]
    fn test_message_is_displayed_verbatim() {
        let err = MarketError::Conflict("You have already purchased this note".into());
        assert_eq!(err.to_string(), "You have already purchased this note");
    }
}
