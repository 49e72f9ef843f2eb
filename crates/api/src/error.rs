//! API error types and responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use praxis_billing::BillingError;
use serde::Serialize;

/// Result alias for route handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid session cookie
    #[error("unauthorized")]
    Unauthorized,

    /// Valid session but insufficient permissions
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Feature not included in the current plan. Expected business outcome.
    #[error("{0}")]
    FeatureNotIncluded(String),

    /// Monthly quota exhausted. Expected business outcome.
    #[error("{0}")]
    QuotaExceeded(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upgrade_prompt: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, upgrade_prompt) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", None),
            Self::FeatureNotIncluded(_) => (
                StatusCode::FORBIDDEN,
                "feature_not_included",
                Some("Upgrade your plan to unlock this feature.".to_string()),
            ),
            Self::QuotaExceeded(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "quota_exceeded",
                Some(
                    "You have reached this month's limit. Upgrade your plan for a higher cap."
                        .to_string(),
                ),
            ),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", None),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict", None),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", None),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
            Self::ExternalService(_) => (StatusCode::BAD_GATEWAY, "external_service_error", None),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
                upgrade_prompt,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("resource not found".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::QuotaExceeded { .. } => Self::QuotaExceeded(e.to_string()),
            BillingError::FeatureNotIncluded { .. } => Self::FeatureNotIncluded(e.to_string()),
            BillingError::NotFound(msg) => Self::NotFound(msg),
            BillingError::InvalidTier(msg) | BillingError::InvalidAmount(msg) => {
                Self::BadRequest(msg)
            }
            BillingError::NoCreditAvailable { .. } => Self::BadRequest(e.to_string()),
            BillingError::WebhookSignatureInvalid | BillingError::InvalidWebhookPayload(_) => {
                Self::BadRequest(e.to_string())
            }
            BillingError::WebhookNotReplayable(_) => Self::Conflict(e.to_string()),
            BillingError::Database(msg) => Self::Internal(msg),
            BillingError::EmailDelivery(msg) => Self::ExternalService(msg),
        }
    }
}
