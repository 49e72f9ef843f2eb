//! Billing error types

use praxis_shared::{AiFeature, SubscriptionTier};

/// Result alias for billing operations
pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the billing crate
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid tier: {0}")]
    InvalidTier(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Monthly cap reached. Expected business outcome, mapped to 429 upstream.
    #[error("monthly quota exceeded for {feature}: {current_usage}/{limit}")]
    QuotaExceeded {
        feature: AiFeature,
        limit: i64,
        current_usage: i64,
    },

    /// Feature has a -1 ceiling on this tier. Mapped to 403 upstream.
    #[error("feature {feature} is not included in the {tier} plan")]
    FeatureNotIncluded {
        feature: AiFeature,
        tier: SubscriptionTier,
    },

    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("invalid webhook payload: {0}")]
    InvalidWebhookPayload(String),

    #[error("webhook event {0} cannot be replayed")]
    WebhookNotReplayable(String),

    #[error("no credit available: balance is {balance_cents} cents")]
    NoCreditAvailable { balance_cents: i64 },

    #[error("email delivery failed: {0}")]
    EmailDelivery(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}
