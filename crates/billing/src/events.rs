//! Billing event audit log
//!
//! Append-only record of every billing-relevant mutation. Logging failures
//! are reported to the caller but must never fail the business operation;
//! callers warn and continue.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Who performed the action being logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    Admin,
    System,
    Webhook,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Admin => "admin",
            ActorType::System => "system",
            ActorType::Webhook => "webhook",
        }
    }
}

/// Billing event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    TierChanged,
    FreeAccessGranted,
    UserBlocked,
    UserUnblocked,
    SubscriptionActivated,
    SubscriptionPastDue,
    SubscriptionCancelled,
    SubscriptionResumed,
    TierLimitsUpdated,
    QuotaReserved,
    BulkPaymentApplied,
    CreditApplied,
    WebhookFailed,
    WebhookReplayed,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::TierChanged => "tier_changed",
            BillingEventType::FreeAccessGranted => "free_access_granted",
            BillingEventType::UserBlocked => "user_blocked",
            BillingEventType::UserUnblocked => "user_unblocked",
            BillingEventType::SubscriptionActivated => "subscription_activated",
            BillingEventType::SubscriptionPastDue => "subscription_past_due",
            BillingEventType::SubscriptionCancelled => "subscription_cancelled",
            BillingEventType::SubscriptionResumed => "subscription_resumed",
            BillingEventType::TierLimitsUpdated => "tier_limits_updated",
            BillingEventType::QuotaReserved => "quota_reserved",
            BillingEventType::BulkPaymentApplied => "bulk_payment_applied",
            BillingEventType::CreditApplied => "credit_applied",
            BillingEventType::WebhookFailed => "webhook_failed",
            BillingEventType::WebhookReplayed => "webhook_replayed",
        }
    }
}

/// A billing event ready to be persisted
#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub user_id: Uuid,
    pub event_type: BillingEventType,
    pub actor_type: ActorType,
    pub actor_id: Option<Uuid>,
    pub data: serde_json::Value,
}

/// Builder for billing events
#[derive(Debug, Clone)]
pub struct BillingEventBuilder {
    event: BillingEvent,
}

impl BillingEventBuilder {
    pub fn new(user_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            event: BillingEvent {
                user_id,
                event_type,
                actor_type: ActorType::System,
                actor_id: None,
                data: serde_json::Value::Null,
            },
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event.data = data;
        self
    }

    pub fn actor(mut self, actor_id: Uuid, actor_type: ActorType) -> Self {
        self.event.actor_id = Some(actor_id);
        self.event.actor_type = actor_type;
        self
    }

    pub fn actor_opt(mut self, actor_id: Option<Uuid>, actor_type: ActorType) -> Self {
        self.event.actor_id = actor_id;
        self.event.actor_type = actor_type;
        self
    }

    fn build(self) -> BillingEvent {
        self.event
    }
}

/// Writes billing events to the `billing_events` table
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log_event(&self, builder: BillingEventBuilder) -> BillingResult<()> {
        let event = builder.build();

        sqlx::query(
            r#"
            INSERT INTO billing_events (id, user_id, event_type, actor_type, actor_id, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id)
        .bind(event.event_type.as_str())
        .bind(event.actor_type.as_str())
        .bind(event.actor_id)
        .bind(&event.data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
