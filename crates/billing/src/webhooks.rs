//! Payment-provider webhook handling
//!
//! Inbound callbacks from the payment provider drive all subscription state
//! transitions. The raw payload is verified with HMAC-SHA256 against the
//! configured webhook secret, claimed atomically for idempotency, then
//! dispatched. A handler failure is recorded as an admin alert for manual
//! follow-up; there is no automatic retry.

use hmac::{Hmac, Mac};
use praxis_shared::SubscriptionStatus;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance in seconds
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Provider webhook envelope
///
/// The provider posts `{"id", "type", "created", "data": {"object": ...}}`.
/// Only the fields the dispatcher reads are modeled; everything else stays
/// in the raw JSON stored on the event row.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp of event creation at the provider
    pub created: i64,
    pub data: ProviderEventData,
}

/// Event data container
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEventData {
    pub object: serde_json::Value,
}

impl ProviderEvent {
    fn customer_id(&self) -> BillingResult<&str> {
        self.data
            .object
            .get("customer")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BillingError::InvalidWebhookPayload("missing data.object.customer".to_string())
            })
    }

    fn subscription_id(&self) -> Option<&str> {
        self.data.object.get("subscription_id").and_then(|v| v.as_str())
    }

    fn period_end(&self) -> Option<OffsetDateTime> {
        self.data
            .object
            .get("current_period_end")
            .and_then(|v| v.as_i64())
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    }

    fn cancel_at(&self) -> Option<OffsetDateTime> {
        self.data
            .object
            .get("cancel_at")
            .and_then(|v| v.as_i64())
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    }
}

/// Outcome of handling one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum WebhookOutcome {
    /// Event processed and marked as such
    Processed,
    /// Event id already seen; nothing done
    Skipped,
    /// Handler failed; event marked failed and an admin alert recorded
    Failed { error: String },
}

/// A stored webhook event (admin listing / replay)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub status: String,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
}

/// Parse and verify a `t=<unix>,v1=<hex>` signature header against the
/// payload. Rejects stale timestamps and compares digests in constant time.
pub fn verify_signature(
    payload: &str,
    signature_header: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature_header.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    let v1_signature = v1_signature.ok_or(BillingError::WebhookSignatureInvalid)?;

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed.as_bytes().ct_eq(v1_signature.as_bytes()).into() {
        Ok(())
    } else {
        tracing::warn!("Webhook signature mismatch");
        Err(BillingError::WebhookSignatureInvalid)
    }
}

/// Webhook handler for provider events
#[derive(Clone)]
pub struct WebhookHandler {
    pool: PgPool,
    webhook_secret: String,
    subscriptions: SubscriptionService,
}

impl WebhookHandler {
    pub fn new(pool: PgPool, webhook_secret: String) -> Self {
        let subscriptions = SubscriptionService::new(pool.clone());
        Self {
            pool,
            webhook_secret,
            subscriptions,
        }
    }

    /// Verify the signature header and parse the event
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<ProviderEvent> {
        let now_unix = OffsetDateTime::now_utc().unix_timestamp();
        verify_signature(payload, signature, &self.webhook_secret, now_unix)?;

        let event: ProviderEvent = serde_json::from_str(payload)
            .map_err(|e| BillingError::InvalidWebhookPayload(e.to_string()))?;

        tracing::info!(
            event_type = %event.event_type,
            event_id = %event.id,
            "Provider webhook verified"
        );

        Ok(event)
    }

    /// Handle a verified event.
    ///
    /// The `INSERT ... ON CONFLICT DO NOTHING RETURNING` claim ensures only
    /// one concurrent delivery of an event id can take processing rights;
    /// replayed deliveries fall through to `Skipped`.
    pub async fn handle_event(&self, event: ProviderEvent) -> BillingResult<WebhookOutcome> {
        let payload = serde_json::json!({
            "id": event.id,
            "type": event.event_type,
            "created": event.created,
            "data": event.data.object,
        });

        let claimed: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO webhook_events (event_id, event_type, payload, status)
            VALUES ($1, $2, $3, 'processing')
            ON CONFLICT (event_id) DO NOTHING
            RETURNING event_id
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(&payload)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(event_id = %event.id, "Webhook event already seen, skipping");
            return Ok(WebhookOutcome::Skipped);
        }

        match self.dispatch(&event).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE webhook_events SET status = 'processed', processed_at = NOW() WHERE event_id = $1",
                )
                .bind(&event.id)
                .execute(&self.pool)
                .await?;
                Ok(WebhookOutcome::Processed)
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %error,
                    "Webhook handler failed"
                );

                sqlx::query(
                    "UPDATE webhook_events SET status = 'failed', error = $2 WHERE event_id = $1",
                )
                .bind(&event.id)
                .bind(&error)
                .execute(&self.pool)
                .await?;

                self.record_failure_alert(&event, &error).await?;

                Ok(WebhookOutcome::Failed { error })
            }
        }
    }

    /// Admin-triggered replay of a failed event.
    ///
    /// Processed events can never be replayed.
    pub async fn replay_event(&self, event_id: &str) -> BillingResult<WebhookOutcome> {
        let stored: Option<(String, serde_json::Value)> = sqlx::query_as(
            "SELECT status, payload FROM webhook_events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        let (status, payload) = stored
            .ok_or_else(|| BillingError::NotFound(format!("webhook event {} not found", event_id)))?;

        if status != "failed" {
            return Err(BillingError::WebhookNotReplayable(event_id.to_string()));
        }

        let event: ProviderEvent = serde_json::from_value(payload)
            .map_err(|e| BillingError::InvalidWebhookPayload(e.to_string()))?;

        sqlx::query(
            "UPDATE webhook_events SET status = 'processing', error = NULL WHERE event_id = $1",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(event_id = event_id, "Replaying failed webhook event");

        match self.dispatch(&event).await {
            Ok(()) => {
                sqlx::query(
                    "UPDATE webhook_events SET status = 'processed', processed_at = NOW() WHERE event_id = $1",
                )
                .bind(event_id)
                .execute(&self.pool)
                .await?;
                Ok(WebhookOutcome::Processed)
            }
            Err(e) => {
                let error = e.to_string();
                sqlx::query(
                    "UPDATE webhook_events SET status = 'failed', error = $2 WHERE event_id = $1",
                )
                .bind(event_id)
                .bind(&error)
                .execute(&self.pool)
                .await?;
                Ok(WebhookOutcome::Failed { error })
            }
        }
    }

    /// Recent events for the admin listing
    pub async fn recent_events(&self, limit: i64) -> BillingResult<Vec<WebhookEventRecord>> {
        let rows: Vec<WebhookEventRecord> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, status, error, received_at, processed_at
            FROM webhook_events
            ORDER BY received_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn dispatch(&self, event: &ProviderEvent) -> BillingResult<()> {
        match event.event_type.as_str() {
            "subscription.activated" | "invoice.paid" | "subscription.resumed" => {
                let user_id = self
                    .subscriptions
                    .user_for_customer(event.customer_id()?)
                    .await?;
                self.subscriptions
                    .apply_provider_transition(
                        user_id,
                        SubscriptionStatus::Active,
                        event.period_end(),
                        event.subscription_id(),
                        &event.event_type,
                    )
                    .await
            }
            "invoice.payment_failed" => {
                let user_id = self
                    .subscriptions
                    .user_for_customer(event.customer_id()?)
                    .await?;
                self.subscriptions
                    .apply_provider_transition(
                        user_id,
                        SubscriptionStatus::PastDue,
                        None,
                        None,
                        &event.event_type,
                    )
                    .await
            }
            "subscription.cancelled" => {
                let user_id = self
                    .subscriptions
                    .user_for_customer(event.customer_id()?)
                    .await?;
                // Access runs until cancel_at (or the current period end)
                let ends_at = event.cancel_at().or_else(|| event.period_end());
                self.subscriptions
                    .apply_provider_transition(
                        user_id,
                        SubscriptionStatus::Cancelled,
                        ends_at,
                        None,
                        &event.event_type,
                    )
                    .await
            }
            other => {
                // Unknown event types are acknowledged and ignored
                tracing::info!(event_type = other, "Ignoring unhandled webhook event type");
                Ok(())
            }
        }
    }

    async fn record_failure_alert(&self, event: &ProviderEvent, error: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_alerts (id, alert_type, message, context)
            VALUES ($1, 'webhook_failure', $2, $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(format!(
            "Webhook {} ({}) failed: {}",
            event.id, event.event_type, error
        ))
        .bind(serde_json::json!({
            "event_id": event.id,
            "event_type": event.event_type,
            "error": error,
        }))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
        let signed = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_passes() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, SECRET);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn tampered_payload_fails() {
        let now = 1_700_000_000;
        let header = sign(r#"{"id":"evt_1"}"#, now, SECRET);
        let result = verify_signature(r#"{"id":"evt_2"}"#, &header, SECRET, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, "whsec_other");
        let result = verify_signature(payload, &header, SECRET, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn stale_timestamp_fails() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now - SIGNATURE_TOLERANCE_SECS - 1, SECRET);
        let result = verify_signature(payload, &header, SECRET, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn future_timestamp_within_tolerance_passes() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now + 60, SECRET);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn malformed_header_fails() {
        let result = verify_signature("{}", "v1=deadbeef", SECRET, 1_700_000_000);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn event_field_extraction() {
        let event: ProviderEvent = serde_json::from_str(
            r#"{
                "id": "evt_42",
                "type": "subscription.cancelled",
                "created": 1700000000,
                "data": {"object": {"customer": "cus_9", "cancel_at": 1700600000}}
            }"#,
        )
        .unwrap();

        assert_eq!(event.customer_id().unwrap(), "cus_9");
        assert_eq!(
            event.cancel_at().map(|t| t.unix_timestamp()),
            Some(1_700_600_000)
        );
        assert!(event.period_end().is_none());
    }
}
