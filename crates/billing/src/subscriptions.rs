//! Subscription lifecycle
//!
//! The stored status on the user record moves
//! `trialing -> active -> (cancelled | past_due) -> active` and is advanced
//! only by provider webhooks and admin actions. Nothing runs on a timer:
//! the status presented to callers is computed at read time by comparing
//! `trial_ends_at` / `subscription_ends_at` against the wall clock.

use praxis_shared::{SubscriptionStatus, SubscriptionTier};
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// Stored subscription fields read off the user record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub user_id: Uuid,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<OffsetDateTime>,
    pub subscription_ends_at: Option<OffsetDateTime>,
    pub blocked_at: Option<OffsetDateTime>,
}

/// Read-time view of a subscription
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveSubscription {
    pub tier: SubscriptionTier,
    /// Status after comparing the end timestamps against `now`
    pub status: SubscriptionStatus,
    /// Whether tier-gated features may run right now
    pub access_allowed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_ends_at: Option<OffsetDateTime>,
}

/// Compute the presented status from the stored one and the end timestamps.
///
/// An expired trial reads as past_due until a webhook or admin action
/// advances the stored status. An active subscription whose period end has
/// passed without a renewal webhook also reads as past_due. Cancelled and
/// past_due read as stored.
pub fn effective_status(
    stored: SubscriptionStatus,
    trial_ends_at: Option<OffsetDateTime>,
    subscription_ends_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> SubscriptionStatus {
    match stored {
        SubscriptionStatus::Trialing => match trial_ends_at {
            Some(t) if t <= now => SubscriptionStatus::PastDue,
            _ => SubscriptionStatus::Trialing,
        },
        SubscriptionStatus::Active => match subscription_ends_at {
            Some(t) if t <= now => SubscriptionStatus::PastDue,
            _ => SubscriptionStatus::Active,
        },
        SubscriptionStatus::PastDue => SubscriptionStatus::PastDue,
        SubscriptionStatus::Cancelled => SubscriptionStatus::Cancelled,
    }
}

/// Whether tier-gated features may run under the given effective status.
///
/// A cancelled subscription keeps access until its paid period runs out.
pub fn access_allowed(
    effective: SubscriptionStatus,
    subscription_ends_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> bool {
    match effective {
        SubscriptionStatus::Trialing | SubscriptionStatus::Active => true,
        SubscriptionStatus::PastDue => false,
        SubscriptionStatus::Cancelled => subscription_ends_at.map(|t| t > now).unwrap_or(false),
    }
}

/// Subscription reads and admin/webhook mutations
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Read-time subscription view for one user
    pub async fn subscription_for(&self, user_id: Uuid) -> BillingResult<EffectiveSubscription> {
        let record = self.record_for(user_id).await?;
        Ok(Self::present(&record, OffsetDateTime::now_utc()))
    }

    /// Raw stored fields (admin detail view)
    pub async fn record_for(&self, user_id: Uuid) -> BillingResult<SubscriptionRecord> {
        let record: Option<SubscriptionRecord> = sqlx::query_as(
            r#"
            SELECT id AS user_id, subscription_tier, subscription_status,
                   trial_ends_at, subscription_ends_at, blocked_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| BillingError::NotFound(format!("user {} not found", user_id)))
    }

    fn present(record: &SubscriptionRecord, now: OffsetDateTime) -> EffectiveSubscription {
        let status = effective_status(
            record.subscription_status,
            record.trial_ends_at,
            record.subscription_ends_at,
            now,
        );
        EffectiveSubscription {
            tier: record.subscription_tier,
            status,
            access_allowed: record.blocked_at.is_none()
                && access_allowed(status, record.subscription_ends_at, now),
            trial_ends_at: record.trial_ends_at,
            subscription_ends_at: record.subscription_ends_at,
        }
    }

    /// Resolve a provider customer id to the local user
    pub async fn user_for_customer(&self, provider_customer_id: &str) -> BillingResult<Uuid> {
        let user_id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE provider_customer_id = $1")
                .bind(provider_customer_id)
                .fetch_optional(&self.pool)
                .await?;

        user_id.ok_or_else(|| {
            BillingError::NotFound(format!(
                "no user for provider customer {}",
                provider_customer_id
            ))
        })
    }

    /// Webhook-driven status transition
    pub async fn apply_provider_transition(
        &self,
        user_id: Uuid,
        new_status: SubscriptionStatus,
        subscription_ends_at: Option<OffsetDateTime>,
        provider_subscription_id: Option<&str>,
        event_type: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET subscription_status = $1,
                subscription_ends_at = COALESCE($2, subscription_ends_at),
                provider_subscription_id = COALESCE($3, provider_subscription_id),
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(new_status)
        .bind(subscription_ends_at)
        .bind(provider_subscription_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            new_status = %new_status,
            event_type = event_type,
            "Subscription status advanced by provider webhook"
        );

        let billing_event = match new_status {
            SubscriptionStatus::Active => BillingEventType::SubscriptionActivated,
            SubscriptionStatus::PastDue => BillingEventType::SubscriptionPastDue,
            SubscriptionStatus::Cancelled => BillingEventType::SubscriptionCancelled,
            SubscriptionStatus::Trialing => BillingEventType::SubscriptionActivated,
        };
        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(user_id, billing_event)
                    .data(serde_json::json!({
                        "event_type": event_type,
                        "subscription_ends_at": subscription_ends_at.map(|t| t.to_string()),
                    }))
                    .actor_opt(None, ActorType::Webhook),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log subscription transition event");
        }

        Ok(())
    }

    /// Admin tier change, keeping the stored status untouched
    pub async fn admin_change_tier(
        &self,
        user_id: Uuid,
        new_tier: SubscriptionTier,
        admin_id: Uuid,
        reason: Option<String>,
    ) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<SubscriptionTier> =
            sqlx::query_scalar("SELECT subscription_tier FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;

        let previous = previous
            .ok_or_else(|| BillingError::NotFound(format!("user {} not found", user_id)))?;

        sqlx::query("UPDATE users SET subscription_tier = $1, updated_at = NOW() WHERE id = $2")
            .bind(new_tier)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            from_tier = %previous,
            to_tier = %new_tier,
            admin_id = %admin_id,
            "Admin tier change"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(user_id, BillingEventType::TierChanged)
                    .data(serde_json::json!({
                        "from_tier": previous.as_str(),
                        "to_tier": new_tier.as_str(),
                        "reason": reason,
                    }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log tier change event");
        }

        Ok(())
    }

    /// Admin grant of free access: tier set, status active, provider fields
    /// cleared so no stray webhook can override the grant.
    pub async fn grant_free_access(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
        admin_id: Uuid,
        reason: Option<String>,
    ) -> BillingResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET subscription_tier = $1,
                subscription_status = 'active',
                subscription_ends_at = NULL,
                trial_ends_at = NULL,
                provider_subscription_id = NULL,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(tier)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!(
                "user {} not found",
                user_id
            )));
        }

        tracing::info!(user_id = %user_id, tier = %tier, admin_id = %admin_id, "Free access granted");

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(user_id, BillingEventType::FreeAccessGranted)
                    .data(serde_json::json!({ "tier": tier.as_str(), "reason": reason }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log free access event");
        }

        Ok(())
    }

    /// Admin block: user keeps authenticating but every gated route refuses
    pub async fn block_user(
        &self,
        user_id: Uuid,
        admin_id: Uuid,
        reason: Option<String>,
    ) -> BillingResult<()> {
        self.set_blocked(user_id, admin_id, true, reason).await
    }

    pub async fn unblock_user(&self, user_id: Uuid, admin_id: Uuid) -> BillingResult<()> {
        self.set_blocked(user_id, admin_id, false, None).await
    }

    async fn set_blocked(
        &self,
        user_id: Uuid,
        admin_id: Uuid,
        blocked: bool,
        reason: Option<String>,
    ) -> BillingResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET blocked_at = CASE WHEN $1 THEN NOW() ELSE NULL END,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(blocked)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!(
                "user {} not found",
                user_id
            )));
        }

        tracing::info!(user_id = %user_id, admin_id = %admin_id, blocked = blocked, "User block state changed");

        let event_type = if blocked {
            BillingEventType::UserBlocked
        } else {
            BillingEventType::UserUnblocked
        };
        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(user_id, event_type)
                    .data(serde_json::json!({ "reason": reason }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log block state event");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn at(hours_from_now: i64) -> OffsetDateTime {
        OffsetDateTime::now_utc() + Duration::hours(hours_from_now)
    }

    #[test]
    fn live_trial_reads_trialing() {
        let now = OffsetDateTime::now_utc();
        let status = effective_status(SubscriptionStatus::Trialing, Some(at(24)), None, now);
        assert_eq!(status, SubscriptionStatus::Trialing);
        assert!(access_allowed(status, None, now));
    }

    #[test]
    fn expired_trial_reads_past_due() {
        let now = OffsetDateTime::now_utc();
        let status = effective_status(SubscriptionStatus::Trialing, Some(at(-1)), None, now);
        assert_eq!(status, SubscriptionStatus::PastDue);
        assert!(!access_allowed(status, None, now));
    }

    #[test]
    fn active_past_period_end_reads_past_due() {
        let now = OffsetDateTime::now_utc();
        let status = effective_status(SubscriptionStatus::Active, None, Some(at(-1)), now);
        assert_eq!(status, SubscriptionStatus::PastDue);
    }

    #[test]
    fn active_without_period_end_stays_active() {
        // Admin-granted free access has no period end at all.
        let now = OffsetDateTime::now_utc();
        let status = effective_status(SubscriptionStatus::Active, None, None, now);
        assert_eq!(status, SubscriptionStatus::Active);
    }

    #[test]
    fn cancelled_keeps_access_until_period_end() {
        let now = OffsetDateTime::now_utc();
        let ends = Some(at(48));
        let status = effective_status(SubscriptionStatus::Cancelled, None, ends, now);
        assert_eq!(status, SubscriptionStatus::Cancelled);
        assert!(access_allowed(status, ends, now));
    }

    #[test]
    fn cancelled_after_period_end_loses_access() {
        let now = OffsetDateTime::now_utc();
        let ends = Some(at(-48));
        let status = effective_status(SubscriptionStatus::Cancelled, None, ends, now);
        assert!(!access_allowed(status, ends, now));
    }
}
