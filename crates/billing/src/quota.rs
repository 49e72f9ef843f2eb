//! Monthly AI usage quotas
//!
//! Answers "may this user invoke this AI feature right now?" against the
//! tier ceilings in `tier_limits` and the current month's counters in
//! `monthly_usage`.
//!
//! Two operations:
//! - [`QuotaService::check`] is read-only, for display endpoints.
//! - [`QuotaService::reserve`] consumes one unit. It is a single
//!   conditional `UPDATE ... RETURNING`, so two concurrent requests can
//!   never both take the last slot of a capped feature.

use praxis_shared::{AiFeature, SubscriptionTier};
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::tier_limits::{TierLimitsService, LIMIT_BLOCKED, LIMIT_UNLIMITED};

/// Outcome of comparing a usage counter against a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Ceiling is -1: the plan does not include this feature
    Blocked,
    /// Ceiling is 0: no monthly cap
    Unlimited,
    /// Under a positive cap
    Within { remaining: i64 },
    /// Counter has reached the cap
    Exhausted,
}

/// Decide whether usage is allowed given a ceiling and the current counter.
///
/// `-1` rejects regardless of usage, `0` always allows, `N > 0` allows
/// strictly below `N` and rejects exactly at `N`.
pub fn evaluate(limit: i64, current_usage: i64) -> QuotaDecision {
    match limit {
        LIMIT_BLOCKED => QuotaDecision::Blocked,
        LIMIT_UNLIMITED => QuotaDecision::Unlimited,
        cap if current_usage < cap => QuotaDecision::Within {
            remaining: cap - current_usage,
        },
        _ => QuotaDecision::Exhausted,
    }
}

/// Quota status for one feature, as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct QuotaCheck {
    pub feature: AiFeature,
    pub allowed: bool,
    pub current_usage: i64,
    /// -1 blocked, 0 unlimited, N monthly cap
    pub limit: i64,
    /// None when the feature is unlimited
    pub remaining: Option<i64>,
    /// Percentage of a positive cap consumed; 0 for unlimited, 100 for blocked
    pub percentage: f64,
}

impl QuotaCheck {
    fn from_decision(feature: AiFeature, limit: i64, current_usage: i64) -> Self {
        let (allowed, remaining, percentage) = match evaluate(limit, current_usage) {
            QuotaDecision::Blocked => (false, Some(0), 100.0),
            QuotaDecision::Unlimited => (true, None, 0.0),
            QuotaDecision::Within { remaining } => (
                true,
                Some(remaining),
                current_usage as f64 / limit as f64 * 100.0,
            ),
            QuotaDecision::Exhausted => (false, Some(0), 100.0),
        };
        Self {
            feature,
            allowed,
            current_usage,
            limit,
            remaining,
            percentage,
        }
    }
}

/// Successful reservation of one unit of a feature
#[derive(Debug, Clone, Serialize)]
pub struct QuotaReservation {
    pub feature: AiFeature,
    /// Counter value after the increment
    pub usage_after: i64,
    pub limit: i64,
}

/// (month, year) bucket for the monthly counters, derived from UTC wall clock
pub fn current_month() -> (i32, i32) {
    let now = OffsetDateTime::now_utc();
    (now.month() as i32, now.year())
}

/// Quota tracker backed by `tier_limits` and `monthly_usage`
#[derive(Clone)]
pub struct QuotaService {
    pool: PgPool,
    tier_limits: TierLimitsService,
}

impl QuotaService {
    pub fn new(pool: PgPool) -> Self {
        let tier_limits = TierLimitsService::new(pool.clone());
        Self { pool, tier_limits }
    }

    /// Read-only quota status for one feature
    pub async fn check(&self, user_id: Uuid, feature: AiFeature) -> BillingResult<QuotaCheck> {
        let tier = self.user_tier(user_id).await?;
        let limit = self.tier_limits.limits_for(tier).await?.limit_for(feature);
        let current_usage = self.current_usage(user_id, feature).await?;
        Ok(QuotaCheck::from_decision(feature, limit, current_usage))
    }

    /// Read-only quota status for all six features at once
    pub async fn check_all(&self, user_id: Uuid) -> BillingResult<Vec<QuotaCheck>> {
        let tier = self.user_tier(user_id).await?;
        let limits = self.tier_limits.limits_for(tier).await?;

        let mut checks = Vec::with_capacity(6);
        for feature in AiFeature::all() {
            let current_usage = self.current_usage(user_id, feature).await?;
            checks.push(QuotaCheck::from_decision(
                feature,
                limits.limit_for(feature),
                current_usage,
            ));
        }
        Ok(checks)
    }

    /// Consume one unit of `feature` for the current month.
    ///
    /// The increment is conditional on the counter still being under the
    /// cap, in one statement, so the check and the increment cannot be
    /// separated by a concurrent request.
    pub async fn reserve(
        &self,
        user_id: Uuid,
        feature: AiFeature,
    ) -> BillingResult<QuotaReservation> {
        let tier = self.user_tier(user_id).await?;
        let limit = self.tier_limits.limits_for(tier).await?.limit_for(feature);

        if limit == LIMIT_BLOCKED {
            return Err(BillingError::FeatureNotIncluded { feature, tier });
        }

        let (month, year) = current_month();

        // Lazy month-row creation; concurrent inserts collapse on the key.
        sqlx::query(
            r#"
            INSERT INTO monthly_usage (user_id, month, year)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, month, year) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(month)
        .bind(year)
        .execute(&self.pool)
        .await?;

        // Column names come from AiFeature, never from user input.
        let column = feature.counter_column();
        let query = format!(
            r#"
            UPDATE monthly_usage
            SET {column} = {column} + 1, updated_at = NOW()
            WHERE user_id = $1 AND month = $2 AND year = $3
              AND ($4 = 0 OR {column} < $4)
            RETURNING {column}
            "#,
        );

        let usage_after: Option<i64> = sqlx::query_scalar(&query)
            .bind(user_id)
            .bind(month)
            .bind(year)
            .bind(limit)
            .fetch_optional(&self.pool)
            .await?;

        match usage_after {
            Some(usage_after) => {
                tracing::debug!(
                    user_id = %user_id,
                    feature = %feature,
                    usage_after = usage_after,
                    limit = limit,
                    "Quota reserved"
                );
                Ok(QuotaReservation {
                    feature,
                    usage_after,
                    limit,
                })
            }
            None => {
                let current_usage = self.current_usage(user_id, feature).await?;
                Err(BillingError::QuotaExceeded {
                    feature,
                    limit,
                    current_usage,
                })
            }
        }
    }

    async fn user_tier(&self, user_id: Uuid) -> BillingResult<SubscriptionTier> {
        let tier: Option<SubscriptionTier> =
            sqlx::query_scalar("SELECT subscription_tier FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        tier.ok_or_else(|| BillingError::NotFound(format!("user {} not found", user_id)))
    }

    async fn current_usage(&self, user_id: Uuid, feature: AiFeature) -> BillingResult<i64> {
        let (month, year) = current_month();
        let column = feature.counter_column();
        let query = format!(
            "SELECT {column} FROM monthly_usage WHERE user_id = $1 AND month = $2 AND year = $3",
        );

        let usage: Option<i64> = sqlx::query_scalar(&query)
            .bind(user_id)
            .bind(month)
            .bind(year)
            .fetch_optional(&self.pool)
            .await?;

        Ok(usage.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_rejects_at_any_usage() {
        assert_eq!(evaluate(LIMIT_BLOCKED, 0), QuotaDecision::Blocked);
        assert_eq!(evaluate(LIMIT_BLOCKED, 999_999), QuotaDecision::Blocked);
    }

    #[test]
    fn unlimited_allows_at_any_usage() {
        assert_eq!(evaluate(LIMIT_UNLIMITED, 0), QuotaDecision::Unlimited);
        assert_eq!(evaluate(LIMIT_UNLIMITED, i64::MAX), QuotaDecision::Unlimited);
    }

    #[test]
    fn cap_allows_strictly_below() {
        assert_eq!(evaluate(10, 9), QuotaDecision::Within { remaining: 1 });
        assert_eq!(evaluate(10, 0), QuotaDecision::Within { remaining: 10 });
    }

    #[test]
    fn cap_rejects_exactly_at_limit() {
        assert_eq!(evaluate(10, 10), QuotaDecision::Exhausted);
        assert_eq!(evaluate(10, 11), QuotaDecision::Exhausted);
    }

    #[test]
    fn check_reports_percentage_of_cap() {
        let check = QuotaCheck::from_decision(AiFeature::SessionAnalysis, 10, 5);
        assert!(check.allowed);
        assert_eq!(check.remaining, Some(5));
        assert!((check.percentage - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn check_reports_blocked_as_full() {
        let check = QuotaCheck::from_decision(AiFeature::RiskAssessment, LIMIT_BLOCKED, 0);
        assert!(!check.allowed);
        assert_eq!(check.remaining, Some(0));
        assert!((check.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn check_reports_unlimited_without_remaining() {
        let check = QuotaCheck::from_decision(AiFeature::NoteAssist, LIMIT_UNLIMITED, 12_345);
        assert!(check.allowed);
        assert_eq!(check.remaining, None);
    }
}
