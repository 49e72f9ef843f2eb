//! Admin-editable per-tier feature ceilings
//!
//! Each tier row carries one integer ceiling per AI feature:
//! `-1` = feature blocked on this plan, `0` = unlimited, `N` = monthly cap.
//! Rows are seeded with compiled-in defaults on first access and mutable
//! only through the admin API.

use praxis_shared::{AiFeature, SubscriptionTier};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// Ceiling value meaning "feature not included in this plan"
pub const LIMIT_BLOCKED: i64 = -1;
/// Ceiling value meaning "no monthly cap"
pub const LIMIT_UNLIMITED: i64 = 0;

/// Per-tier ceilings, one column per AI feature
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TierLimits {
    pub tier: SubscriptionTier,
    pub session_analysis_limit: i64,
    pub transcript_summary_limit: i64,
    pub treatment_plan_limit: i64,
    pub progress_report_limit: i64,
    pub risk_assessment_limit: i64,
    pub note_assist_limit: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TierLimits {
    /// Compiled-in defaults, used to seed the table on first access.
    ///
    /// Essential excludes treatment-plan and risk-assessment generation and
    /// caps the rest. Pro caps everything except note assist. Enterprise is
    /// unlimited across the board.
    pub fn defaults(tier: SubscriptionTier) -> Self {
        let now = OffsetDateTime::now_utc();
        match tier {
            SubscriptionTier::Essential => Self {
                tier,
                session_analysis_limit: 10,
                transcript_summary_limit: 20,
                treatment_plan_limit: LIMIT_BLOCKED,
                progress_report_limit: 5,
                risk_assessment_limit: LIMIT_BLOCKED,
                note_assist_limit: 30,
                updated_at: now,
            },
            SubscriptionTier::Pro => Self {
                tier,
                session_analysis_limit: 100,
                transcript_summary_limit: 200,
                treatment_plan_limit: 50,
                progress_report_limit: 50,
                risk_assessment_limit: 25,
                note_assist_limit: LIMIT_UNLIMITED,
                updated_at: now,
            },
            SubscriptionTier::Enterprise => Self {
                tier,
                session_analysis_limit: LIMIT_UNLIMITED,
                transcript_summary_limit: LIMIT_UNLIMITED,
                treatment_plan_limit: LIMIT_UNLIMITED,
                progress_report_limit: LIMIT_UNLIMITED,
                risk_assessment_limit: LIMIT_UNLIMITED,
                note_assist_limit: LIMIT_UNLIMITED,
                updated_at: now,
            },
        }
    }

    /// Ceiling for a single feature
    pub fn limit_for(&self, feature: AiFeature) -> i64 {
        match feature {
            AiFeature::SessionAnalysis => self.session_analysis_limit,
            AiFeature::TranscriptSummary => self.transcript_summary_limit,
            AiFeature::TreatmentPlan => self.treatment_plan_limit,
            AiFeature::ProgressReport => self.progress_report_limit,
            AiFeature::RiskAssessment => self.risk_assessment_limit,
            AiFeature::NoteAssist => self.note_assist_limit,
        }
    }
}

/// Admin update payload: only provided fields change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierLimitsUpdate {
    pub session_analysis_limit: Option<i64>,
    pub transcript_summary_limit: Option<i64>,
    pub treatment_plan_limit: Option<i64>,
    pub progress_report_limit: Option<i64>,
    pub risk_assessment_limit: Option<i64>,
    pub note_assist_limit: Option<i64>,
}

impl TierLimitsUpdate {
    fn apply_to(&self, mut limits: TierLimits) -> TierLimits {
        if let Some(v) = self.session_analysis_limit {
            limits.session_analysis_limit = v;
        }
        if let Some(v) = self.transcript_summary_limit {
            limits.transcript_summary_limit = v;
        }
        if let Some(v) = self.treatment_plan_limit {
            limits.treatment_plan_limit = v;
        }
        if let Some(v) = self.progress_report_limit {
            limits.progress_report_limit = v;
        }
        if let Some(v) = self.risk_assessment_limit {
            limits.risk_assessment_limit = v;
        }
        if let Some(v) = self.note_assist_limit {
            limits.note_assist_limit = v;
        }
        limits
    }

    fn values(&self) -> [Option<i64>; 6] {
        [
            self.session_analysis_limit,
            self.transcript_summary_limit,
            self.treatment_plan_limit,
            self.progress_report_limit,
            self.risk_assessment_limit,
            self.note_assist_limit,
        ]
    }
}

/// Service for reading and updating tier limits
#[derive(Clone)]
pub struct TierLimitsService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl TierLimitsService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Ceilings for one tier, seeding defaults if the table is empty
    pub async fn limits_for(&self, tier: SubscriptionTier) -> BillingResult<TierLimits> {
        if let Some(limits) = self.fetch(tier).await? {
            return Ok(limits);
        }

        self.seed_defaults().await?;

        // The seed uses ON CONFLICT DO NOTHING, so a concurrent seeder is
        // harmless and the re-read always finds a row.
        match self.fetch(tier).await? {
            Some(limits) => Ok(limits),
            None => Ok(TierLimits::defaults(tier)),
        }
    }

    /// Ceilings for all tiers (admin view), seeding defaults if needed
    pub async fn all(&self) -> BillingResult<Vec<TierLimits>> {
        self.seed_defaults().await?;

        let rows: Vec<TierLimits> = sqlx::query_as("SELECT * FROM tier_limits ORDER BY tier")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Admin-only update of one tier's ceilings
    pub async fn update(
        &self,
        tier: SubscriptionTier,
        update: TierLimitsUpdate,
        admin_id: Uuid,
    ) -> BillingResult<TierLimits> {
        let current = self.limits_for(tier).await?;
        let next = update.apply_to(current);

        sqlx::query(
            r#"
            UPDATE tier_limits SET
                session_analysis_limit = $1,
                transcript_summary_limit = $2,
                treatment_plan_limit = $3,
                progress_report_limit = $4,
                risk_assessment_limit = $5,
                note_assist_limit = $6,
                updated_at = NOW()
            WHERE tier = $7
            "#,
        )
        .bind(next.session_analysis_limit)
        .bind(next.transcript_summary_limit)
        .bind(next.treatment_plan_limit)
        .bind(next.progress_report_limit)
        .bind(next.risk_assessment_limit)
        .bind(next.note_assist_limit)
        .bind(tier)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            tier = %tier,
            admin_id = %admin_id,
            "Tier limits updated"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(admin_id, BillingEventType::TierLimitsUpdated)
                    .data(serde_json::json!({
                        "tier": tier.as_str(),
                        "changed": update.values(),
                    }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log tier limits update event");
        }

        self.limits_for(tier).await
    }

    async fn fetch(&self, tier: SubscriptionTier) -> BillingResult<Option<TierLimits>> {
        let row: Option<TierLimits> = sqlx::query_as("SELECT * FROM tier_limits WHERE tier = $1")
            .bind(tier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn seed_defaults(&self) -> BillingResult<()> {
        for tier in SubscriptionTier::all() {
            let d = TierLimits::defaults(tier);
            sqlx::query(
                r#"
                INSERT INTO tier_limits (
                    tier,
                    session_analysis_limit,
                    transcript_summary_limit,
                    treatment_plan_limit,
                    progress_report_limit,
                    risk_assessment_limit,
                    note_assist_limit
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (tier) DO NOTHING
                "#,
            )
            .bind(tier)
            .bind(d.session_analysis_limit)
            .bind(d.transcript_summary_limit)
            .bind(d.treatment_plan_limit)
            .bind(d.progress_report_limit)
            .bind(d.risk_assessment_limit)
            .bind(d.note_assist_limit)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essential_blocks_clinical_generation() {
        let limits = TierLimits::defaults(SubscriptionTier::Essential);
        assert_eq!(limits.limit_for(AiFeature::TreatmentPlan), LIMIT_BLOCKED);
        assert_eq!(limits.limit_for(AiFeature::RiskAssessment), LIMIT_BLOCKED);
        assert_eq!(limits.limit_for(AiFeature::SessionAnalysis), 10);
    }

    #[test]
    fn enterprise_is_unlimited_everywhere() {
        let limits = TierLimits::defaults(SubscriptionTier::Enterprise);
        for feature in AiFeature::all() {
            assert_eq!(limits.limit_for(feature), LIMIT_UNLIMITED);
        }
    }

    #[test]
    fn partial_update_leaves_other_ceilings_alone() {
        let update = TierLimitsUpdate {
            session_analysis_limit: Some(42),
            ..Default::default()
        };
        let next = update.apply_to(TierLimits::defaults(SubscriptionTier::Pro));
        assert_eq!(next.session_analysis_limit, 42);
        assert_eq!(next.transcript_summary_limit, 200);
        assert_eq!(next.note_assist_limit, LIMIT_UNLIMITED);
    }
}
