//! Monthly usage metering
//!
//! Counter increments happen in `quota::QuotaService::reserve`; this module
//! accumulates the token/cost aggregates after a successful AI call and
//! serves the month summaries shown to users and admins.

use praxis_shared::AiFeature;
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;
use crate::quota::current_month;

/// One user's counters for one (month, year) bucket
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MonthlyUsage {
    pub user_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub session_analysis_count: i64,
    pub transcript_summary_count: i64,
    pub treatment_plan_count: i64,
    pub progress_report_count: i64,
    pub risk_assessment_count: i64,
    pub note_assist_count: i64,
    pub total_tokens: i64,
    pub total_cost_cents: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl MonthlyUsage {
    /// All-zero row for users with no usage this month
    pub fn empty(user_id: Uuid, month: i32, year: i32) -> Self {
        Self {
            user_id,
            month,
            year,
            session_analysis_count: 0,
            transcript_summary_count: 0,
            treatment_plan_count: 0,
            progress_report_count: 0,
            risk_assessment_count: 0,
            note_assist_count: 0,
            total_tokens: 0,
            total_cost_cents: 0,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn count_for(&self, feature: AiFeature) -> i64 {
        match feature {
            AiFeature::SessionAnalysis => self.session_analysis_count,
            AiFeature::TranscriptSummary => self.transcript_summary_count,
            AiFeature::TreatmentPlan => self.treatment_plan_count,
            AiFeature::ProgressReport => self.progress_report_count,
            AiFeature::RiskAssessment => self.risk_assessment_count,
            AiFeature::NoteAssist => self.note_assist_count,
        }
    }
}

/// Platform-wide totals for the current month (admin dashboard / worker log)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlatformMonthTotals {
    pub active_users: i64,
    pub total_invocations: i64,
    pub total_tokens: i64,
    pub total_cost_cents: i64,
}

/// Per-user aggregate row for the admin usage view
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserUsageSummary {
    pub user_id: Uuid,
    pub email: String,
    pub subscription_tier: String,
    pub total_invocations: i64,
    pub total_tokens: i64,
    pub total_cost_cents: i64,
}

/// Reads and accumulates monthly usage aggregates
#[derive(Clone)]
pub struct UsageMeter {
    pool: PgPool,
}

impl UsageMeter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Accumulate token/cost totals after a successful AI invocation.
    ///
    /// The month row is guaranteed to exist because `reserve` created it
    /// before the feature ran.
    pub async fn record(
        &self,
        user_id: Uuid,
        feature: AiFeature,
        tokens: i64,
        cost_cents: i64,
    ) -> BillingResult<()> {
        let (month, year) = current_month();

        sqlx::query(
            r#"
            UPDATE monthly_usage
            SET total_tokens = total_tokens + $4,
                total_cost_cents = total_cost_cents + $5,
                updated_at = NOW()
            WHERE user_id = $1 AND month = $2 AND year = $3
            "#,
        )
        .bind(user_id)
        .bind(month)
        .bind(year)
        .bind(tokens)
        .bind(cost_cents)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %user_id,
            feature = %feature,
            tokens = tokens,
            cost_cents = cost_cents,
            "Usage recorded"
        );

        Ok(())
    }

    /// Current month's counters for one user, zeroes if no row yet
    pub async fn month_summary(&self, user_id: Uuid) -> BillingResult<MonthlyUsage> {
        let (month, year) = current_month();

        let row: Option<MonthlyUsage> = sqlx::query_as(
            "SELECT * FROM monthly_usage WHERE user_id = $1 AND month = $2 AND year = $3",
        )
        .bind(user_id)
        .bind(month)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.unwrap_or_else(|| MonthlyUsage::empty(user_id, month, year)))
    }

    /// Platform totals for the current month
    pub async fn platform_month_totals(&self) -> BillingResult<PlatformMonthTotals> {
        let (month, year) = current_month();

        let totals: PlatformMonthTotals = sqlx::query_as(
            r#"
            SELECT
                COUNT(*)::BIGINT AS active_users,
                COALESCE(SUM(
                    session_analysis_count + transcript_summary_count +
                    treatment_plan_count + progress_report_count +
                    risk_assessment_count + note_assist_count
                ), 0)::BIGINT AS total_invocations,
                COALESCE(SUM(total_tokens), 0)::BIGINT AS total_tokens,
                COALESCE(SUM(total_cost_cents), 0)::BIGINT AS total_cost_cents
            FROM monthly_usage
            WHERE month = $1 AND year = $2
            "#,
        )
        .bind(month)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        Ok(totals)
    }

    /// Per-user aggregates for the current month, costliest first (admin view)
    pub async fn user_summaries(&self, limit: i64) -> BillingResult<Vec<UserUsageSummary>> {
        let (month, year) = current_month();

        let rows: Vec<UserUsageSummary> = sqlx::query_as(
            r#"
            SELECT
                m.user_id,
                u.email,
                u.subscription_tier::TEXT AS subscription_tier,
                (m.session_analysis_count + m.transcript_summary_count +
                 m.treatment_plan_count + m.progress_report_count +
                 m.risk_assessment_count + m.note_assist_count)::BIGINT AS total_invocations,
                m.total_tokens,
                m.total_cost_cents
            FROM monthly_usage m
            JOIN users u ON u.id = m.user_id
            WHERE m.month = $1 AND m.year = $2
            ORDER BY m.total_cost_cents DESC
            LIMIT $3
            "#,
        )
        .bind(month)
        .bind(year)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
