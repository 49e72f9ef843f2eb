//! Billing invariant checks
//!
//! Runnable consistency checks over the payment and usage tables. Each
//! check is one read-only SQL query; violations carry enough context to
//! debug. Run from the admin API after suspicious mutations or webhook
//! replays.

use praxis_shared::AiFeature;
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// A single invariant violation
#[derive(Debug, Clone, Serialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Rows affected
    pub affected_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationSeverity {
    /// Money may be wrong
    Critical,
    /// Data inconsistency that needs attention
    High,
    /// Potential issue, should investigate
    Medium,
    /// Minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of one checker run
#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct OverAppliedRow {
    id: Uuid,
    amount_cents: i64,
    expected_amount_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct NegativeCreditRow {
    id: Uuid,
    credit_balance_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ChildSumMismatchRow {
    id: Uuid,
    amount_cents: i64,
    child_sum: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PaidOutstandingRow {
    id: Uuid,
    amount_cents: i64,
    expected_amount_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CancelledNoEndRow {
    id: Uuid,
}

/// Runs all billing invariant checks
#[derive(Clone)]
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run every check and collect violations
    pub async fn run_all(&self) -> BillingResult<InvariantCheckSummary> {
        let mut violations = Vec::new();
        let mut checks_run = 0;

        for result in [
            self.check_over_applied_payments().await?,
            self.check_child_sum_exceeds_parent().await?,
            self.check_paid_with_outstanding().await?,
            self.check_negative_credit_balances().await?,
            self.check_cancelled_without_period_end().await?,
        ] {
            checks_run += 1;
            if let Some(v) = result {
                violations.push(v);
            }
        }

        for feature in AiFeature::all() {
            checks_run += 1;
            if let Some(v) = self.check_negative_usage_counter(feature).await? {
                violations.push(v);
            }
        }

        let checks_failed = violations.len();
        Ok(InvariantCheckSummary {
            checked_at: OffsetDateTime::now_utc(),
            checks_run,
            checks_passed: checks_run - checks_failed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// `amount_cents` must never exceed `expected_amount_cents`; excess
    /// belongs on the client's credit balance instead.
    async fn check_over_applied_payments(&self) -> BillingResult<Option<InvariantViolation>> {
        let rows: Vec<OverAppliedRow> = sqlx::query_as(
            r#"
            SELECT id, amount_cents, expected_amount_cents
            FROM payments
            WHERE amount_cents > expected_amount_cents
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(InvariantViolation {
            invariant: "payment_over_applied".to_string(),
            affected_ids: rows.iter().map(|r| r.id).collect(),
            description: "payments with applied amount above the expected amount".to_string(),
            context: serde_json::json!(rows
                .iter()
                .map(|r| serde_json::json!({
                    "payment_id": r.id,
                    "amount_cents": r.amount_cents,
                    "expected_amount_cents": r.expected_amount_cents,
                }))
                .collect::<Vec<_>>()),
            severity: ViolationSeverity::Critical,
        }))
    }

    /// Child partial records must never sum above the parent's applied amount
    async fn check_child_sum_exceeds_parent(&self) -> BillingResult<Option<InvariantViolation>> {
        let rows: Vec<ChildSumMismatchRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.amount_cents, SUM(c.amount_cents)::BIGINT AS child_sum
            FROM payments p
            JOIN payments c ON c.parent_payment_id = p.id
            GROUP BY p.id, p.amount_cents
            HAVING SUM(c.amount_cents) > p.amount_cents
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(InvariantViolation {
            invariant: "child_sum_exceeds_parent".to_string(),
            affected_ids: rows.iter().map(|r| r.id).collect(),
            description: "partial-payment children sum above the parent's applied amount"
                .to_string(),
            context: serde_json::json!(rows
                .iter()
                .map(|r| serde_json::json!({
                    "payment_id": r.id,
                    "amount_cents": r.amount_cents,
                    "child_sum": r.child_sum,
                }))
                .collect::<Vec<_>>()),
            severity: ViolationSeverity::High,
        }))
    }

    /// A paid parent must have its full expected amount applied
    async fn check_paid_with_outstanding(&self) -> BillingResult<Option<InvariantViolation>> {
        let rows: Vec<PaidOutstandingRow> = sqlx::query_as(
            r#"
            SELECT id, amount_cents, expected_amount_cents
            FROM payments
            WHERE status = 'paid'
              AND parent_payment_id IS NULL
              AND amount_cents <> expected_amount_cents
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(InvariantViolation {
            invariant: "paid_with_outstanding".to_string(),
            affected_ids: rows.iter().map(|r| r.id).collect(),
            description: "paid payments whose applied amount differs from the expected amount"
                .to_string(),
            context: serde_json::json!(rows
                .iter()
                .map(|r| serde_json::json!({
                    "payment_id": r.id,
                    "amount_cents": r.amount_cents,
                    "expected_amount_cents": r.expected_amount_cents,
                }))
                .collect::<Vec<_>>()),
            severity: ViolationSeverity::High,
        }))
    }

    /// Credit balances are prepaid money and can never go negative
    async fn check_negative_credit_balances(&self) -> BillingResult<Option<InvariantViolation>> {
        let rows: Vec<NegativeCreditRow> = sqlx::query_as(
            "SELECT id, credit_balance_cents FROM clients WHERE credit_balance_cents < 0",
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(InvariantViolation {
            invariant: "negative_credit_balance".to_string(),
            affected_ids: rows.iter().map(|r| r.id).collect(),
            description: "clients with a negative credit balance".to_string(),
            context: serde_json::json!(rows
                .iter()
                .map(|r| serde_json::json!({
                    "client_id": r.id,
                    "credit_balance_cents": r.credit_balance_cents,
                }))
                .collect::<Vec<_>>()),
            severity: ViolationSeverity::Critical,
        }))
    }

    /// Cancelled users should carry the period end their access runs to
    async fn check_cancelled_without_period_end(
        &self,
    ) -> BillingResult<Option<InvariantViolation>> {
        let rows: Vec<CancelledNoEndRow> = sqlx::query_as(
            r#"
            SELECT id FROM users
            WHERE subscription_status = 'cancelled' AND subscription_ends_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(InvariantViolation {
            invariant: "cancelled_without_period_end".to_string(),
            affected_ids: rows.iter().map(|r| r.id).collect(),
            description: "cancelled subscriptions with no recorded period end".to_string(),
            context: serde_json::Value::Null,
            severity: ViolationSeverity::Low,
        }))
    }

    /// Usage counters only ever increment and must stay non-negative
    async fn check_negative_usage_counter(
        &self,
        feature: AiFeature,
    ) -> BillingResult<Option<InvariantViolation>> {
        let column = feature.counter_column();
        let query =
            format!("SELECT user_id FROM monthly_usage WHERE {column} < 0");

        let rows: Vec<(Uuid,)> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(InvariantViolation {
            invariant: format!("negative_usage_counter_{}", feature),
            affected_ids: rows.iter().map(|r| r.0).collect(),
            description: format!("negative {} counters", feature),
            context: serde_json::Value::Null,
            severity: ViolationSeverity::High,
        }))
    }
}
