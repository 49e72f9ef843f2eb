//! Client payments and the bulk payment allocator
//!
//! A bulk payment distributes an incoming amount across a client's pending
//! session debts in ascending session-date order (oldest debt first). A
//! debt fully covered is marked paid; a partial application inserts a child
//! paid payment under the pending parent and raises the parent's applied
//! amount. Whatever is left after all debts are cleared lands on the
//! client's credit balance.
//!
//! The whole allocation runs in one transaction; any failure aborts it
//! all-or-nothing. Conservation holds for every run:
//! `sum(applied) + leftover_credit == input_amount`.

use praxis_shared::{PaymentMethod, PaymentStatus};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// A pending parent payment with its outstanding amount, ordered for FIFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingDebt {
    pub payment_id: Uuid,
    pub session_date: OffsetDateTime,
    pub owed_cents: i64,
}

/// One application decided by the planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationStep {
    /// Covers the debt entirely: parent becomes paid
    Full { payment_id: Uuid, applied_cents: i64 },
    /// Covers part of the debt: child paid record, parent stays pending
    Partial { payment_id: Uuid, applied_cents: i64 },
}

impl AllocationStep {
    pub fn applied_cents(&self) -> i64 {
        match self {
            AllocationStep::Full { applied_cents, .. }
            | AllocationStep::Partial { applied_cents, .. } => *applied_cents,
        }
    }
}

/// Full allocation decision for one bulk payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub steps: Vec<AllocationStep>,
    pub total_applied_cents: i64,
    /// Leftover after all debts cleared, credited to the client
    pub credit_added_cents: i64,
}

/// Distribute `amount_cents` across `debts`, oldest session first.
///
/// `debts` must already be sorted by session date ascending; the executor
/// queries them that way. Debts with nothing owed are skipped.
pub fn plan_allocation(debts: &[OutstandingDebt], amount_cents: i64) -> AllocationPlan {
    let mut remaining = amount_cents;
    let mut steps = Vec::new();

    for debt in debts {
        if remaining == 0 {
            break;
        }
        if debt.owed_cents <= 0 {
            continue;
        }

        let applied = remaining.min(debt.owed_cents);
        if applied == debt.owed_cents {
            steps.push(AllocationStep::Full {
                payment_id: debt.payment_id,
                applied_cents: applied,
            });
        } else {
            steps.push(AllocationStep::Partial {
                payment_id: debt.payment_id,
                applied_cents: applied,
            });
        }
        remaining -= applied;
    }

    AllocationPlan {
        total_applied_cents: amount_cents - remaining,
        credit_added_cents: remaining,
        steps,
    }
}

/// One applied payment in a bulk payment response
#[derive(Debug, Clone, Serialize)]
pub struct AppliedPayment {
    pub payment_id: Uuid,
    pub applied_cents: i64,
    pub status: PaymentStatus,
}

/// Result of a bulk payment run
#[derive(Debug, Clone, Serialize)]
pub struct BulkPaymentResult {
    pub client_id: Uuid,
    pub input_amount_cents: i64,
    pub applied: Vec<AppliedPayment>,
    pub total_applied_cents: i64,
    pub credit_added_cents: i64,
    pub credit_balance_cents: i64,
}

/// Result of applying credit balance to one pending payment
#[derive(Debug, Clone, Serialize)]
pub struct CreditApplication {
    pub payment_id: Uuid,
    pub applied_cents: i64,
    pub status: PaymentStatus,
    pub credit_balance_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DebtRow {
    id: Uuid,
    session_date: OffsetDateTime,
    owed_cents: i64,
}

/// Payment operations scoped to a therapist's own clients
#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl PaymentService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Create the pending payment for a billed session.
    ///
    /// One parent payment per session; billing an already billed session is
    /// rejected.
    pub async fn bill_session(&self, user_id: Uuid, session_id: Uuid) -> BillingResult<Uuid> {
        let session: Option<(Uuid, i64)> = sqlx::query_as(
            "SELECT client_id, fee_cents FROM therapy_sessions WHERE id = $1 AND user_id = $2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (client_id, fee_cents) = session
            .ok_or_else(|| BillingError::NotFound(format!("session {} not found", session_id)))?;

        if fee_cents <= 0 {
            return Err(BillingError::InvalidAmount(
                "session has no billable fee".to_string(),
            ));
        }

        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM payments WHERE session_id = $1 AND parent_payment_id IS NULL",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Err(BillingError::InvalidAmount(
                "session is already billed".to_string(),
            ));
        }

        let payment_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO payments (id, client_id, session_id, amount_cents, expected_amount_cents, status)
            VALUES ($1, $2, $3, 0, $4, 'pending')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(session_id)
        .bind(fee_cents)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            session_id = %session_id,
            payment_id = %payment_id,
            fee_cents = fee_cents,
            "Session billed"
        );

        Ok(payment_id)
    }

    /// Distribute one incoming payment across the client's pending debts.
    pub async fn apply_bulk_payment(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        amount_cents: i64,
        method: PaymentMethod,
    ) -> BillingResult<BulkPaymentResult> {
        if amount_cents <= 0 {
            return Err(BillingError::InvalidAmount(
                "payment amount must be positive".to_string(),
            ));
        }
        if method == PaymentMethod::CreditBalance {
            return Err(BillingError::InvalidAmount(
                "bulk payments must carry new money; use apply-credit for balance transfers"
                    .to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        // Lock the client row first so concurrent allocations for the same
        // client serialize on it.
        let balance_before: Option<i64> = sqlx::query_scalar(
            "SELECT credit_balance_cents FROM clients WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(client_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let balance_before = balance_before
            .ok_or_else(|| BillingError::NotFound(format!("client {} not found", client_id)))?;

        // Oldest session debt first: FIFO policy.
        let debt_rows: Vec<DebtRow> = sqlx::query_as(
            r#"
            SELECT p.id, s.scheduled_at AS session_date,
                   p.expected_amount_cents - p.amount_cents AS owed_cents
            FROM payments p
            JOIN therapy_sessions s ON s.id = p.session_id
            WHERE p.client_id = $1
              AND p.status = 'pending'
              AND p.parent_payment_id IS NULL
            ORDER BY s.scheduled_at ASC
            FOR UPDATE OF p
            "#,
        )
        .bind(client_id)
        .fetch_all(&mut *tx)
        .await?;

        let debts: Vec<OutstandingDebt> = debt_rows
            .into_iter()
            .map(|r| OutstandingDebt {
                payment_id: r.id,
                session_date: r.session_date,
                owed_cents: r.owed_cents,
            })
            .collect();

        let plan = plan_allocation(&debts, amount_cents);

        let mut applied = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            applied.push(Self::execute_step(&mut tx, client_id, step, method).await?);
        }

        let credit_balance_cents = if plan.credit_added_cents > 0 {
            sqlx::query_scalar(
                r#"
                UPDATE clients
                SET credit_balance_cents = credit_balance_cents + $1, updated_at = NOW()
                WHERE id = $2
                RETURNING credit_balance_cents
                "#,
            )
            .bind(plan.credit_added_cents)
            .bind(client_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            balance_before
        };

        tx.commit().await?;

        tracing::info!(
            client_id = %client_id,
            input_amount_cents = amount_cents,
            total_applied_cents = plan.total_applied_cents,
            credit_added_cents = plan.credit_added_cents,
            debts = applied.len(),
            "Bulk payment allocated"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(user_id, BillingEventType::BulkPaymentApplied)
                    .data(serde_json::json!({
                        "client_id": client_id,
                        "input_amount_cents": amount_cents,
                        "total_applied_cents": plan.total_applied_cents,
                        "credit_added_cents": plan.credit_added_cents,
                        "method": method.as_str(),
                    }))
                    .actor(user_id, ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log bulk payment event");
        }

        Ok(BulkPaymentResult {
            client_id,
            input_amount_cents: amount_cents,
            applied,
            total_applied_cents: plan.total_applied_cents,
            credit_added_cents: plan.credit_added_cents,
            credit_balance_cents,
        })
    }

    /// Apply the client's credit balance to one pending payment.
    ///
    /// Applies `min(balance, owed)`. Conservation:
    /// `balance_after == balance_before - applied`.
    pub async fn apply_credit(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> BillingResult<CreditApplication> {
        let mut tx = self.pool.begin().await?;

        let payment: Option<(Uuid, i64, String)> = sqlx::query_as(
            r#"
            SELECT p.client_id, p.expected_amount_cents - p.amount_cents AS owed_cents,
                   p.status::TEXT
            FROM payments p
            JOIN clients c ON c.id = p.client_id
            WHERE p.id = $1 AND c.user_id = $2 AND p.parent_payment_id IS NULL
            FOR UPDATE OF p
            "#,
        )
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (client_id, owed_cents, status) = payment
            .ok_or_else(|| BillingError::NotFound(format!("payment {} not found", payment_id)))?;

        if status != "pending" || owed_cents <= 0 {
            return Err(BillingError::InvalidAmount(
                "payment has no outstanding amount".to_string(),
            ));
        }

        let balance: i64 =
            sqlx::query_scalar("SELECT credit_balance_cents FROM clients WHERE id = $1 FOR UPDATE")
                .bind(client_id)
                .fetch_one(&mut *tx)
                .await?;

        if balance <= 0 {
            return Err(BillingError::NoCreditAvailable {
                balance_cents: balance,
            });
        }

        let applied_cents = balance.min(owed_cents);
        let step = if applied_cents == owed_cents {
            AllocationStep::Full {
                payment_id,
                applied_cents,
            }
        } else {
            AllocationStep::Partial {
                payment_id,
                applied_cents,
            }
        };

        let applied =
            Self::execute_step(&mut tx, client_id, &step, PaymentMethod::CreditBalance).await?;

        let credit_balance_cents: i64 = sqlx::query_scalar(
            r#"
            UPDATE clients
            SET credit_balance_cents = credit_balance_cents - $1, updated_at = NOW()
            WHERE id = $2
            RETURNING credit_balance_cents
            "#,
        )
        .bind(applied_cents)
        .bind(client_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment_id,
            client_id = %client_id,
            applied_cents = applied_cents,
            credit_balance_cents = credit_balance_cents,
            "Credit applied to payment"
        );

        if let Err(e) = self
            .event_logger
            .log_event(
                BillingEventBuilder::new(user_id, BillingEventType::CreditApplied)
                    .data(serde_json::json!({
                        "client_id": client_id,
                        "payment_id": payment_id,
                        "applied_cents": applied_cents,
                    }))
                    .actor(user_id, ActorType::User),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to log credit application event");
        }

        Ok(CreditApplication {
            payment_id,
            applied_cents,
            status: applied.status,
            credit_balance_cents,
        })
    }

    /// Execute one planned step inside the allocation transaction
    async fn execute_step(
        tx: &mut Transaction<'_, Postgres>,
        client_id: Uuid,
        step: &AllocationStep,
        method: PaymentMethod,
    ) -> BillingResult<AppliedPayment> {
        match step {
            AllocationStep::Full {
                payment_id,
                applied_cents,
            } => {
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = 'paid',
                        amount_cents = expected_amount_cents,
                        method = $1,
                        paid_at = NOW()
                    WHERE id = $2
                    "#,
                )
                .bind(method)
                .bind(payment_id)
                .execute(&mut **tx)
                .await?;

                Ok(AppliedPayment {
                    payment_id: *payment_id,
                    applied_cents: *applied_cents,
                    status: PaymentStatus::Paid,
                })
            }
            AllocationStep::Partial {
                payment_id,
                applied_cents,
            } => {
                // Child record carries the applied slice; the parent keeps
                // the original expectation and stays pending.
                sqlx::query(
                    r#"
                    INSERT INTO payments (
                        id, client_id, session_id, parent_payment_id,
                        amount_cents, expected_amount_cents, status, method, paid_at
                    )
                    SELECT $1, $2, p.session_id, p.id, $3, $3, 'paid', $4, NOW()
                    FROM payments p
                    WHERE p.id = $5
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(client_id)
                .bind(applied_cents)
                .bind(method)
                .bind(payment_id)
                .execute(&mut **tx)
                .await?;

                sqlx::query("UPDATE payments SET amount_cents = amount_cents + $1 WHERE id = $2")
                    .bind(applied_cents)
                    .bind(payment_id)
                    .execute(&mut **tx)
                    .await?;

                Ok(AppliedPayment {
                    payment_id: *payment_id,
                    applied_cents: *applied_cents,
                    status: PaymentStatus::Pending,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debt(owed: i64, day: u8) -> OutstandingDebt {
        let date = time::Date::from_calendar_date(2026, time::Month::March, day)
            .unwrap()
            .with_hms(10, 0, 0)
            .unwrap()
            .assume_utc();
        OutstandingDebt {
            payment_id: Uuid::new_v4(),
            session_date: date,
            owed_cents: owed,
        }
    }

    fn applied_total(plan: &AllocationPlan) -> i64 {
        plan.steps.iter().map(|s| s.applied_cents()).sum()
    }

    #[test]
    fn fifo_partial_scenario() {
        // Debts [50, 30, 20], payment 60: first paid in full, 10 applied to
        // the second, third untouched, no leftover.
        let debts = vec![debt(50, 1), debt(30, 2), debt(20, 3)];
        let plan = plan_allocation(&debts, 60);

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(
            plan.steps[0],
            AllocationStep::Full {
                payment_id: debts[0].payment_id,
                applied_cents: 50
            }
        );
        assert_eq!(
            plan.steps[1],
            AllocationStep::Partial {
                payment_id: debts[1].payment_id,
                applied_cents: 10
            }
        );
        assert_eq!(plan.total_applied_cents, 60);
        assert_eq!(plan.credit_added_cents, 0);
    }

    #[test]
    fn conservation_holds_for_every_split() {
        let debts = vec![debt(50, 1), debt(30, 2), debt(20, 3)];
        for amount in [1, 49, 50, 51, 99, 100, 101, 250] {
            let plan = plan_allocation(&debts, amount);
            assert_eq!(
                applied_total(&plan) + plan.credit_added_cents,
                amount,
                "conservation violated for amount {}",
                amount
            );
            assert_eq!(applied_total(&plan), plan.total_applied_cents);
        }
    }

    #[test]
    fn overpayment_becomes_credit() {
        let debts = vec![debt(25, 1)];
        let plan = plan_allocation(&debts, 100);

        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.total_applied_cents, 25);
        assert_eq!(plan.credit_added_cents, 75);
    }

    #[test]
    fn no_debts_means_all_credit() {
        let plan = plan_allocation(&[], 40);
        assert!(plan.steps.is_empty());
        assert_eq!(plan.total_applied_cents, 0);
        assert_eq!(plan.credit_added_cents, 40);
    }

    #[test]
    fn exact_cover_leaves_no_credit() {
        let debts = vec![debt(50, 1), debt(30, 2)];
        let plan = plan_allocation(&debts, 80);

        assert_eq!(plan.steps.len(), 2);
        assert!(plan
            .steps
            .iter()
            .all(|s| matches!(s, AllocationStep::Full { .. })));
        assert_eq!(plan.credit_added_cents, 0);
    }

    #[test]
    fn zero_owed_debts_are_skipped() {
        let debts = vec![debt(0, 1), debt(30, 2)];
        let plan = plan_allocation(&debts, 10);

        assert_eq!(plan.steps.len(), 1);
        assert_eq!(
            plan.steps[0],
            AllocationStep::Partial {
                payment_id: debts[1].payment_id,
                applied_cents: 10
            }
        );
    }
}
