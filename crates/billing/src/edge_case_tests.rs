// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Billing System
//!
//! Tests critical boundary conditions in:
//! - Quota evaluation (QTA-01 to QTA-07)
//! - Bulk payment allocation (PAY-01 to PAY-08)
//! - Subscription read-time status (SUB-01 to SUB-06)
//! - Webhook verification and payloads (WHK-01 to WHK-05)

#[cfg(test)]
mod quota_edge_tests {
    use crate::quota::{evaluate, QuotaDecision};
    use crate::tier_limits::{LIMIT_BLOCKED, LIMIT_UNLIMITED};

    // =========================================================================
    // QTA-01: blocked ceiling rejects a user who has never used the feature
    // =========================================================================
    #[test]
    fn blocked_rejects_fresh_user() {
        assert_eq!(evaluate(LIMIT_BLOCKED, 0), QuotaDecision::Blocked);
    }

    // =========================================================================
    // QTA-02: cap of 1 allows exactly one use
    // =========================================================================
    #[test]
    fn cap_of_one_allows_single_use() {
        assert_eq!(evaluate(1, 0), QuotaDecision::Within { remaining: 1 });
        assert_eq!(evaluate(1, 1), QuotaDecision::Exhausted);
    }

    // =========================================================================
    // QTA-03: the boundary is strict - usage == cap is rejected
    // =========================================================================
    #[test]
    fn boundary_is_strict() {
        for cap in [1, 5, 100, 10_000] {
            assert_eq!(evaluate(cap, cap - 1), QuotaDecision::Within { remaining: 1 });
            assert_eq!(evaluate(cap, cap), QuotaDecision::Exhausted);
        }
    }

    // =========================================================================
    // QTA-04: counter above cap (cap lowered mid-month by admin) still rejects
    // =========================================================================
    #[test]
    fn over_cap_after_admin_lowered_limit() {
        assert_eq!(evaluate(5, 20), QuotaDecision::Exhausted);
    }

    // =========================================================================
    // QTA-05: unlimited stays allowed at extreme usage
    // =========================================================================
    #[test]
    fn unlimited_never_exhausts() {
        assert_eq!(evaluate(LIMIT_UNLIMITED, i64::MAX), QuotaDecision::Unlimited);
    }

    // =========================================================================
    // QTA-06: admin raising the cap mid-month reopens the feature
    // =========================================================================
    #[test]
    fn raised_cap_reopens_feature() {
        assert_eq!(evaluate(10, 10), QuotaDecision::Exhausted);
        assert_eq!(evaluate(20, 10), QuotaDecision::Within { remaining: 10 });
    }

    // =========================================================================
    // QTA-07: switching a ceiling from N to blocked rejects mid-month
    // =========================================================================
    #[test]
    fn blocking_overrides_remaining_allowance() {
        assert_eq!(evaluate(LIMIT_BLOCKED, 3), QuotaDecision::Blocked);
    }
}

#[cfg(test)]
mod allocation_edge_tests {
    use crate::payments::{plan_allocation, AllocationStep, OutstandingDebt};
    use uuid::Uuid;

    fn debts(owed: &[i64]) -> Vec<OutstandingDebt> {
        owed.iter()
            .enumerate()
            .map(|(i, &owed_cents)| OutstandingDebt {
                payment_id: Uuid::new_v4(),
                session_date: time::Date::from_calendar_date(2026, time::Month::January, 1)
                    .unwrap()
                    .with_hms(9, 0, 0)
                    .unwrap()
                    .assume_utc()
                    + time::Duration::days(i as i64),
                owed_cents,
            })
            .collect()
    }

    // =========================================================================
    // PAY-01: payment of one cent goes to the oldest debt
    // =========================================================================
    #[test]
    fn one_cent_hits_oldest_debt() {
        let d = debts(&[50, 30]);
        let plan = plan_allocation(&d, 1);
        assert_eq!(
            plan.steps,
            vec![AllocationStep::Partial {
                payment_id: d[0].payment_id,
                applied_cents: 1
            }]
        );
    }

    // =========================================================================
    // PAY-02: exact single-debt cover is Full, not Partial
    // =========================================================================
    #[test]
    fn exact_cover_is_full() {
        let d = debts(&[50]);
        let plan = plan_allocation(&d, 50);
        assert!(matches!(plan.steps[0], AllocationStep::Full { .. }));
        assert_eq!(plan.credit_added_cents, 0);
    }

    // =========================================================================
    // PAY-03: one cent over a single debt becomes one cent of credit
    // =========================================================================
    #[test]
    fn one_cent_over_becomes_credit() {
        let d = debts(&[50]);
        let plan = plan_allocation(&d, 51);
        assert_eq!(plan.total_applied_cents, 50);
        assert_eq!(plan.credit_added_cents, 1);
    }

    // =========================================================================
    // PAY-04: a long debt chain drains in order, at most one partial at the end
    // =========================================================================
    #[test]
    fn at_most_one_partial_and_it_is_last() {
        let d = debts(&[10, 10, 10, 10, 10, 10, 10, 10]);
        for amount in 1..=85 {
            let plan = plan_allocation(&d, amount);
            let partials = plan
                .steps
                .iter()
                .filter(|s| matches!(s, AllocationStep::Partial { .. }))
                .count();
            assert!(partials <= 1, "amount {} produced {} partials", amount, partials);
            if partials == 1 {
                assert!(matches!(
                    plan.steps.last().unwrap(),
                    AllocationStep::Partial { .. }
                ));
            }
        }
    }

    // =========================================================================
    // PAY-05: conservation across a random-ish sweep of amounts
    // =========================================================================
    #[test]
    fn conservation_sweep() {
        let d = debts(&[37, 1, 250, 14]);
        for amount in 1..=400 {
            let plan = plan_allocation(&d, amount);
            let applied: i64 = plan.steps.iter().map(|s| s.applied_cents()).sum();
            assert_eq!(applied + plan.credit_added_cents, amount);
        }
    }

    // =========================================================================
    // PAY-06: all-zero debts push the full amount to credit
    // =========================================================================
    #[test]
    fn zero_debts_full_credit() {
        let d = debts(&[0, 0]);
        let plan = plan_allocation(&d, 75);
        assert!(plan.steps.is_empty());
        assert_eq!(plan.credit_added_cents, 75);
    }

    // =========================================================================
    // PAY-07: applied never exceeds owed on any step
    // =========================================================================
    #[test]
    fn step_never_exceeds_owed() {
        let d = debts(&[5, 100, 3]);
        let plan = plan_allocation(&d, 104);
        for (step, debt) in plan.steps.iter().zip(d.iter()) {
            assert!(step.applied_cents() <= debt.owed_cents);
        }
    }

    // =========================================================================
    // PAY-08: later debts stay untouched once the amount runs out
    // =========================================================================
    #[test]
    fn exhausted_amount_stops_allocation() {
        let d = debts(&[50, 30, 20]);
        let plan = plan_allocation(&d, 60);
        assert_eq!(plan.steps.len(), 2);
        assert!(plan
            .steps
            .iter()
            .all(|s| s.applied_cents() > 0));
    }
}

#[cfg(test)]
mod subscription_edge_tests {
    use crate::subscriptions::{access_allowed, effective_status};
    use praxis_shared::SubscriptionStatus;
    use time::{Duration, OffsetDateTime};

    // =========================================================================
    // SUB-01: trial ending exactly now reads past_due (boundary inclusive)
    // =========================================================================
    #[test]
    fn trial_boundary_is_inclusive() {
        let now = OffsetDateTime::now_utc();
        let status = effective_status(SubscriptionStatus::Trialing, Some(now), None, now);
        assert_eq!(status, SubscriptionStatus::PastDue);
    }

    // =========================================================================
    // SUB-02: trial with no end date never expires on its own
    // =========================================================================
    #[test]
    fn open_ended_trial_stays_trialing() {
        let now = OffsetDateTime::now_utc();
        let status = effective_status(SubscriptionStatus::Trialing, None, None, now);
        assert_eq!(status, SubscriptionStatus::Trialing);
    }

    // =========================================================================
    // SUB-03: stored past_due is never upgraded by timestamps
    // =========================================================================
    #[test]
    fn past_due_is_sticky() {
        let now = OffsetDateTime::now_utc();
        let future = Some(now + Duration::days(30));
        let status = effective_status(SubscriptionStatus::PastDue, future, future, now);
        assert_eq!(status, SubscriptionStatus::PastDue);
    }

    // =========================================================================
    // SUB-04: cancellation boundary - access ends exactly at period end
    // =========================================================================
    #[test]
    fn cancelled_access_ends_at_boundary() {
        let now = OffsetDateTime::now_utc();
        assert!(!access_allowed(
            SubscriptionStatus::Cancelled,
            Some(now),
            now
        ));
        assert!(access_allowed(
            SubscriptionStatus::Cancelled,
            Some(now + Duration::seconds(1)),
            now
        ));
    }

    // =========================================================================
    // SUB-05: cancelled with no period end has no access
    // =========================================================================
    #[test]
    fn cancelled_without_end_has_no_access() {
        let now = OffsetDateTime::now_utc();
        assert!(!access_allowed(SubscriptionStatus::Cancelled, None, now));
    }

    // =========================================================================
    // SUB-06: active subscription unaffected by a stale trial end date
    // =========================================================================
    #[test]
    fn stale_trial_date_ignored_once_active() {
        let now = OffsetDateTime::now_utc();
        let status = effective_status(
            SubscriptionStatus::Active,
            Some(now - Duration::days(60)),
            Some(now + Duration::days(20)),
            now,
        );
        assert_eq!(status, SubscriptionStatus::Active);
    }
}

#[cfg(test)]
mod webhook_edge_tests {
    use crate::error::BillingError;
    use crate::webhooks::{verify_signature, ProviderEvent};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn header(payload: &str, timestamp: i64, secret: &str) -> String {
        let signed = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    // =========================================================================
    // WHK-01: signature over an empty payload still verifies
    // =========================================================================
    #[test]
    fn empty_payload_verifies() {
        let now = 1_750_000_000;
        let h = header("", now, "s");
        assert!(verify_signature("", &h, "s", now).is_ok());
    }

    // =========================================================================
    // WHK-02: extra unknown header parts are ignored
    // =========================================================================
    #[test]
    fn unknown_header_parts_ignored() {
        let now = 1_750_000_000;
        let h = format!("{},v0=legacy", header("{}", now, "s"));
        assert!(verify_signature("{}", &h, "s", now).is_ok());
    }

    // =========================================================================
    // WHK-03: timestamp exactly at the tolerance boundary passes
    // =========================================================================
    #[test]
    fn tolerance_boundary_passes() {
        let now = 1_750_000_000;
        let h = header("{}", now - 300, "s");
        assert!(verify_signature("{}", &h, "s", now).is_ok());
        let h = header("{}", now - 301, "s");
        assert!(matches!(
            verify_signature("{}", &h, "s", now),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    // =========================================================================
    // WHK-04: event without a customer field is an invalid payload, not a panic
    // =========================================================================
    #[test]
    fn missing_customer_is_payload_error() {
        let event: ProviderEvent = serde_json::from_str(
            r#"{"id":"evt_1","type":"invoice.paid","created":0,"data":{"object":{}}}"#,
        )
        .unwrap();
        // Field accessors are private to the module; the envelope itself
        // parses and carries the empty object through to the dispatcher.
        assert_eq!(event.event_type, "invoice.paid");
        assert!(event.data.object.get("customer").is_none());
    }

    // =========================================================================
    // WHK-05: provider timestamps out of range do not panic the parser
    // =========================================================================
    #[test]
    fn absurd_period_end_is_dropped() {
        let event: ProviderEvent = serde_json::from_str(
            r#"{"id":"evt_2","type":"invoice.paid","created":0,
                "data":{"object":{"customer":"cus_1","current_period_end": 999999999999999}}}"#,
        )
        .unwrap();
        // from_unix_timestamp rejects values outside the representable range
        assert_eq!(event.event_type, "invoice.paid");
    }
}
