// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Praxis Billing Module
//!
//! Everything money- and entitlement-shaped: monthly AI quotas against
//! tier ceilings, the FIFO bulk payment allocator, subscription lifecycle
//! driven by provider webhooks, billing audit events, email notices, and
//! runnable consistency checks.

pub mod email;
pub mod error;
pub mod events;
pub mod invariants;
pub mod payments;
pub mod quota;
pub mod subscriptions;
pub mod tier_limits;
pub mod usage;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Email
pub use email::BillingEmailService;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{ActorType, BillingEvent, BillingEventBuilder, BillingEventLogger, BillingEventType};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Payments
pub use payments::{
    plan_allocation, AllocationPlan, AllocationStep, AppliedPayment, BulkPaymentResult,
    CreditApplication, OutstandingDebt, PaymentService,
};

// Quota
pub use quota::{evaluate, QuotaCheck, QuotaDecision, QuotaReservation, QuotaService};

// Subscriptions
pub use subscriptions::{
    access_allowed, effective_status, EffectiveSubscription, SubscriptionRecord,
    SubscriptionService,
};

// Tier limits
pub use tier_limits::{
    TierLimits, TierLimitsService, TierLimitsUpdate, LIMIT_BLOCKED, LIMIT_UNLIMITED,
};

// Usage
pub use usage::{MonthlyUsage, PlatformMonthTotals, UsageMeter, UserUsageSummary};

// Webhooks
pub use webhooks::{
    verify_signature, ProviderEvent, ProviderEventData, WebhookEventRecord, WebhookHandler,
    WebhookOutcome,
};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub email: BillingEmailService,
    pub invariants: InvariantChecker,
    pub payments: PaymentService,
    pub quota: QuotaService,
    pub subscriptions: SubscriptionService,
    pub tier_limits: TierLimitsService,
    pub usage: UsageMeter,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a billing service with an explicit webhook secret
    pub fn new(pool: PgPool, webhook_secret: String) -> Self {
        let email = BillingEmailService::from_env();

        Self {
            email,
            invariants: InvariantChecker::new(pool.clone()),
            payments: PaymentService::new(pool.clone()),
            quota: QuotaService::new(pool.clone()),
            subscriptions: SubscriptionService::new(pool.clone()),
            tier_limits: TierLimitsService::new(pool.clone()),
            usage: UsageMeter::new(pool.clone()),
            webhooks: WebhookHandler::new(pool, webhook_secret),
        }
    }

    /// Create a billing service from environment variables
    ///
    /// `PROVIDER_WEBHOOK_SECRET` must be set; everything else is optional.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let webhook_secret = std::env::var("PROVIDER_WEBHOOK_SECRET").map_err(|_| {
            BillingError::InvalidWebhookPayload("PROVIDER_WEBHOOK_SECRET not set".to_string())
        })?;

        Ok(Self::new(pool, webhook_secret))
    }
}
