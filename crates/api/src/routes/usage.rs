//! Usage and subscription views

use axum::extract::State;
use axum::{Extension, Json};
use praxis_billing::{EffectiveSubscription, MonthlyUsage, QuotaCheck};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub usage: MonthlyUsage,
    /// One quota status per AI feature
    pub quotas: Vec<QuotaCheck>,
}

/// Current month's counters plus the quota status for every feature
pub async fn month_usage(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UsageResponse>> {
    let usage = state.billing.usage.month_summary(user.user_id).await?;
    let quotas = state.billing.quota.check_all(user.user_id).await?;

    Ok(Json(UsageResponse { usage, quotas }))
}

/// Read-time subscription view (status computed against the wall clock)
pub async fn subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<EffectiveSubscription>> {
    let subscription = state
        .billing
        .subscriptions
        .subscription_for(user.user_id)
        .await?;

    Ok(Json(subscription))
}
