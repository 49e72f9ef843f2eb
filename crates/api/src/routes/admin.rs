//! Platform admin routes
//!
//! All routes here sit behind the admin role gate. Mutations route
//! through the billing services so the audit trail stays in one place.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use praxis_billing::{
    InvariantCheckSummary, TierLimits, TierLimitsUpdate, UserUsageSummary, WebhookEventRecord,
    WebhookOutcome,
};
use praxis_shared::{SubscriptionStatus, SubscriptionTier};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub tier: Option<SubscriptionTier>,
}

#[derive(Debug, Serialize)]
pub struct AdminUserListResponse {
    pub users: Vec<AdminUserSummary>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminUserSummary {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    pub blocked: bool,
    pub client_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminUserDetail {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_ends_at: Option<OffsetDateTime>,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub blocked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct ChangeTierRequest {
    pub tier: SubscriptionTier,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantFreeRequest {
    pub tier: SubscriptionTier,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AdminAlert {
    pub id: Uuid,
    pub alert_type: String,
    pub message: String,
    pub context: serde_json::Value,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    /// Include already-resolved alerts
    #[serde(default)]
    pub include_resolved: bool,
}

// =============================================================================
// Users
// =============================================================================

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<AdminUserListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = (page - 1) * limit;
    let search = query.search.as_deref().map(|s| format!("%{}%", s.trim()));

    let users: Vec<AdminUserSummary> = sqlx::query_as(
        r#"
        SELECT u.id, u.email, u.display_name, u.subscription_tier, u.subscription_status,
               u.blocked_at IS NOT NULL AS blocked,
               (SELECT COUNT(*) FROM clients c
                WHERE c.user_id = u.id AND c.archived_at IS NULL) AS client_count,
               u.created_at
        FROM users u
        WHERE ($1::text IS NULL OR u.email ILIKE $1 OR u.display_name ILIKE $1)
          AND ($2::varchar IS NULL OR u.subscription_tier = $2)
        ORDER BY u.created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(&search)
    .bind(query.tier)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM users u
        WHERE ($1::text IS NULL OR u.email ILIKE $1 OR u.display_name ILIKE $1)
          AND ($2::varchar IS NULL OR u.subscription_tier = $2)
        "#,
    )
    .bind(&search)
    .bind(query.tier)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(AdminUserListResponse {
        users,
        total,
        page,
        limit,
    }))
}

pub async fn user_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdminUserDetail>> {
    let row: Option<AdminUserDetail> = sqlx::query_as(
        r#"
        SELECT id, email, display_name, role::TEXT AS role, subscription_tier,
               subscription_status, trial_ends_at, subscription_ends_at,
               provider_customer_id, provider_subscription_id, blocked_at,
               last_login_at, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    row.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user {} not found", id)))
}

pub async fn change_tier(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeTierRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .billing
        .subscriptions
        .admin_change_tier(id, request.tier, admin.user_id, request.reason)
        .await?;

    Ok(Json(
        serde_json::json!({ "user_id": id, "tier": request.tier }),
    ))
}

pub async fn grant_free(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<GrantFreeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .billing
        .subscriptions
        .grant_free_access(id, request.tier, admin.user_id, request.reason)
        .await?;

    Ok(Json(
        serde_json::json!({ "user_id": id, "tier": request.tier, "status": "active" }),
    ))
}

pub async fn block_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<BlockRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if id == admin.user_id {
        return Err(ApiError::BadRequest(
            "admins cannot block themselves".to_string(),
        ));
    }

    state
        .billing
        .subscriptions
        .block_user(id, admin.user_id, request.reason)
        .await?;

    Ok(Json(serde_json::json!({ "user_id": id, "blocked": true })))
}

pub async fn unblock_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .billing
        .subscriptions
        .unblock_user(id, admin.user_id)
        .await?;

    Ok(Json(serde_json::json!({ "user_id": id, "blocked": false })))
}

// =============================================================================
// Tier limits
// =============================================================================

pub async fn list_tier_limits(State(state): State<AppState>) -> ApiResult<Json<Vec<TierLimits>>> {
    Ok(Json(state.billing.tier_limits.all().await?))
}

pub async fn get_tier_limits(
    State(state): State<AppState>,
    Path(tier): Path<SubscriptionTier>,
) -> ApiResult<Json<TierLimits>> {
    Ok(Json(state.billing.tier_limits.limits_for(tier).await?))
}

pub async fn update_tier_limits(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(tier): Path<SubscriptionTier>,
    Json(update): Json<TierLimitsUpdate>,
) -> ApiResult<Json<TierLimits>> {
    let limits = state
        .billing
        .tier_limits
        .update(tier, update, admin.user_id)
        .await?;

    Ok(Json(limits))
}

// =============================================================================
// Alerts
// =============================================================================

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<ListAlertsQuery>,
) -> ApiResult<Json<Vec<AdminAlert>>> {
    let rows: Vec<AdminAlert> = sqlx::query_as(
        r#"
        SELECT id, alert_type, message, context, resolved_at, created_at
        FROM admin_alerts
        WHERE $1 OR resolved_at IS NULL
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .bind(query.include_resolved)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

pub async fn resolve_alert(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = sqlx::query(
        "UPDATE admin_alerts SET resolved_at = NOW() WHERE id = $1 AND resolved_at IS NULL",
    )
    .bind(id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("open alert {} not found", id)));
    }

    tracing::info!(alert_id = %id, admin_id = %admin.user_id, "Alert resolved");
    Ok(Json(serde_json::json!({ "resolved": true })))
}

// =============================================================================
// Webhooks, invariants, usage
// =============================================================================

pub async fn list_webhook_events(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<WebhookEventRecord>>> {
    Ok(Json(state.billing.webhooks.recent_events(200).await?))
}

pub async fn replay_webhook(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<WebhookOutcome>> {
    tracing::info!(event_id = %event_id, admin_id = %admin.user_id, "Admin webhook replay");
    let outcome = state.billing.webhooks.replay_event(&event_id).await?;
    Ok(Json(outcome))
}

pub async fn run_invariants(
    State(state): State<AppState>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    Ok(Json(state.billing.invariants.run_all().await?))
}

#[derive(Debug, Serialize)]
pub struct AdminUsageResponse {
    pub totals: praxis_billing::PlatformMonthTotals,
    pub top_users: Vec<UserUsageSummary>,
}

pub async fn usage_summary(State(state): State<AppState>) -> ApiResult<Json<AdminUsageResponse>> {
    let totals = state.billing.usage.platform_month_totals().await?;
    let top_users = state.billing.usage.user_summaries(50).await?;

    Ok(Json(AdminUsageResponse { totals, top_users }))
}
