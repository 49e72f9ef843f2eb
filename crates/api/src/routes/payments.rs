//! Payment routes
//!
//! Listing is a read straight off the payments table; the mutations
//! (billing a session, the bulk allocator, credit application) go through
//! `praxis_billing::PaymentService` so every money write shares one
//! transactional code path.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use praxis_billing::{BulkPaymentResult, CreditApplication};
use praxis_shared::{PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub session_id: Option<Uuid>,
    pub parent_payment_id: Option<Uuid>,
    pub amount_cents: i64,
    pub expected_amount_cents: i64,
    pub status: PaymentStatus,
    pub method: Option<PaymentMethod>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct BulkPaymentRequest {
    pub amount_cents: i64,
    pub method: PaymentMethod,
}

pub async fn list_for_client(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PaymentResponse>>> {
    let owner: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM clients WHERE id = $1 AND user_id = $2")
            .bind(client_id)
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;

    if owner.is_none() {
        return Err(ApiError::NotFound(format!(
            "client {} not found",
            client_id
        )));
    }

    let rows: Vec<PaymentResponse> = sqlx::query_as(
        r#"
        SELECT id, client_id, session_id, parent_payment_id, amount_cents,
               expected_amount_cents, status, method, paid_at, created_at
        FROM payments
        WHERE client_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(client_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

/// Create the pending payment for a session's fee
pub async fn bill_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let payment_id = state
        .billing
        .payments
        .bill_session(user.user_id, session_id)
        .await?;

    Ok(Json(serde_json::json!({ "payment_id": payment_id })))
}

/// Distribute an incoming amount across the client's pending debts,
/// oldest session first; leftover lands on the credit balance.
pub async fn bulk_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
    Json(request): Json<BulkPaymentRequest>,
) -> ApiResult<Json<BulkPaymentResult>> {
    let result = state
        .billing
        .payments
        .apply_bulk_payment(user.user_id, client_id, request.amount_cents, request.method)
        .await?;

    Ok(Json(result))
}

/// Apply the client's credit balance to one pending payment
pub async fn apply_credit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<CreditApplication>> {
    let result = state
        .billing
        .payments
        .apply_credit(user.user_id, payment_id)
        .await?;

    Ok(Json(result))
}
