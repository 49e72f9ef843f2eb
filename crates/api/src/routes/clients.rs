//! Client record CRUD
//!
//! Clients are scoped to the owning therapist. Delete is an archive;
//! client records are never hard-deleted.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ClientResponse {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub credit_balance_cents: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub archived_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

const CLIENT_COLUMNS: &str =
    "id, full_name, email, phone, credit_balance_cents, archived_at, created_at, updated_at";

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<ClientResponse>>> {
    let rows: Vec<ClientResponse> = sqlx::query_as(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients \
         WHERE user_id = $1 AND archived_at IS NULL ORDER BY full_name",
    ))
    .bind(user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateClientRequest>,
) -> ApiResult<Json<ClientResponse>> {
    let full_name = request.full_name.trim();
    if full_name.is_empty() {
        return Err(ApiError::Validation("full_name is required".to_string()));
    }

    let row: ClientResponse = sqlx::query_as(&format!(
        "INSERT INTO clients (id, user_id, full_name, email, phone) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {CLIENT_COLUMNS}",
    ))
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(full_name)
    .bind(&request.email)
    .bind(&request.phone)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(client_id = %row.id, user_id = %user.user_id, "Client created");
    Ok(Json(row))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ClientResponse>> {
    let row: Option<ClientResponse> = sqlx::query_as(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1 AND user_id = $2",
    ))
    .bind(id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    row.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("client {} not found", id)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateClientRequest>,
) -> ApiResult<Json<ClientResponse>> {
    let row: Option<ClientResponse> = sqlx::query_as(&format!(
        "UPDATE clients SET \
             full_name = COALESCE($1, full_name), \
             email = COALESCE($2, email), \
             phone = COALESCE($3, phone), \
             updated_at = NOW() \
         WHERE id = $4 AND user_id = $5 \
         RETURNING {CLIENT_COLUMNS}",
    ))
    .bind(&request.full_name)
    .bind(&request.email)
    .bind(&request.phone)
    .bind(id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    row.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("client {} not found", id)))
}

/// Soft delete: the record stays for payment history and notes
pub async fn archive(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = sqlx::query(
        "UPDATE clients SET archived_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND archived_at IS NULL",
    )
    .bind(id)
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("client {} not found", id)));
    }

    tracing::info!(client_id = %id, user_id = %user.user_id, "Client archived");
    Ok(Json(serde_json::json!({ "archived": true })))
}
