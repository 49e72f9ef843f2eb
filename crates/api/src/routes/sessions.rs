//! Therapy session scheduling
//!
//! Sessions are the scheduling unit: created against a client, moved
//! through scheduled/completed/cancelled/no_show, and billed once
//! completed. Create and update push a best-effort calendar sync when the
//! integration is configured.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use praxis_shared::TherapySessionStatus;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::calendar::CalendarEvent;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SessionResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub status: TherapySessionStatus,
    pub fee_cents: i64,
    pub calendar_event_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub client_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    pub duration_minutes: i32,
    pub fee_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_at: Option<OffsetDateTime>,
    pub duration_minutes: Option<i32>,
    pub fee_cents: Option<i64>,
    pub status: Option<TherapySessionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub client_id: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub to: Option<OffsetDateTime>,
}

const SESSION_COLUMNS: &str = "id, client_id, scheduled_at, duration_minutes, status, fee_cents, \
                               calendar_event_id, created_at, updated_at";

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<Vec<SessionResponse>>> {
    let rows: Vec<SessionResponse> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS} FROM therapy_sessions \
         WHERE user_id = $1 \
           AND ($2::uuid IS NULL OR client_id = $2) \
           AND ($3::timestamptz IS NULL OR scheduled_at >= $3) \
           AND ($4::timestamptz IS NULL OR scheduled_at < $4) \
         ORDER BY scheduled_at",
    ))
    .bind(user.user_id)
    .bind(query.client_id)
    .bind(query.from)
    .bind(query.to)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<SessionResponse>> {
    if request.duration_minutes <= 0 {
        return Err(ApiError::Validation(
            "duration_minutes must be positive".to_string(),
        ));
    }
    if request.fee_cents < 0 {
        return Err(ApiError::Validation(
            "fee_cents must not be negative".to_string(),
        ));
    }

    // The client must belong to this therapist and be active
    let client: Option<(String,)> = sqlx::query_as(
        "SELECT full_name FROM clients WHERE id = $1 AND user_id = $2 AND archived_at IS NULL",
    )
    .bind(request.client_id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let (client_name,) = client
        .ok_or_else(|| ApiError::NotFound(format!("client {} not found", request.client_id)))?;

    let mut row: SessionResponse = sqlx::query_as(&format!(
        "INSERT INTO therapy_sessions \
             (id, client_id, user_id, scheduled_at, duration_minutes, status, fee_cents) \
         VALUES ($1, $2, $3, $4, $5, 'scheduled', $6) \
         RETURNING {SESSION_COLUMNS}",
    ))
    .bind(Uuid::new_v4())
    .bind(request.client_id)
    .bind(user.user_id)
    .bind(request.scheduled_at)
    .bind(request.duration_minutes)
    .bind(request.fee_cents)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(session_id = %row.id, client_id = %row.client_id, "Session scheduled");

    row.calendar_event_id = sync_calendar(&state, &row, &client_name, None).await;

    Ok(Json(row))
}

pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionResponse>> {
    let row: Option<SessionResponse> = sqlx::query_as(&format!(
        "SELECT {SESSION_COLUMNS} FROM therapy_sessions WHERE id = $1 AND user_id = $2",
    ))
    .bind(id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    row.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", id)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSessionRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let row: Option<SessionResponse> = sqlx::query_as(&format!(
        "UPDATE therapy_sessions SET \
             scheduled_at = COALESCE($1, scheduled_at), \
             duration_minutes = COALESCE($2, duration_minutes), \
             fee_cents = COALESCE($3, fee_cents), \
             status = COALESCE($4, status), \
             updated_at = NOW() \
         WHERE id = $5 AND user_id = $6 \
         RETURNING {SESSION_COLUMNS}",
    ))
    .bind(request.scheduled_at)
    .bind(request.duration_minutes)
    .bind(request.fee_cents)
    .bind(request.status)
    .bind(id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let mut row =
        row.ok_or_else(|| ApiError::NotFound(format!("session {} not found", id)))?;

    if request.scheduled_at.is_some() || request.duration_minutes.is_some() {
        let client_name: String = sqlx::query_scalar("SELECT full_name FROM clients WHERE id = $1")
            .bind(row.client_id)
            .fetch_one(&state.pool)
            .await?;
        row.calendar_event_id =
            sync_calendar(&state, &row, &client_name, row.calendar_event_id.as_deref()).await;
    }

    Ok(Json(row))
}

/// Cancel a session. The row stays for history; any pending payment stays
/// pending and can still be settled or written off by the therapist.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let event_id: Option<Option<String>> = sqlx::query_scalar(
        "UPDATE therapy_sessions SET status = 'cancelled', updated_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND status = 'scheduled' \
         RETURNING calendar_event_id",
    )
    .bind(id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(event_id) = event_id else {
        return Err(ApiError::NotFound(format!(
            "scheduled session {} not found",
            id
        )));
    };

    if let (Some(calendar), Some(event_id)) = (&state.calendar, event_id) {
        calendar.delete_event(&event_id).await;
    }

    tracing::info!(session_id = %id, "Session cancelled");
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

/// Push the session to the external calendar, storing the event id.
/// Failures log and leave the previous id in place.
async fn sync_calendar(
    state: &AppState,
    session: &SessionResponse,
    client_name: &str,
    existing_event_id: Option<&str>,
) -> Option<String> {
    let calendar = state.calendar.as_ref()?;

    let event = CalendarEvent {
        session_id: session.id,
        title: format!("Session: {}", client_name),
        starts_at: session.scheduled_at,
        duration_minutes: session.duration_minutes,
    };

    let event_id = calendar.push_event(&event, existing_event_id).await?;

    let result = sqlx::query("UPDATE therapy_sessions SET calendar_event_id = $1 WHERE id = $2")
        .bind(&event_id)
        .bind(session.id)
        .execute(&state.pool)
        .await;
    if let Err(e) = result {
        tracing::warn!(session_id = %session.id, error = %e, "Failed to store calendar event id");
    }

    Some(event_id)
}
