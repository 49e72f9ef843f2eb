//! Session notes

use axum::extract::{Path, State};
use axum::{Extension, Json};
use praxis_shared::NoteType;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct NoteResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub note_type: NoteType,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub note_type: NoteType,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub note_type: Option<NoteType>,
    pub content: Option<String>,
}

const NOTE_COLUMNS: &str = "id, session_id, note_type, content, created_at, updated_at";

pub async fn list_for_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<NoteResponse>>> {
    ensure_session_owner(&state, user.user_id, session_id).await?;

    let rows: Vec<NoteResponse> = sqlx::query_as(&format!(
        "SELECT {NOTE_COLUMNS} FROM session_notes WHERE session_id = $1 ORDER BY created_at",
    ))
    .bind(session_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CreateNoteRequest>,
) -> ApiResult<Json<NoteResponse>> {
    if request.content.trim().is_empty() {
        return Err(ApiError::Validation("content is required".to_string()));
    }

    ensure_session_owner(&state, user.user_id, session_id).await?;

    let row: NoteResponse = sqlx::query_as(&format!(
        "INSERT INTO session_notes (id, session_id, user_id, note_type, content) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {NOTE_COLUMNS}",
    ))
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(user.user_id)
    .bind(request.note_type)
    .bind(&request.content)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(row))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateNoteRequest>,
) -> ApiResult<Json<NoteResponse>> {
    let row: Option<NoteResponse> = sqlx::query_as(&format!(
        "UPDATE session_notes SET \
             note_type = COALESCE($1, note_type), \
             content = COALESCE($2, content), \
             updated_at = NOW() \
         WHERE id = $3 AND user_id = $4 \
         RETURNING {NOTE_COLUMNS}",
    ))
    .bind(request.note_type)
    .bind(&request.content)
    .bind(id)
    .bind(user.user_id)
    .fetch_optional(&state.pool)
    .await?;

    row.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("note {} not found", id)))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM session_notes WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.user_id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("note {} not found", id)));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn ensure_session_owner(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
) -> ApiResult<()> {
    let exists: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM therapy_sessions WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?;

    if exists.is_none() {
        return Err(ApiError::NotFound(format!(
            "session {} not found",
            session_id
        )));
    }
    Ok(())
}
