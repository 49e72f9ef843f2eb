//! AI transcript analysis
//!
//! The gate order matters: subscription access first, then an atomic quota
//! reservation, then the AI call. The reservation is the counter
//! increment, so two concurrent requests can never both take the last
//! slot of a capped feature. Token and cost totals are recorded after the
//! call succeeds.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use praxis_shared::AiFeature;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Transcripts beyond this are rejected before any quota is consumed
const MAX_TRANSCRIPT_CHARS: usize = 400_000;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub transcript: String,
    /// Optional session to associate the analysis with
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub feature: AiFeature,
    pub result: String,
    pub usage_after: i64,
    /// -1 blocked, 0 unlimited, N monthly cap
    pub limit: i64,
    pub tokens: i64,
}

pub async fn analyze(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(feature): Path<AiFeature>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let transcript = request.transcript.trim();
    if transcript.is_empty() {
        return Err(ApiError::Validation("transcript is required".to_string()));
    }
    if transcript.len() > MAX_TRANSCRIPT_CHARS {
        return Err(ApiError::Validation(format!(
            "transcript exceeds {} characters",
            MAX_TRANSCRIPT_CHARS
        )));
    }

    if let Some(session_id) = request.session_id {
        let owned: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM therapy_sessions WHERE id = $1 AND user_id = $2")
                .bind(session_id)
                .bind(user.user_id)
                .fetch_optional(&state.pool)
                .await?;
        if owned.is_none() {
            return Err(ApiError::NotFound(format!(
                "session {} not found",
                session_id
            )));
        }
    }

    let subscription = state
        .billing
        .subscriptions
        .subscription_for(user.user_id)
        .await?;
    if !subscription.access_allowed {
        return Err(ApiError::Forbidden(format!(
            "subscription is {}; AI features are unavailable",
            subscription.status
        )));
    }

    // Atomic reserve: -1 rejects with 403, an exhausted cap with 429
    let reservation = state.billing.quota.reserve(user.user_id, feature).await?;

    let analysis = state.ai.analyze(feature, transcript).await?;

    state
        .billing
        .usage
        .record(
            user.user_id,
            feature,
            analysis.total_tokens(),
            analysis.cost_cents,
        )
        .await?;

    Ok(Json(AnalyzeResponse {
        feature,
        tokens: analysis.total_tokens(),
        result: analysis.text,
        usage_after: reservation.usage_after,
        limit: reservation.limit,
    }))
}
