//! Login, logout, and the current-user endpoint

use axum::extract::State;
use axum::http::header::{HeaderMap, COOKIE, SET_COOKIE};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub subscription_tier: String,
}

#[derive(Debug, sqlx::FromRow)]
struct LoginRow {
    id: Uuid,
    password_hash: String,
}

/// Verify credentials and set the session cookie
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let row: Option<LoginRow> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE email = $1")
            .bind(request.email.trim().to_lowercase())
            .fetch_optional(&state.pool)
            .await?;

    // Same failure path for unknown email and wrong password
    let valid = row
        .as_ref()
        .map(|r| auth::verify_password(&request.password, &r.password_hash))
        .unwrap_or(false);

    let Some(row) = row.filter(|_| valid) else {
        tracing::info!("Failed login attempt");
        return Err(ApiError::Unauthorized);
    };

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let session = auth::create_session(
        &state.pool,
        row.id,
        state.config.session_ttl_hours,
        None,
        user_agent,
    )
    .await?;

    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(row.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %row.id, "User logged in");

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        state.config.session_cookie_name,
        session.token,
        state.config.session_ttl_hours * 3600,
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::Internal(format!("invalid cookie value: {}", e)))?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    Ok((
        response_headers,
        Json(serde_json::json!({ "user_id": row.id })),
    ))
}

/// Revoke the current session and clear the cookie
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let cookie_name = &state.config.session_cookie_name;
    let prefix = format!("{}=", cookie_name);
    let token = headers
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|c| c.strip_prefix(prefix.as_str()))
                .map(str::to_string)
        });

    if let Some(token) = token {
        auth::revoke_session(&state.pool, &token).await?;
    }

    let clear = format!("{}=; Path=/; HttpOnly; Max-Age=0", cookie_name);
    let clear = HeaderValue::from_str(&clear)
        .map_err(|e| ApiError::Internal(format!("invalid cookie value: {}", e)))?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, clear);

    Ok((response_headers, Json(serde_json::json!({ "ok": true }))))
}

/// Current user, as resolved by the session middleware
pub async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.user_id,
        role: if user.is_admin() {
            "admin".to_string()
        } else {
            "therapist".to_string()
        },
        subscription_tier: user.tier.to_string(),
        email: user.email,
        display_name: user.display_name,
    })
}
