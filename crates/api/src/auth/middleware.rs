//! Authentication middleware for Axum

use axum::extract::{Request, State};
use axum::http::header::COOKIE;
use axum::middleware::Next;
use axum::response::Response;
use praxis_shared::{SubscriptionTier, UserRole};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::sessions::token_hash;
use crate::error::ApiError;

/// Authenticated user information resolved from the session cookie
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub tier: SubscriptionTier,
    /// Session row backing this request, for audit trails
    pub session_id: Uuid,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub pool: PgPool,
    pub cookie_name: String,
}

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Uuid,
    email: String,
    display_name: String,
    role: UserRole,
    subscription_tier: SubscriptionTier,
    blocked_at: Option<OffsetDateTime>,
}

/// Extract the session token from the cookie header
fn extract_token(request: &Request, cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    request
        .headers()
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
                .map(str::to_string)
        })
}

async fn resolve_session(pool: &PgPool, token: &str) -> Result<Option<SessionRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT s.id AS session_id, u.id AS user_id, u.email, u.display_name,
               u.role, u.subscription_tier, u.blocked_at
        FROM user_sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = $1
          AND s.revoked_at IS NULL
          AND s.expires_at > NOW()
        "#,
    )
    .bind(token_hash(token))
    .fetch_optional(pool)
    .await
}

/// Require a valid session cookie; inserts [`AuthUser`] as an extension.
///
/// Blocked users resolve but are refused on every authenticated route, so
/// an admin block takes effect without waiting for sessions to expire.
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&request, &auth.cookie_name).ok_or(ApiError::Unauthorized)?;

    let session = resolve_session(&auth.pool, &token)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::Unauthorized)?;

    if session.blocked_at.is_some() {
        tracing::warn!(user_id = %session.user_id, "Blocked user attempted access");
        return Err(ApiError::Forbidden(
            "account blocked; contact support".to_string(),
        ));
    }

    request.extensions_mut().insert(AuthUser {
        user_id: session.user_id,
        email: session.email,
        display_name: session.display_name,
        role: session.role,
        tier: session.subscription_tier,
        session_id: session.session_id,
    });

    Ok(next.run(request).await)
}

/// Require the admin role on top of `require_auth`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(ApiError::Unauthorized)?;

    if !user.is_admin() {
        tracing::warn!(user_id = %user.user_id, "Non-admin attempted admin route");
        return Err(ApiError::Forbidden("admin role required".to_string()));
    }

    Ok(next.run(request).await)
}
