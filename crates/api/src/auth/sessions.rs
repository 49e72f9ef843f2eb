//! User session management
//!
//! Sessions are opaque 256-bit tokens handed out in an HttpOnly cookie.
//! Only the SHA-256 of the token is stored, so a database leak does not
//! leak usable cookies.

use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::ApiResult;

/// Maximum concurrent sessions per user; the oldest is revoked beyond this
const MAX_SESSIONS_PER_USER: i64 = 10;

/// A freshly minted session token (the only place the raw token exists)
#[derive(Debug)]
pub struct SessionToken {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// SHA-256 hex digest of a session token
pub fn token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Mint a session for a user, enforcing the max-sessions limit
pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_hours: i64,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> ApiResult<SessionToken> {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    let expires_at = OffsetDateTime::now_utc() + Duration::hours(ttl_hours);

    let mut tx = pool.begin().await?;

    let session_count: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM user_sessions
        WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if session_count.0 >= MAX_SESSIONS_PER_USER {
        tracing::info!(
            user_id = %user_id,
            current_sessions = session_count.0,
            "Revoking oldest session due to max sessions limit"
        );

        sqlx::query(
            r#"
            UPDATE user_sessions
            SET revoked_at = NOW()
            WHERE id IN (
                SELECT id FROM user_sessions
                WHERE user_id = $1 AND revoked_at IS NULL
                ORDER BY created_at ASC
                LIMIT 1
            )
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    let session_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO user_sessions (id, user_id, token_hash, expires_at, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash(&token))
    .bind(expires_at)
    .bind(ip_address)
    .bind(user_agent)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(SessionToken {
        token,
        session_id,
        expires_at,
    })
}

/// Revoke the session matching a raw cookie token (logout)
pub async fn revoke_session(pool: &PgPool, token: &str) -> ApiResult<()> {
    sqlx::query(
        "UPDATE user_sessions SET revoked_at = NOW() WHERE token_hash = $1 AND revoked_at IS NULL",
    )
    .bind(token_hash(token))
    .execute(pool)
    .await?;
    Ok(())
}
