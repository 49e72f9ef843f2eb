//! Session-cookie authentication
//!
//! Login verifies the argon2 password hash and mints an opaque random
//! token; only the token's SHA-256 is stored. Middleware resolves the
//! cookie back to an [`AuthUser`], and admin routes layer an additional
//! role gate on top.

mod middleware;
mod password;
mod sessions;

pub use middleware::{require_admin, require_auth, AuthState, AuthUser};
pub use password::{hash_password, verify_password};
pub use sessions::{create_session, revoke_session, token_hash, SessionToken};
