//! Router configuration

pub mod admin;
pub mod analysis;
pub mod auth;
pub mod clients;
pub mod health;
pub mod notes;
pub mod payments;
pub mod sessions;
pub mod usage;
pub mod webhooks;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;

use crate::auth::{require_admin, require_auth};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /api/health` — liveness + database ping
/// - `POST /api/auth/login` — session login
/// - `POST /api/webhooks/billing` — provider webhook (signature-verified)
///
/// ## Authenticated (session cookie)
/// - Auth: `POST /api/auth/logout`, `GET /api/auth/me`
/// - Clients: `GET/POST /api/clients`, `GET/PATCH/DELETE /api/clients/{id}`
/// - Sessions: `GET/POST /api/sessions`, `GET/PATCH/DELETE /api/sessions/{id}`
/// - Notes: `GET/POST /api/sessions/{id}/notes`, `PATCH/DELETE /api/notes/{id}`
/// - Payments: `GET /api/clients/{id}/payments`, `POST /api/sessions/{id}/bill`,
///   `POST /api/clients/{id}/bulk-payment`, `POST /api/payments/{id}/apply-credit`
/// - Usage: `GET /api/usage`, `GET /api/billing/subscription`
/// - AI: `POST /api/analysis/{feature}`
///
/// ## Admin (role-gated)
/// - Users, tier limits, alerts, webhook replay, invariants, usage summaries
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let public = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/webhooks/billing", post(webhooks::provider_webhook));

    let authenticated = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        // Clients
        .route("/api/clients", get(clients::list).post(clients::create))
        .route(
            "/api/clients/{id}",
            get(clients::get_one)
                .patch(clients::update)
                .delete(clients::archive),
        )
        // Scheduling
        .route("/api/sessions", get(sessions::list).post(sessions::create))
        .route(
            "/api/sessions/{id}",
            get(sessions::get_one)
                .patch(sessions::update)
                .delete(sessions::cancel),
        )
        // Session notes
        .route(
            "/api/sessions/{id}/notes",
            get(notes::list_for_session).post(notes::create),
        )
        .route("/api/notes/{id}", patch(notes::update).delete(notes::delete))
        // Payments
        .route("/api/clients/{id}/payments", get(payments::list_for_client))
        .route("/api/sessions/{id}/bill", post(payments::bill_session))
        .route(
            "/api/clients/{id}/bulk-payment",
            post(payments::bulk_payment),
        )
        .route(
            "/api/payments/{id}/apply-credit",
            post(payments::apply_credit),
        )
        // Usage and subscription
        .route("/api/usage", get(usage::month_usage))
        .route("/api/billing/subscription", get(usage::subscription))
        // AI analysis
        .route("/api/analysis/{feature}", post(analysis::analyze))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    let admin = Router::new()
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}", get(admin::user_detail))
        .route("/api/admin/users/{id}/tier", post(admin::change_tier))
        .route("/api/admin/users/{id}/grant-free", post(admin::grant_free))
        .route("/api/admin/users/{id}/block", post(admin::block_user))
        .route("/api/admin/users/{id}/unblock", post(admin::unblock_user))
        .route("/api/admin/tier-limits", get(admin::list_tier_limits))
        .route(
            "/api/admin/tier-limits/{tier}",
            get(admin::get_tier_limits).put(admin::update_tier_limits),
        )
        .route("/api/admin/alerts", get(admin::list_alerts))
        .route("/api/admin/alerts/{id}/resolve", post(admin::resolve_alert))
        .route("/api/admin/webhooks", get(admin::list_webhook_events))
        .route(
            "/api/admin/webhooks/{event_id}/replay",
            post(admin::replay_webhook),
        )
        .route("/api/admin/invariants", get(admin::run_invariants))
        .route("/api/admin/usage", get(admin::usage_summary))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    public.merge(authenticated).merge(admin).with_state(state)
}
