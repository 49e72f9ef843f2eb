//! Application state

use std::sync::Arc;

use praxis_billing::BillingService;
use sqlx::PgPool;

use crate::ai::AnalysisClient;
use crate::auth::AuthState;
use crate::calendar::CalendarClient;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
    pub ai: AnalysisClient,
    /// Calendar sync client (None when not configured)
    pub calendar: Option<CalendarClient>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = Arc::new(BillingService::new(
            pool.clone(),
            config.provider_webhook_secret.clone(),
        ));

        let ai = AnalysisClient::new(config.ai_api_key.clone(), config.ai_model.clone());
        if ai.is_enabled() {
            tracing::info!(model = %config.ai_model, "AI analysis client initialized");
        } else {
            tracing::warn!("AI analysis not configured (missing AI_API_KEY)");
        }

        let calendar =
            CalendarClient::from_config(&config.calendar_api_url, &config.calendar_api_token);
        if calendar.is_some() {
            tracing::info!("Calendar sync enabled");
        } else {
            tracing::warn!("Calendar sync not configured (missing CALENDAR_API_URL or token)");
        }

        Self {
            pool,
            config,
            billing,
            ai,
            calendar,
        }
    }

    /// Auth state for the session middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            pool: self.pool.clone(),
            cookie_name: self.config.session_cookie_name.clone(),
        }
    }
}
