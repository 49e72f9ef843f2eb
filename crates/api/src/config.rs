//! Environment-variable configuration

/// Application configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Postgres connection URL (pooler-compatible)
    pub database_url: String,
    /// Comma-separated CORS origin allowlist
    pub allowed_origins: Vec<String>,
    /// Session cookie name
    pub session_cookie_name: String,
    /// Session lifetime in hours
    pub session_ttl_hours: i64,
    /// Shared secret for verifying provider webhook signatures
    pub provider_webhook_secret: String,
    /// API key for the generative text API (empty disables AI features)
    pub ai_api_key: String,
    /// Model id used for transcript analysis
    pub ai_model: String,
    /// Base URL of the calendar sync API (empty disables sync)
    pub calendar_api_url: String,
    /// Bearer token for the calendar sync API
    pub calendar_api_token: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only `DATABASE_URL` and `PROVIDER_WEBHOOK_SECRET` are required;
    /// everything else has a development-friendly default.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let provider_webhook_secret = std::env::var("PROVIDER_WEBHOOK_SECRET")
            .map_err(|_| anyhow::anyhow!("PROVIDER_WEBHOOK_SECRET must be set"))?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url,
            allowed_origins,
            session_cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "praxis_session".to_string()),
            session_ttl_hours: std::env::var("SESSION_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(72),
            provider_webhook_secret,
            ai_api_key: std::env::var("AI_API_KEY").unwrap_or_default(),
            ai_model: std::env::var("AI_MODEL").unwrap_or_else(|_| "claude-opus-5".to_string()),
            calendar_api_url: std::env::var("CALENDAR_API_URL").unwrap_or_default(),
            calendar_api_token: std::env::var("CALENDAR_API_TOKEN").unwrap_or_default(),
        })
    }
}
