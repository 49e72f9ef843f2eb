//! Payment-provider webhook endpoint
//!
//! Signature failures are a 400 so the provider surfaces a delivery
//! error. Handler failures return 200: the event is recorded as failed
//! with an admin alert for manual follow-up, and the provider must not
//! retry on its own (spec'd behavior — replay is admin-driven).

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use praxis_billing::WebhookOutcome;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: WebhookOutcome,
}

pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get("provider-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing provider-signature header".to_string()))?;

    let event = state.billing.webhooks.verify_event(&body, signature)?;
    let outcome = state.billing.webhooks.handle_event(event).await?;

    if let WebhookOutcome::Failed { error } = &outcome {
        tracing::error!(error = %error, "Webhook recorded as failed; admin alert raised");
    }

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
