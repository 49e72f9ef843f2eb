//! Billing email notifications
//!
//! Optional: without `RESEND_API_KEY` the service logs and no-ops, so every
//! caller can send unconditionally. Template internals are deliberately
//! minimal; the interesting part is when notices fire, not how they look.

use crate::error::{BillingError, BillingResult};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Sends billing notices through a Resend-compatible HTTP API
#[derive(Clone)]
pub struct BillingEmailService {
    client: reqwest::Client,
    api_key: Option<String>,
    from_address: String,
}

impl BillingEmailService {
    /// Build from `RESEND_API_KEY` / `EMAIL_FROM`; disabled when unset
    pub fn from_env() -> Self {
        let api_key = std::env::var("RESEND_API_KEY").ok().filter(|k| !k.is_empty());
        let from_address = std::env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "Praxis <billing@praxishealth.app>".to_string());

        Self {
            client: reqwest::Client::new(),
            api_key,
            from_address,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn send_payment_failed(&self, to: &str, display_name: &str) -> BillingResult<()> {
        self.send(
            to,
            "Payment failed for your Praxis subscription",
            &format!(
                "<p>Hi {display_name},</p>\
                 <p>Your latest subscription payment failed. Please update your payment \
                 method to keep AI features available.</p>",
            ),
        )
        .await
    }

    pub async fn send_trial_ending(
        &self,
        to: &str,
        display_name: &str,
        days_left: i64,
    ) -> BillingResult<()> {
        self.send(
            to,
            "Your Praxis trial is ending soon",
            &format!(
                "<p>Hi {display_name},</p>\
                 <p>Your trial ends in {days_left} day(s). Subscribe to keep your \
                 practice tools running without interruption.</p>",
            ),
        )
        .await
    }

    pub async fn send_appointment_reminder(
        &self,
        to: &str,
        client_name: &str,
        scheduled_at: &str,
    ) -> BillingResult<()> {
        self.send(
            to,
            "Upcoming session tomorrow",
            &format!(
                "<p>Reminder: session with {client_name} scheduled at {scheduled_at}.</p>",
            ),
        )
        .await
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> BillingResult<()> {
        let Some(api_key) = &self.api_key else {
            tracing::debug!(to = to, subject = subject, "Email disabled, skipping send");
            return Ok(());
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "from": self.from_address,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .map_err(|e| BillingError::EmailDelivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::EmailDelivery(format!(
                "status {}: {}",
                status, body
            )));
        }

        tracing::info!(to = to, subject = subject, "Billing email sent");
        Ok(())
    }
}
