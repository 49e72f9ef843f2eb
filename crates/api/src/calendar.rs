//! Best-effort calendar sync
//!
//! Pushes appointment changes to an external calendar API when configured.
//! Sync failures are logged and never fail the originating request; the
//! session row keeps the last synced event id so updates and deletes can
//! target it.

use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Calendar event payload for one therapy session
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub session_id: Uuid,
    pub title: String,
    pub starts_at: OffsetDateTime,
    pub duration_minutes: i32,
}

#[derive(Debug, Deserialize)]
struct CreateEventResponse {
    id: String,
}

/// Client for the external calendar API
#[derive(Clone)]
pub struct CalendarClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CalendarClient {
    /// Returns `None` when the calendar integration is not configured
    pub fn from_config(base_url: &str, token: &str) -> Option<Self> {
        if base_url.is_empty() || token.is_empty() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Create or update the calendar event for a session.
    ///
    /// Returns the provider event id on success, `None` on any failure.
    pub async fn push_event(
        &self,
        event: &CalendarEvent,
        existing_event_id: Option<&str>,
    ) -> Option<String> {
        let body = serde_json::json!({
            "title": event.title,
            "starts_at": event.starts_at.unix_timestamp(),
            "duration_minutes": event.duration_minutes,
            "external_ref": event.session_id,
        });

        let request = match existing_event_id {
            Some(id) => self
                .client
                .put(format!("{}/v1/events/{}", self.base_url, id)),
            None => self.client.post(format!("{}/v1/events", self.base_url)),
        };

        let response = request.bearer_auth(&self.token).json(&body).send().await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                if let Some(id) = existing_event_id {
                    return Some(id.to_string());
                }
                match resp.json::<CreateEventResponse>().await {
                    Ok(created) => Some(created.id),
                    Err(e) => {
                        tracing::warn!(error = %e, "Calendar response parse failed");
                        None
                    }
                }
            }
            Ok(resp) => {
                tracing::warn!(
                    session_id = %event.session_id,
                    status = %resp.status(),
                    "Calendar sync rejected"
                );
                None
            }
            Err(e) => {
                tracing::warn!(session_id = %event.session_id, error = %e, "Calendar sync failed");
                None
            }
        }
    }

    /// Delete the calendar event for a cancelled session, best effort
    pub async fn delete_event(&self, event_id: &str) {
        let result = self
            .client
            .delete(format!("{}/v1/events/{}", self.base_url, event_id))
            .bearer_auth(&self.token)
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(event_id = event_id, error = %e, "Calendar event delete failed");
        }
    }
}
