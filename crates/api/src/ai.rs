//! Generative text API client for transcript analysis
//!
//! Thin reqwest wrapper over the Anthropic Messages endpoint. Transient
//! failures (429/5xx, connection errors) retry with exponential backoff;
//! anything else surfaces to the caller. The returned token counts feed
//! the monthly usage aggregates.

use praxis_shared::AiFeature;
use serde::Deserialize;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::error::{ApiError, ApiResult};

const DEFAULT_API_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 16000;

/// Input/output price per million tokens, in cents
const INPUT_COST_CENTS_PER_MTOK: i64 = 500;
const OUTPUT_COST_CENTS_PER_MTOK: i64 = 2_500;

/// Result of one analysis call
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub text: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// Estimated cost in cents at list pricing
    pub cost_cents: i64,
}

impl AnalysisResult {
    pub fn total_tokens(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: i64,
    output_tokens: i64,
}

#[derive(Debug)]
enum CallError {
    Transient(String),
    Fatal(ApiError),
}

/// Client for the generative text API
#[derive(Clone)]
pub struct AnalysisClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnalysisClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_API_URL.to_string(),
            api_key,
            model,
        }
    }

    /// Test constructor pointing at a mock server
    #[cfg(test)]
    pub fn with_base_url(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Run one AI feature over a session transcript
    pub async fn analyze(&self, feature: AiFeature, transcript: &str) -> ApiResult<AnalysisResult> {
        if !self.is_enabled() {
            return Err(ApiError::ExternalService(
                "AI analysis is not configured".to_string(),
            ));
        }

        let strategy = ExponentialBackoff::from_millis(500).map(jitter).take(3);

        RetryIf::spawn(
            strategy,
            || self.call_once(feature, transcript),
            |e: &CallError| matches!(e, CallError::Transient(_)),
        )
        .await
        .map_err(|e| match e {
            CallError::Transient(msg) => ApiError::ExternalService(msg),
            CallError::Fatal(err) => err,
        })
    }

    async fn call_once(
        &self,
        feature: AiFeature,
        transcript: &str,
    ) -> Result<AnalysisResult, CallError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "system": system_prompt(feature),
            "messages": [{"role": "user", "content": transcript}],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transient(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CallError::Transient(format!(
                "text API returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CallError::Fatal(ApiError::ExternalService(format!(
                "text API returned {}: {}",
                status, detail
            ))));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CallError::Fatal(ApiError::ExternalService(e.to_string())))?;

        let text = parsed
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let cost_cents = estimate_cost_cents(parsed.usage.input_tokens, parsed.usage.output_tokens);

        tracing::info!(
            feature = %feature,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            cost_cents = cost_cents,
            "Transcript analysis complete"
        );

        Ok(AnalysisResult {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            cost_cents,
        })
    }
}

/// Estimated list-price cost, rounded up to the next cent
fn estimate_cost_cents(input_tokens: i64, output_tokens: i64) -> i64 {
    let raw = input_tokens * INPUT_COST_CENTS_PER_MTOK + output_tokens * OUTPUT_COST_CENTS_PER_MTOK;
    (raw as u64).div_ceil(1_000_000) as i64
}

fn system_prompt(feature: AiFeature) -> &'static str {
    match feature {
        AiFeature::SessionAnalysis => {
            "You are a clinical assistant. Analyze the therapy session transcript: \
             key themes, client affect, notable shifts, and points to revisit. \
             Be factual and cite the transcript; do not diagnose."
        }
        AiFeature::TranscriptSummary => {
            "Summarize the therapy session transcript in concise clinical language. \
             Cover presenting concerns, interventions used, and client response."
        }
        AiFeature::TreatmentPlan => {
            "Draft treatment plan suggestions grounded in the session transcript: \
             goals, proposed interventions, and measurable outcomes. Mark every \
             suggestion as a draft for clinician review."
        }
        AiFeature::ProgressReport => {
            "Write a progress report from the session transcript, comparing against \
             any stated goals. Neutral clinical register, no speculation."
        }
        AiFeature::RiskAssessment => {
            "Review the transcript for risk indicators (self-harm, harm to others, \
             acute crisis). Quote the relevant passages verbatim and flag severity. \
             This output supports, never replaces, clinician judgment."
        }
        AiFeature::NoteAssist => {
            "Turn the transcript into a structured SOAP note draft for the \
             clinician to edit."
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn parses_text_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "content": [{"type": "text", "text": "Summary of the session."}],
                    "usage": {"input_tokens": 1200, "output_tokens": 300}
                }"#,
            )
            .create_async()
            .await;

        let client = AnalysisClient::with_base_url(
            server.url(),
            "test-key".to_string(),
            "claude-opus-5".to_string(),
        );
        let result = client
            .analyze(AiFeature::TranscriptSummary, "transcript text")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.text, "Summary of the session.");
        assert_eq!(result.total_tokens(), 1500);
        assert!(result.cost_cents >= 1);
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(400)
            .with_body(r#"{"error": "bad request"}"#)
            .create_async()
            .await;

        let client = AnalysisClient::with_base_url(
            server.url(),
            "test-key".to_string(),
            "claude-opus-5".to_string(),
        );
        let result = client.analyze(AiFeature::NoteAssist, "transcript").await;
        assert!(matches!(result, Err(ApiError::ExternalService(_))));
    }

    #[test]
    fn cost_rounds_up_to_a_cent() {
        assert_eq!(estimate_cost_cents(0, 0), 0);
        assert_eq!(estimate_cost_cents(1, 0), 1);
        assert_eq!(estimate_cost_cents(1_000_000, 0), 500);
        assert_eq!(estimate_cost_cents(0, 1_000_000), 2_500);
    }
}
