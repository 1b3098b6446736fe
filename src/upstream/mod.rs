// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Gemini integration
//!
//! Provides text generation through the Google Gemini `generateContent` API.
//! A missing API key is a supported state, not an error: callers ask
//! [`GeminiClient::is_configured`] before generating and degrade gracefully.
//!
//! Each generation is a single attempt under a hard timeout. There is no
//! retry or backoff here; a failed call is reported to the caller, which
//! substitutes a fallback reply instead of trying again.
//!
//! # Example
//!
//! ```no_run
//! use foliochat::upstream::{Content, GeminiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GeminiClient::with_api_key("AIza...");
//! let reply = client.generate(vec![Content::user("Hello!")]).await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::mask_sensitive;

/// Default Gemini API endpoint.
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Model used for assistant replies.
const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Hard bound on the whole upstream call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Generation configuration, fixed for every request.
const MAX_OUTPUT_TOKENS: u32 = 250;
const TEMPERATURE: f32 = 0.7;

/// Error types specific to Gemini operations.
#[derive(Debug, Clone)]
pub enum GeminiError {
    /// API key not configured.
    NotConfigured,
    /// The call exceeded the request timeout.
    Timeout,
    /// Non-success HTTP response from the API.
    Api { status: u16, detail: String },
    /// Connection-level failure.
    Network(String),
    /// Success status but an unreadable payload.
    Decode(String),
}

impl std::fmt::Display for GeminiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "Gemini API key is not configured"),
            Self::Timeout => write!(f, "Gemini request timed out"),
            Self::Api { status, detail } => {
                write!(f, "Gemini API error: HTTP {} - {}", status, detail)
            }
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Decode(msg) => write!(f, "Failed to decode Gemini response: {}", msg),
        }
    }
}

impl std::error::Error for GeminiError {}

// =============================================================================
// Wire format
// =============================================================================

/// One turn of the conversation as the API expects it.
///
/// Gemini's role vocabulary is `"user"` / `"model"`; assistant turns are
/// mapped to `"model"` by the constructors.
#[derive(Debug, Clone, Serialize)]
pub struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part { text: text.into() }],
        }
    }

    /// Role string as sent on the wire.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Text of the first part, if any.
    pub fn text(&self) -> Option<&str> {
        self.parts.first().map(|p| p.text.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// Any missing level below `candidates` means "no reply", not a decode error.
#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

// =============================================================================
// Client
// =============================================================================

/// Client for the Gemini generateContent API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    /// API key for authentication. `None` means unconfigured.
    api_key: Option<String>,
    /// Base URL for the API.
    base_url: String,
    /// HTTP client.
    client: reqwest::Client,
    /// Request timeout.
    timeout: Duration,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiClient {
    /// Create a client, reading the API key from the `GEMINI_API_KEY`
    /// environment variable if present.
    pub fn new() -> Self {
        let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        Self::with_api_key_option(api_key)
    }

    /// Create a client with a specific API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::with_api_key_option(Some(api_key.into()))
    }

    /// Create a client with no API key, regardless of the environment.
    pub fn unconfigured() -> Self {
        Self::with_api_key_option(None)
    }

    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built, which indicates a broken
    /// TLS stack. Acceptable for initialization code.
    fn with_api_key_option(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client for Gemini (TLS/SSL failure)");

        Self {
            api_key,
            base_url: DEFAULT_GEMINI_URL.to_string(),
            client,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Point the client at a different base URL (mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check whether the client has an API key.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Get the API key for display purposes, masked.
    pub fn api_key_masked(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| mask_sensitive(k, 6))
    }

    /// Run one generation over the given conversation.
    ///
    /// Returns `Ok(Some(text))` for the first candidate's first part,
    /// `Ok(None)` when the payload carries no extractable text, and an error
    /// for timeout, transport, HTTP, or decode failures. The URL embeds the
    /// credential, so it is never logged.
    pub async fn generate(&self, contents: Vec<Content>) -> Result<Option<String>, GeminiError> {
        let api_key = self.api_key.as_ref().ok_or(GeminiError::NotConfigured)?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            GEMINI_MODEL,
            api_key
        );

        let body = GenerateRequest {
            contents,
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeminiError::Timeout
                } else {
                    GeminiError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let payload: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GeminiError::Timeout
            } else {
                GeminiError::Decode(e.to_string())
            }
        })?;

        Ok(payload
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

    fn hello() -> Vec<Content> {
        vec![Content::user("Say hello")]
    }

    #[test]
    fn content_constructors_set_roles() {
        let user = Content::user("hi");
        assert_eq!(user.role(), "user");
        assert_eq!(user.text(), Some("hi"));

        let model = Content::model("hello");
        assert_eq!(model.role(), "model");
    }

    #[test]
    fn unconfigured_client_reports_no_key() {
        let client = GeminiClient::unconfigured();
        assert!(!client.is_configured());
        assert_eq!(client.api_key_masked(), None);
    }

    #[test]
    fn api_key_is_masked_for_display() {
        let client = GeminiClient::with_api_key("AIzaSy-super-secret");
        assert_eq!(client.api_key_masked().as_deref(), Some("AIzaSy..."));
    }

    #[tokio::test]
    async fn generate_without_key_fails_fast() {
        let err = GeminiClient::unconfigured().generate(hello()).await.unwrap_err();
        assert!(matches!(err, GeminiError::NotConfigured));
    }

    #[tokio::test]
    async fn generate_extracts_first_candidate_first_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [
                        { "text": "Hello from Gemini" },
                        { "text": "second part ignored" }
                    ]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key("test-key").with_base_url(server.uri());
        let reply = client.generate(hello()).await.unwrap();
        assert_eq!(reply.as_deref(), Some("Hello from Gemini"));
    }

    #[tokio::test]
    async fn empty_candidates_yield_no_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key("test-key").with_base_url(server.uri());
        assert_eq!(client.generate(hello()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_content_level_yields_no_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "candidates": [{ "finishReason": "SAFETY" }] })),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key("test-key").with_base_url(server.uri());
        assert_eq!(client.generate(hello()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_success_status_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": 400, "message": "Invalid API key" }
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key("bad-key").with_base_url(server.uri());
        let err = client.generate(hello()).await.unwrap_err();
        match err {
            GeminiError::Api { status, detail } => {
                assert_eq!(status, 400);
                assert!(detail.contains("Invalid API key"));
            }
            other => panic!("expected Api error, got {other}"),
        }
    }

    #[tokio::test]
    async fn slow_upstream_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "candidates": [] }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key("test-key")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_millis(50));

        let err = client.generate(hello()).await.unwrap_err();
        assert!(matches!(err, GeminiError::Timeout));
    }

    #[tokio::test]
    async fn request_carries_generation_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::with_api_key("test-key").with_base_url(server.uri());
        client.generate(hello()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 250);
        assert_eq!(body["generationConfig"]["temperature"], 0.7);
        assert_eq!(body["contents"][0]["role"], "user");
    }
}
