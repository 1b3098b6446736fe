//! API server
//!
//! Provides the HTTP API backing the portfolio site's assistant widget.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/chat` - Assistant chat turn
//!
//! # Example
//!
//! ```no_run
//! use foliochat::server::Server;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = Server::new(8080);
//! server.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The chat handler runs one request through a strict sequence: rate gate,
//! parse, validate, credential gate, cache lookup, context assembly, a single
//! upstream call, cache store, respond. Every upstream-facing failure is
//! converted into a safe fixed reply; only client input errors and the rate
//! limit surface as non-200 statuses (plus 504 for the upstream timeout).

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::ReplyCache;
use crate::persona;
use crate::ratelimit::RateLimiter;
use crate::sanitize;
use crate::upstream::{GeminiClient, GeminiError};

// Maximum request body size (64KB)
const MAX_BODY_SIZE: usize = 64 * 1024;

// =============================================================================
// Fixed user-facing replies
// =============================================================================

const RATE_LIMITED_REPLY: &str =
    "You're sending too many messages. Please wait a moment before trying again! ⏳";

const NOT_CONFIGURED_REPLY: &str = "⚠️ AI is not configured yet. The site owner needs to add a Gemini API key to enable real AI responses. In the meantime, feel free to explore the portfolio!";

const CONNECT_TROUBLE_REPLY: &str =
    "Sorry, I'm having trouble connecting right now. Please try again in a moment! 🔄";

const NO_REPLY_FALLBACK: &str =
    "I couldn't generate a response. Please try rephrasing your question!";

const TIMEOUT_REPLY: &str = "The AI took too long to respond. Please try again! ⏱️";

const GENERIC_FAILURE_REPLY: &str = "Something went wrong. Please try again!";

// =============================================================================
// State and configuration
// =============================================================================

/// Server state shared across handlers.
pub struct AppState {
    /// Per-client rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// First-turn reply cache.
    pub cache: ReplyCache,
    /// Upstream generation client.
    pub gemini: GeminiClient,
}

impl AppState {
    /// Fresh state around the given upstream client.
    pub fn new(gemini: GeminiClient) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::new()),
            cache: ReplyCache::new(),
            gemini,
        }
    }
}

/// API server configuration.
#[derive(Debug)]
pub struct Server {
    /// Port to listen on.
    port: u16,
    /// API key override; falls back to the environment when unset.
    api_key: Option<String>,
    /// Address to bind to (defaults to 127.0.0.1 for security).
    bind_address: String,
}

impl Server {
    /// Create a new server with the specified port.
    /// By default, binds to 127.0.0.1 (localhost only) for security.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            api_key: None,
            bind_address: "127.0.0.1".to_string(),
        }
    }

    /// Set the Gemini API key explicitly instead of reading the environment.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the bind address.
    /// Use "0.0.0.0" to allow network access, "127.0.0.1" (default) for localhost only.
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    /// Build the shared state from this configuration.
    pub fn build_state(&self) -> Arc<AppState> {
        let gemini = match &self.api_key {
            Some(key) => GeminiClient::with_api_key(key.clone()),
            None => GeminiClient::new(), // Will try GEMINI_API_KEY env var
        };
        Arc::new(AppState::new(gemini))
    }

    /// Build the router with all routes.
    pub fn build_router(&self) -> Router {
        app(self.build_state())
    }

    /// Start the server with graceful shutdown.
    ///
    /// Also spawns the rate-limit sweep so stale client entries are removed
    /// while the process runs.
    pub async fn start(&self) -> Result<()> {
        let state = self.build_state();

        match state.gemini.api_key_masked() {
            Some(masked) => tracing::info!("Gemini upstream configured (key {})", masked),
            None => tracing::warn!(
                "No Gemini API key configured; chat will serve the configuration notice"
            ),
        }

        state.limiter.clone().start_sweep_task();
        let router = app(state);

        let addr = format!("{}:{}", self.bind_address, self.port);
        tracing::info!("Starting server on {}", addr);

        // Security warning if binding to all interfaces
        if self.bind_address == "0.0.0.0" {
            tracing::warn!(
                "Server is binding to 0.0.0.0 which exposes the API to the network. \
                Use 127.0.0.1 (default) for local-only access."
            );
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "Port {} is already in use. Another foliochat instance may be running; \
                    stop it or pick a different port with --port <PORT>",
                    self.port
                )
            } else {
                anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
            }
        })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }

    /// Get the port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Build the router over existing state. Split out from [`Server`] so tests
/// can drive the exact production routes against injected state.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    upstream_configured: bool,
    cache_entries: usize,
}

/// Normal or degraded-but-successful assistant reply.
#[derive(Serialize)]
struct ChatReply {
    reply: String,
}

/// Validation failure surfaced to the caller.
#[derive(Serialize)]
struct ChatRejection {
    error: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        upstream_configured: state.gemini.is_configured(),
        cache_entries: state.cache.len(),
    })
}

/// Assistant chat handler.
///
/// Takes the raw body and parses JSON itself: a malformed body is an
/// unexpected failure (500), not a validation error, and must not be
/// rejected by the framework before reaching this sequencing.
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client_id = client_identifier(&headers);

    if !state.limiter.check(&client_id) {
        tracing::debug!(client = %client_id, "rate limit exceeded");
        return reply(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_REPLY);
    }

    let body: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("failed to parse chat request body: {}", e);
            return reply(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE_REPLY);
        }
    };

    let Some(message) = body.get("message").and_then(Value::as_str) else {
        return rejection("Message is required");
    };

    let clean_message = sanitize::clean_message(message);
    if clean_message.is_empty() {
        return rejection("Message is empty after sanitization");
    }

    let history = sanitize::validate_history(body.get("history"));

    // Missing key is a supported state, not an error
    if !state.gemini.is_configured() {
        return reply(StatusCode::OK, NOT_CONFIGURED_REPLY);
    }

    // The cache key does not encode history, so only first-turn queries may
    // read or write it
    let cache_key = clean_message.to_lowercase();
    if history.is_empty() {
        if let Some(cached) = state.cache.get(&cache_key) {
            tracing::debug!(client = %client_id, "cache hit");
            return reply(StatusCode::OK, &cached);
        }
    }

    let contents = persona::build_conversation(&history, &clean_message);

    match state.gemini.generate(contents).await {
        Ok(Some(text)) => {
            if history.is_empty() {
                state.cache.set(cache_key, text.clone());
            }
            reply(StatusCode::OK, &text)
        }
        Ok(None) => reply(StatusCode::OK, NO_REPLY_FALLBACK),
        Err(GeminiError::Timeout) => {
            tracing::error!("Gemini request timed out");
            reply(StatusCode::GATEWAY_TIMEOUT, TIMEOUT_REPLY)
        }
        Err(GeminiError::Api { status, detail }) => {
            // Upstream detail stays server-side; the caller sees a 200 fallback
            tracing::error!("Gemini API error: HTTP {} - {}", status, detail);
            reply(StatusCode::OK, CONNECT_TROUBLE_REPLY)
        }
        Err(e) => {
            tracing::error!("chat request failed: {}", e);
            reply(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE_REPLY)
        }
    }
}

// =============================================================================
// Utilities
// =============================================================================

/// Best-effort client identifier for rate limiting.
///
/// First forwarded address wins, then the real-ip header, then a shared
/// sentinel. Spoofable by design; this feeds a cost-control heuristic, not
/// authentication.
fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

fn reply(status: StatusCode, text: &str) -> Response {
    (status, Json(ChatReply { reply: text.to_string() })).into_response()
}

fn rejection(text: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ChatRejection { error: text.to_string() }),
    )
        .into_response()
}

/// Graceful shutdown signal handler.
///
/// Waits for SIGINT/SIGTERM on Unix, Ctrl+C elsewhere.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_server_creation() {
        let server = Server::new(3000);
        assert_eq!(server.port(), 3000);
        assert_eq!(server.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_server_with_api_key() {
        let server = Server::new(8080).with_api_key("test-key");
        assert_eq!(server.api_key.as_deref(), Some("test-key"));
    }

    #[test]
    fn forwarded_for_takes_first_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_identifier(&headers), "203.0.113.7");
    }

    #[test]
    fn real_ip_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_identifier(&headers), "10.0.0.2");
    }

    #[test]
    fn missing_headers_yield_sentinel() {
        let headers = HeaderMap::new();
        assert_eq!(client_identifier(&headers), "unknown");
    }

    #[test]
    fn empty_forwarded_value_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  ,10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_identifier(&headers), "10.0.0.2");
    }
}
