// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! foliochat - Portfolio assistant chat service library
//!
//! Backs the AI assistant widget of a personal portfolio website with a
//! single rate-limited, cached chat endpoint in front of the Gemini API.
//!
//! # Core Modules
//!
//! - [`server`] - HTTP server, request orchestration, and the chat endpoint
//! - [`ratelimit`] - Per-client fixed-window rate limiting with periodic sweep
//! - [`cache`] - Bounded reply cache with TTL and insertion-order eviction
//! - [`sanitize`] - Untrusted input sanitization and history validation
//! - [`persona`] - Assistant persona and conversation context assembly
//! - [`upstream`] - Gemini generateContent client
//! - [`utils`] - Shared helpers (secret masking)

pub mod cache;
pub mod persona;
pub mod ratelimit;
pub mod sanitize;
pub mod server;
pub mod upstream;
pub mod utils;

// Re-export commonly used types
pub use cache::ReplyCache;
pub use ratelimit::RateLimiter;
pub use sanitize::{Turn, TurnRole};
pub use server::{AppState, Server};
pub use upstream::{Content, GeminiClient, GeminiError};
pub use utils::mask_sensitive;
