// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Input sanitization and history validation
//!
//! Everything arriving on the chat endpoint is untrusted: the message text,
//! and the optional conversation history the browser widget replays back.
//! This module normalizes both into bounded, tag-free text before anything
//! reaches the cache or the upstream API.
//!
//! Tag stripping is a naive `<...>` regex pass, not an HTML parser. It cannot
//! handle nested or malformed markup; that is the accepted contract for this
//! input (short chat messages), not a parsing guarantee.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length of a single message, in characters. Longer input is
/// truncated, not rejected.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Maximum number of history turns kept per request (most recent wins).
pub const MAX_HISTORY_TURNS: usize = 20;

/// HTML-tag-like substrings: everything from `<` to the next `>`.
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// ASCII control characters, except tab, newline, and carriage return.
static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F]").expect("valid control regex"));

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single validated conversation turn.
///
/// Constructed fresh per request from caller-supplied history; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

/// Strip tag-like substrings and control characters, then trim whitespace.
pub fn sanitize_text(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, "");
    let stripped = CONTROL_RE.replace_all(&stripped, "");
    stripped.trim().to_string()
}

/// Sanitize a message and cap it at [`MAX_MESSAGE_LEN`] characters.
///
/// An empty result means the input had no usable content; callers reject the
/// request in that case.
pub fn clean_message(text: &str) -> String {
    truncate_chars(&sanitize_text(text), MAX_MESSAGE_LEN)
}

/// Validate an arbitrary JSON value as a conversation history.
///
/// Anything that is not an array yields an empty history. Array elements
/// survive only if they are objects with a `role` of exactly `"user"` or
/// `"assistant"` and a string `text`. The last [`MAX_HISTORY_TURNS`]
/// survivors are kept (filtering happens first, then truncation), and each
/// surviving text is sanitized and capped like the primary message.
pub fn validate_history(raw: Option<&Value>) -> Vec<Turn> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };

    let valid: Vec<(TurnRole, &str)> = items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let role = match obj.get("role")?.as_str()? {
                "user" => TurnRole::User,
                "assistant" => TurnRole::Assistant,
                _ => return None,
            };
            let text = obj.get("text")?.as_str()?;
            Some((role, text))
        })
        .collect();

    let skip = valid.len().saturating_sub(MAX_HISTORY_TURNS);
    valid
        .into_iter()
        .skip(skip)
        .map(|(role, text)| Turn {
            role,
            text: clean_message(text),
        })
        .collect()
}

/// Truncate to at most `max` characters (not bytes), preserving char boundaries.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
