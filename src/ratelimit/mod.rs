// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Per-client fixed-window rate limiting
//!
//! Tracks request counts per client identifier within a fixed window that is
//! reset wholesale on expiry, not rolled. A periodic sweep task removes
//! expired entries so memory stays bounded for a long-running process no
//! matter how many distinct clients are ever seen.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use foliochat::ratelimit::RateLimiter;
//!
//! let limiter = Arc::new(RateLimiter::new());
//! assert!(limiter.check("203.0.113.7"));
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Accounting window per client.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Maximum allowed requests per client per window.
pub const MAX_PER_WINDOW: u32 = 10;

/// How often the background sweep removes expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Request accounting for one client in the current window.
#[derive(Debug)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window rate limiter keyed by client identifier.
///
/// The map is shared by every concurrent request; the check-then-increment
/// sequence must stay atomic, so it runs under a mutex.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, WindowEntry>>,
    window: Duration,
    max_per_window: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Create a limiter with the default window and per-window budget.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window: WINDOW,
            max_per_window: MAX_PER_WINDOW,
        }
    }

    /// Override the window length. Only intended for tests that need to
    /// verify expiry without waiting out the real window.
    #[cfg(test)]
    fn with_window(window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
            max_per_window: MAX_PER_WINDOW,
        }
    }

    /// Record a request from `client_id` and report whether it is allowed.
    ///
    /// A fresh or expired window starts a new entry at count 1. Otherwise the
    /// count is incremented in place and the request is allowed while the
    /// count stays within budget. Denial does not reset the counter: a client
    /// that keeps hammering while blocked keeps incrementing until its window
    /// rolls over.
    pub fn check(&self, client_id: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get_mut(client_id) {
            Some(entry) if now <= entry.reset_at => {
                entry.count += 1;
                entry.count <= self.max_per_window
            }
            _ => {
                entries.insert(
                    client_id.to_string(),
                    WindowEntry {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    /// Remove all entries whose window has expired. Returns how many were
    /// removed.
    ///
    /// Expired keys are collected first and then removed one at a time, each
    /// under its own short lock acquisition with the expiry re-checked, so
    /// the sweep never holds the map across its whole run.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();

        let expired: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, entry)| now > entry.reset_at)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            let mut entries = self.lock();
            if entries.get(&key).is_some_and(|entry| now > entry.reset_at) {
                entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Spawn the periodic sweep as a detached background task.
    ///
    /// Returns the `JoinHandle` so callers can abort the task during shutdown.
    pub fn start_sweep_task(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SWEEP_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    tracing::debug!("swept {} expired rate-limit entries", removed);
                }
            }
        })
    }

    /// Number of clients currently tracked (expired entries included until
    /// swept).
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
