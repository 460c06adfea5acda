//! Fixed-window admission per endpoint.

use crate::gateway::domain::{EndpointId, RateLimitPolicy};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: Instant,
    admitted: u32,
}

/// Counts invocations per endpoint within fixed windows.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<EndpointId, Window>>,
}

impl RateLimiter {
    /// Creates a limiter with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits one invocation when the current window has budget left.
    ///
    /// A poisoned lock admits the call rather than rejecting traffic.
    pub fn try_admit(&self, endpoint_id: EndpointId, policy: RateLimitPolicy) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            return true;
        };
        let now = Instant::now();
        let window = windows.entry(endpoint_id).or_insert(Window {
            opened_at: now,
            admitted: 0,
        });
        if now.duration_since(window.opened_at) >= policy.window() {
            *window = Window {
                opened_at: now,
                admitted: 0,
            };
        }
        if window.admitted >= policy.max_requests() {
            return false;
        }
        window.admitted = window.admitted.saturating_add(1);
        true
    }
}
