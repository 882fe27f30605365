//! Sliding-window rate counting.
//!
//! A counting sliding window, not a token bucket: every access appends
//! the current timestamp and drops everything older than the window.
//! Bursts straddling the window boundary can admit up to twice the
//! configured maximum in pathological timing; this approximation is
//! accepted.

use papaya::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Per-IP sliding-window request counter.
pub struct RateWindow {
    windows: HashMap<String, Mutex<VecDeque<u64>>>,
    window_ms: u64,
    max_requests: usize,
}

impl RateWindow {
    #[must_use]
    pub fn new(window_ms: u64, max_requests: usize) -> Self {
        Self {
            windows: HashMap::new(),
            window_ms,
            max_requests,
        }
    }

    /// Records a request and returns the count inside the active window,
    /// the new request included.
    ///
    /// # Panics
    ///
    /// Panics if a window mutex is poisoned.
    pub fn check(&self, ip: &str, now_ms: u64) -> usize {
        let windows = self.windows.pin();
        let cell = windows.get_or_insert_with(ip.to_string(), || Mutex::new(VecDeque::new()));
        let mut window = cell.lock().unwrap();

        let cutoff = now_ms.saturating_sub(self.window_ms);
        while window.front().is_some_and(|&t| t < cutoff) {
            window.pop_front();
        }
        window.push_back(now_ms);
        window.len()
    }

    /// Whether a count returned by `check` breaches the limit.
    #[must_use]
    pub const fn exceeded(&self, count: usize) -> bool {
        count > self.max_requests
    }

    /// Drops one window, or every window when `ip` is `None`.
    pub fn clear(&self, ip: Option<&str>) {
        let windows = self.windows.pin();
        match ip {
            Some(ip) => {
                windows.remove(ip);
            }
            None => windows.clear(),
        }
    }

    /// Removes windows whose newest entry is idle past the TTL.
    pub fn evict_idle(&self, now_ms: u64, max_idle_ms: u64) -> usize {
        let windows = self.windows.pin();
        let stale: Vec<String> = windows
            .iter()
            .filter(|(_, cell)| {
                let window = cell.lock().unwrap();
                window
                    .back()
                    .is_none_or(|&t| now_ms.saturating_sub(t) > max_idle_ms)
            })
            .map(|(ip, _)| ip.clone())
            .collect();
        for ip in &stale {
            windows.remove(ip);
        }
        stale.len()
    }

    #[cfg(any(test, feature = "testing"))]
    #[must_use]
    pub fn snapshot(&self, ip: &str) -> Vec<u64> {
        self.windows
            .pin()
            .get(ip)
            .map_or_else(Vec::new, |cell| cell.lock().unwrap().iter().copied().collect())
    }
}
