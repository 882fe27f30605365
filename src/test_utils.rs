//! Test utilities and shared configuration.
//!
//! This module provides common helpers for unit and integration tests,
//! reducing duplication across the codebase.

#[cfg(any(test, feature = "testing"))]
use crate::config::Config;
#[cfg(any(test, feature = "testing"))]
use std::sync::Arc;

/// Creates a standard configuration for testing purposes.
///
/// This configuration has:
/// - Default window sizes and thresholds
/// - No webhook configured
#[cfg(any(test, feature = "testing"))]
#[must_use]
pub fn create_test_config() -> Arc<Config> {
    Arc::new(Config {
        rate_window_ms: 60_000,
        max_requests_per_window: 100,
        history_cap: 1000,
        decay_rate_per_hour: 10.0,
        block_threshold: 20.0,
        unblock_threshold: 50.0,
        burst_window_ms: 10_000,
        burst_threshold: 20,
        scan_path_threshold: 15,
        recent_window: 10,
        auth_probe_threshold: 5,
        scan_recent_threshold: 8,
        min_candidate_len: 2,
        max_candidate_len: 10_000,
        max_flatten_depth: 10,
        decode_depth: 3,
        rate_penalty: 10.0,
        ua_penalty: 5.0,
        threat_penalty: 5.0,
        velocity_penalty: 3.0,
        webhook_url: None,
        webhook_token: None,
        log_format: "pretty".to_string(),
    })
}
