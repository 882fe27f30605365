//! Configuration settings.
//!
//! Defines the main `Config` struct and environment variable loading logic.
//! Every option has a hard default; the engine can be constructed without
//! any environment at all.

use std::env;
use std::sync::Arc;

fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_u64_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn get_env_f64_or(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn get_env_usize_or(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sliding rate window duration in milliseconds.
    pub rate_window_ms: u64,
    /// Maximum requests per IP within the rate window.
    pub max_requests_per_window: usize,
    /// Maximum retained history entries per IP (FIFO eviction).
    pub history_cap: usize,
    /// Reputation points restored per idle hour.
    pub decay_rate_per_hour: f64,
    /// Reputation score below which an IP is blocked.
    pub block_threshold: f64,
    /// Reputation score above which a blocked IP is unblocked on decay.
    pub unblock_threshold: f64,
    /// Short-horizon window for burst and scan detection, in milliseconds.
    pub burst_window_ms: u64,
    /// History entries within the burst window that constitute a burst.
    pub burst_threshold: usize,
    /// Distinct paths within the burst window that constitute a scan.
    pub scan_path_threshold: usize,
    /// History entries inspected by the medium-horizon checks.
    pub recent_window: usize,
    /// Auth-flavored paths among recent entries that constitute probing.
    pub auth_probe_threshold: usize,
    /// Distinct paths among recent entries that constitute scanning.
    pub scan_recent_threshold: usize,
    /// Minimum candidate length worth scoring.
    pub min_candidate_len: usize,
    /// Maximum candidate length worth scoring (DoS guard).
    pub max_candidate_len: usize,
    /// Maximum nesting depth when flattening a request body.
    pub max_flatten_depth: usize,
    /// Maximum iterative decode passes applied to a candidate.
    pub decode_depth: usize,
    /// Reputation penalty for breaching the rate window.
    pub rate_penalty: f64,
    /// Reputation penalty for a suspicious user agent.
    pub ua_penalty: f64,
    /// Reputation penalty per pattern-based threat.
    pub threat_penalty: f64,
    /// Reputation penalty per velocity anomaly.
    pub velocity_penalty: f64,
    /// Webhook URL for security notifications.
    pub webhook_url: Option<String>,
    /// Bearer token for webhook authentication.
    pub webhook_token: Option<String>,
    /// Logging format hint: "json" or "pretty".
    pub log_format: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Arc<Self> {
        Arc::new(Self {
            rate_window_ms: get_env_u64_or("RATE_WINDOW_MS", 60_000),
            max_requests_per_window: get_env_usize_or("MAX_REQUESTS_PER_WINDOW", 100),
            history_cap: get_env_usize_or("HISTORY_CAP", 1000),
            decay_rate_per_hour: get_env_f64_or("DECAY_RATE_PER_HOUR", 10.0),
            block_threshold: get_env_f64_or("BLOCK_THRESHOLD", 20.0),
            unblock_threshold: get_env_f64_or("UNBLOCK_THRESHOLD", 50.0),
            burst_window_ms: get_env_u64_or("BURST_WINDOW_MS", 10_000),
            burst_threshold: get_env_usize_or("BURST_THRESHOLD", 20),
            scan_path_threshold: get_env_usize_or("SCAN_PATH_THRESHOLD", 15),
            recent_window: get_env_usize_or("RECENT_WINDOW", 10),
            auth_probe_threshold: get_env_usize_or("AUTH_PROBE_THRESHOLD", 5),
            scan_recent_threshold: get_env_usize_or("SCAN_RECENT_THRESHOLD", 8),
            min_candidate_len: get_env_usize_or("MIN_CANDIDATE_LEN", 2),
            max_candidate_len: get_env_usize_or("MAX_CANDIDATE_LEN", 10_000),
            max_flatten_depth: get_env_usize_or("MAX_FLATTEN_DEPTH", 10),
            decode_depth: get_env_usize_or("DECODE_DEPTH", 3),
            rate_penalty: get_env_f64_or("RATE_PENALTY", 10.0),
            ua_penalty: get_env_f64_or("UA_PENALTY", 5.0),
            threat_penalty: get_env_f64_or("THREAT_PENALTY", 5.0),
            velocity_penalty: get_env_f64_or("VELOCITY_PENALTY", 3.0),
            webhook_url: env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            webhook_token: env::var("WEBHOOK_TOKEN").ok().filter(|s| !s.is_empty()),
            log_format: get_env_or("LOG_FORMAT", "json"),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
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
            log_format: "json".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.rate_window_ms, 60_000);
        assert_eq!(config.max_requests_per_window, 100);
        assert_eq!(config.history_cap, 1000);
        assert!((config.block_threshold - 20.0).abs() < f64::EPSILON);
        assert!((config.unblock_threshold - 50.0).abs() < f64::EPSILON);
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn test_from_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("RATE_WINDOW_MS", "30000");
        std::env::set_var("BURST_THRESHOLD", "50");
        let config = Config::from_env();
        assert_eq!(config.rate_window_ms, 30_000);
        assert_eq!(config.burst_threshold, 50);
        std::env::remove_var("RATE_WINDOW_MS");
        std::env::remove_var("BURST_THRESHOLD");
    }

    #[test]
    fn test_from_env_invalid_falls_back() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("HISTORY_CAP", "not-a-number");
        let config = Config::from_env();
        assert_eq!(config.history_cap, 1000);
        std::env::remove_var("HISTORY_CAP");
    }
}
