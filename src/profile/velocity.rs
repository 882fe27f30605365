//! Burst, scan, and probe detection.
//!
//! Keeps a capped per-IP request history (FIFO eviction) and runs four
//! independent checks over it: short-horizon burst and path-diversity
//! scans, and medium-horizon auth probing and scanning. A single
//! request can trigger several at once.

use papaya::HashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// One remembered request.
#[derive(Debug, Clone)]
pub struct RequestHistoryEntry {
    pub method: String,
    pub path: String,
    pub timestamp_ms: u64,
    pub user_agent: Option<String>,
    pub body_size: Option<usize>,
}

/// Anomaly produced by a velocity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VelocityAnomaly {
    /// More than the threshold of requests inside the short window.
    Burst { count: usize },
    /// High path diversity and volume inside the short window.
    DistributedScan { distinct_paths: usize, total: usize },
    /// Auth-flavored paths dominate the recent history.
    AuthProbe { hits: usize },
    /// High path diversity over the recent history.
    Scanning { distinct_paths: usize },
}

/// Substrings that mark a path as authentication-flavored.
const AUTH_MARKERS: &[&str] = &["login", "auth", "admin"];

/// Per-IP request history with velocity analysis.
pub struct VelocityAnalyzer {
    history: HashMap<String, Mutex<VecDeque<RequestHistoryEntry>>>,
    cap: usize,
    burst_window_ms: u64,
    burst_threshold: usize,
    scan_path_threshold: usize,
    recent_window: usize,
    auth_probe_threshold: usize,
    scan_recent_threshold: usize,
}

impl VelocityAnalyzer {
    #[must_use]
    pub fn new(
        cap: usize,
        burst_window_ms: u64,
        burst_threshold: usize,
        scan_path_threshold: usize,
        recent_window: usize,
        auth_probe_threshold: usize,
        scan_recent_threshold: usize,
    ) -> Self {
        Self {
            history: HashMap::new(),
            cap,
            burst_window_ms,
            burst_threshold,
            scan_path_threshold,
            recent_window,
            auth_probe_threshold,
            scan_recent_threshold,
        }
    }

    /// Appends an entry, evicting the oldest once the cap is exceeded.
    ///
    /// # Panics
    ///
    /// Panics if a history mutex is poisoned.
    pub fn record(&self, ip: &str, entry: RequestHistoryEntry) {
        let history = self.history.pin();
        let cell = history.get_or_insert_with(ip.to_string(), || Mutex::new(VecDeque::new()));
        let mut entries = cell.lock().unwrap();
        entries.push_back(entry);
        while entries.len() > self.cap {
            entries.pop_front();
        }
    }

    /// Runs every check over the IP's history.
    ///
    /// # Panics
    ///
    /// Panics if a history mutex is poisoned.
    #[must_use]
    pub fn analyze(&self, ip: &str, now_ms: u64) -> Vec<VelocityAnomaly> {
        let history = self.history.pin();
        let Some(cell) = history.get(ip) else {
            return Vec::new();
        };
        let entries = cell.lock().unwrap();
        let mut anomalies = Vec::new();

        let cutoff = now_ms.saturating_sub(self.burst_window_ms);
        let recent_window: Vec<&RequestHistoryEntry> = entries
            .iter()
            .rev()
            .take_while(|e| e.timestamp_ms > cutoff)
            .collect();

        if recent_window.len() > self.burst_threshold {
            anomalies.push(VelocityAnomaly::Burst {
                count: recent_window.len(),
            });
        }

        let distinct: HashSet<&str> = recent_window.iter().map(|e| e.path.as_str()).collect();
        if distinct.len() > self.scan_path_threshold && recent_window.len() > self.scan_path_threshold
        {
            anomalies.push(VelocityAnomaly::DistributedScan {
                distinct_paths: distinct.len(),
                total: recent_window.len(),
            });
        }

        let last: Vec<&RequestHistoryEntry> =
            entries.iter().rev().take(self.recent_window).collect();

        let auth_hits = last
            .iter()
            .filter(|e| {
                let path = e.path.to_lowercase();
                AUTH_MARKERS.iter().any(|m| path.contains(m))
            })
            .count();
        if auth_hits > self.auth_probe_threshold {
            anomalies.push(VelocityAnomaly::AuthProbe { hits: auth_hits });
        }

        let last_distinct: HashSet<&str> = last.iter().map(|e| e.path.as_str()).collect();
        if last_distinct.len() > self.scan_recent_threshold {
            anomalies.push(VelocityAnomaly::Scanning {
                distinct_paths: last_distinct.len(),
            });
        }

        if !anomalies.is_empty() {
            debug!(ip = %ip, anomalies = anomalies.len(), "Velocity anomalies");
        }
        anomalies
    }

    /// Drops one IP's history, or all of it when `ip` is `None`.
    pub fn clear(&self, ip: Option<&str>) {
        let history = self.history.pin();
        match ip {
            Some(ip) => {
                history.remove(ip);
            }
            None => history.clear(),
        }
    }

    /// Removes histories whose newest entry is idle past the TTL.
    pub fn evict_idle(&self, now_ms: u64, max_idle_ms: u64) -> usize {
        let history = self.history.pin();
        let stale: Vec<String> = history
            .iter()
            .filter(|(_, cell)| {
                let entries = cell.lock().unwrap();
                entries
                    .back()
                    .is_none_or(|e| now_ms.saturating_sub(e.timestamp_ms) > max_idle_ms)
            })
            .map(|(ip, _)| ip.clone())
            .collect();
        for ip in &stale {
            history.remove(ip);
        }
        stale.len()
    }

    #[must_use]
    pub fn history_len(&self, ip: &str) -> usize {
        self.history
            .pin()
            .get(ip)
            .map_or(0, |cell| cell.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> VelocityAnalyzer {
        VelocityAnalyzer::new(1000, 10_000, 20, 15, 10, 5, 8)
    }

    fn entry(path: &str, timestamp_ms: u64) -> RequestHistoryEntry {
        RequestHistoryEntry {
            method: "GET".to_string(),
            path: path.to_string(),
            timestamp_ms,
            user_agent: None,
            body_size: None,
        }
    }

    #[test]
    fn test_burst_detection() {
        let analyzer = analyzer();
        let now = 100_000;
        for i in 0..21 {
            analyzer.record("10.0.0.1", entry("/page", now - 5_000 + i));
        }
        let anomalies = analyzer.analyze("10.0.0.1", now);
        assert!(anomalies
            .iter()
            .any(|a| matches!(a, VelocityAnomaly::Burst { count } if *count == 21)));
    }

    #[test]
    fn test_burst_requires_exceeding_threshold() {
        let analyzer = analyzer();
        let now = 100_000;
        for i in 0..20 {
            analyzer.record("10.0.0.1", entry("/page", now - 5_000 + i));
        }
        let anomalies = analyzer.analyze("10.0.0.1", now);
        assert!(!anomalies
            .iter()
            .any(|a| matches!(a, VelocityAnomaly::Burst { .. })));
    }

    #[test]
    fn test_distributed_scan() {
        let analyzer = analyzer();
        let now = 100_000;
        for i in 0..16 {
            analyzer.record("10.0.0.1", entry(&format!("/p{i}"), now - 5_000 + i));
        }
        let anomalies = analyzer.analyze("10.0.0.1", now);
        assert!(anomalies
            .iter()
            .any(|a| matches!(a, VelocityAnomaly::DistributedScan { distinct_paths, total }
                if *distinct_paths == 16 && *total == 16)));
    }

    #[test]
    fn test_auth_probe() {
        let analyzer = analyzer();
        let now = 1_000_000;
        for i in 0..6 {
            analyzer.record("10.0.0.1", entry(&format!("/login?try={i}"), now - 200_000));
        }
        for i in 0..4 {
            analyzer.record("10.0.0.1", entry(&format!("/home{i}"), now - 200_000));
        }
        // Auth probing looks at the last N entries regardless of age.
        let anomalies = analyzer.analyze("10.0.0.1", now);
        assert!(anomalies
            .iter()
            .any(|a| matches!(a, VelocityAnomaly::AuthProbe { hits } if *hits == 6)));
    }

    #[test]
    fn test_recent_scanning() {
        let analyzer = analyzer();
        let now = 1_000_000;
        for i in 0..9 {
            analyzer.record("10.0.0.1", entry(&format!("/r{i}"), now - 200_000));
        }
        let anomalies = analyzer.analyze("10.0.0.1", now);
        assert!(anomalies
            .iter()
            .any(|a| matches!(a, VelocityAnomaly::Scanning { distinct_paths } if *distinct_paths == 9)));
    }

    #[test]
    fn test_fifo_cap() {
        let analyzer = VelocityAnalyzer::new(5, 10_000, 20, 15, 10, 5, 8);
        for i in 0..10u32 {
            analyzer.record("10.0.0.1", entry(&format!("/p{i}"), u64::from(i)));
        }
        assert_eq!(analyzer.history_len("10.0.0.1"), 5);
    }

    #[test]
    fn test_unknown_ip_no_anomalies() {
        let analyzer = analyzer();
        assert!(analyzer.analyze("203.0.113.50", 1_000).is_empty());
    }

    #[test]
    fn test_checks_are_independent() {
        let analyzer = analyzer();
        let now = 100_000;
        // 25 distinct auth-ish paths inside the burst window trip burst,
        // distributed scan, auth probe, and scanning at once.
        for i in 0..25 {
            analyzer.record("10.0.0.1", entry(&format!("/admin/probe{i}"), now - 1_000 + i));
        }
        let anomalies = analyzer.analyze("10.0.0.1", now);
        assert_eq!(anomalies.len(), 4);
    }
}
