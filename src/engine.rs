//! Detection engine.
//!
//! Owns every piece of shared per-IP state and exposes the full
//! evaluation pipeline behind a single `evaluate` call. Construction
//! is once per process; all mutation goes through this type.
//!
//! Per request: the sighting is recorded, reputation decays (healing
//! first), a blocked IP short-circuits to a single critical threat,
//! then the rate window, velocity checks, user-agent check, and
//! pattern scoring run and their penalties apply additively.

use crate::config::{Config, EngineError, Result};
use crate::features::webhook::{EventType, WebhookNotifier, WebhookPayload};
use crate::inspect::extract::extract_signals;
use crate::inspect::scorer::ConfidenceScorer;
use crate::inspect::threat::{SecurityThreat, Severity, ThreatCategory};
use crate::inspect::whitelist::WhitelistFilter;
use crate::profile::fingerprint::FingerprintTracker;
use crate::profile::rate::RateWindow;
use crate::profile::reputation::ReputationLedger;
use crate::profile::velocity::{RequestHistoryEntry, VelocityAnalyzer, VelocityAnomaly};
use crate::request::RequestView;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// User-Agent substrings of well-known attack and scanning tools.
const SCANNER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "dirbuster",
    "gobuster",
    "wpscan",
    "metasploit",
    "hydra",
    "havij",
    "acunetix",
    "zgrab",
];

fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(0)
}

/// The inline request-inspection engine.
pub struct DetectionEngine {
    config: Arc<Config>,
    scorer: ConfidenceScorer,
    whitelist: WhitelistFilter,
    ledger: ReputationLedger,
    rate: RateWindow,
    velocity: VelocityAnalyzer,
    fingerprints: FingerprintTracker,
    notifier: Option<Arc<WebhookNotifier>>,
}

impl DetectionEngine {
    /// Creates an engine with no notifier.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self::build(config, None)
    }

    /// Creates an engine that reports block events to a webhook.
    #[must_use]
    pub fn with_notifier(config: Arc<Config>, notifier: Arc<WebhookNotifier>) -> Self {
        Self::build(config, Some(notifier))
    }

    fn build(config: Arc<Config>, notifier: Option<Arc<WebhookNotifier>>) -> Self {
        Self {
            scorer: ConfidenceScorer::new(
                config.min_candidate_len,
                config.max_candidate_len,
                config.decode_depth,
            ),
            whitelist: WhitelistFilter::new(),
            ledger: ReputationLedger::new(
                config.decay_rate_per_hour,
                config.block_threshold,
                config.unblock_threshold,
            ),
            rate: RateWindow::new(config.rate_window_ms, config.max_requests_per_window),
            velocity: VelocityAnalyzer::new(
                config.history_cap,
                config.burst_window_ms,
                config.burst_threshold,
                config.scan_path_threshold,
                config.recent_window,
                config.auth_probe_threshold,
                config.scan_recent_threshold,
            ),
            fingerprints: FingerprintTracker::new(),
            notifier,
            config,
        }
    }

    /// Evaluates one request, returning every detected threat.
    ///
    /// The engine itself never fails on malformed field content; the
    /// error arm is reserved for requests that cannot be attributed to
    /// a client at all. The caller owns the fail-open/fail-closed
    /// decision on that error.
    pub fn evaluate(&self, request: &RequestView) -> Result<Vec<SecurityThreat>> {
        if request.ip.is_empty() {
            return Err(EngineError::Evaluation(
                "request carries no client ip".to_string(),
            ));
        }
        let now = now_ms();
        let ip = request.ip.as_str();
        let user_agent = request.user_agent();

        self.fingerprints
            .observe(ip, user_agent.unwrap_or_default(), now);
        self.velocity.record(
            ip,
            RequestHistoryEntry {
                method: request.method.clone(),
                path: request.path.clone(),
                timestamp_ms: now,
                user_agent: user_agent.map(str::to_string),
                body_size: request.body_size(),
            },
        );

        // Healing first: decay always runs before this request's penalties.
        if self.ledger.decay(ip, now) {
            let threat = SecurityThreat::behavioral(
                ThreatCategory::BlockedIp,
                Severity::Critical,
                100,
                "request from blocked ip rejected",
                now,
            );
            warn!(ip = %ip, "Blocked IP rejected");
            self.notify(EventType::BlockedIpRejected, ip, &threat);
            return Ok(vec![threat]);
        }

        let mut threats = Vec::new();

        let count = self.rate.check(ip, now);
        if self.rate.exceeded(count) {
            let threat = SecurityThreat::behavioral(
                ThreatCategory::RateLimitExceeded,
                Severity::High,
                95,
                &format!("{count} requests in window"),
                now,
            );
            warn!(ip = %ip, count, "Rate limit exceeded");
            self.ledger.penalize(ip, self.config.rate_penalty, now);
            self.notify(EventType::RateLimitExceeded, ip, &threat);
            threats.push(threat);
        }

        let anomalies = self.velocity.analyze(ip, now);
        if !anomalies.is_empty() {
            let penalty = self.config.velocity_penalty * anomalies.len() as f64;
            self.ledger.penalize(ip, penalty, now);
            for anomaly in anomalies {
                let threat = Self::anomaly_threat(&anomaly, now);
                self.notify(EventType::VelocityAnomaly, ip, &threat);
                threats.push(threat);
            }
        }

        if let Some(agent) = user_agent {
            if Self::is_scanner_agent(agent) {
                let threat = SecurityThreat::behavioral(
                    ThreatCategory::SuspiciousUserAgent,
                    Severity::Medium,
                    60,
                    agent,
                    now,
                );
                self.ledger.penalize(ip, self.config.ua_penalty, now);
                threats.push(threat);
            }
        }

        let mut pattern_threats = 0usize;
        for signal in extract_signals(request, self.config.max_flatten_depth) {
            if self.whitelist.is_whitelisted(&signal.value, signal.context) {
                continue;
            }
            let found = self
                .scorer
                .score(&signal.value, &signal.field, signal.context, now);
            for threat in found {
                self.notify(EventType::ThreatDetected, ip, &threat);
                pattern_threats += 1;
                threats.push(threat);
            }
        }
        if pattern_threats > 0 {
            let penalty = self.config.threat_penalty * pattern_threats as f64;
            self.ledger.penalize(ip, penalty, now);
        }

        if self.ledger.is_blocked(ip) {
            self.notify_blocked(ip, now);
        }

        Ok(threats)
    }

    /// Current reputation score for an IP. Unseen IPs report 100.
    #[must_use]
    pub fn reputation_score(&self, ip: &str) -> u8 {
        self.ledger.score(ip)
    }

    /// Whether the IP is currently blocked.
    #[must_use]
    pub fn is_blocked(&self, ip: &str) -> bool {
        self.ledger.is_blocked(ip)
    }

    /// Manual block override.
    pub fn set_blocked(&self, ip: &str, blocked: bool) {
        self.ledger.set_blocked(ip, blocked, now_ms());
    }

    /// Clears state for one IP, or everything when `ip` is `None`.
    /// Fingerprints are keyed by hash and only clear globally.
    pub fn clear_state(&self, ip: Option<&str>) {
        self.ledger.clear(ip);
        self.rate.clear(ip);
        self.velocity.clear(ip);
        if ip.is_none() {
            self.fingerprints.clear();
        }
    }

    /// Evicts per-IP records idle past the TTL across every table,
    /// blocked records included. Callers schedule this sweep; the
    /// engine never runs it on its own. Returns evicted record count.
    pub fn evict_idle(&self, max_idle_ms: u64) -> usize {
        let now = now_ms();
        self.ledger.evict_idle(now, max_idle_ms)
            + self.rate.evict_idle(now, max_idle_ms)
            + self.velocity.evict_idle(now, max_idle_ms)
            + self.fingerprints.evict_idle(now, max_idle_ms)
    }

    /// Occurrence count for an IP + User-Agent combination.
    #[must_use]
    pub fn fingerprint_occurrences(&self, ip: &str, user_agent: &str) -> u64 {
        self.fingerprints.occurrences(ip, user_agent)
    }

    fn is_scanner_agent(agent: &str) -> bool {
        if agent.trim().is_empty() {
            return true;
        }
        let lower = agent.to_lowercase();
        SCANNER_AGENTS.iter().any(|s| lower.contains(s))
    }

    fn anomaly_threat(anomaly: &VelocityAnomaly, now: u64) -> SecurityThreat {
        match anomaly {
            VelocityAnomaly::Burst { count } => SecurityThreat::behavioral(
                ThreatCategory::BurstActivity,
                Severity::High,
                85,
                &format!("{count} requests in burst window"),
                now,
            ),
            VelocityAnomaly::DistributedScan {
                distinct_paths,
                total,
            } => SecurityThreat::behavioral(
                ThreatCategory::DistributedScan,
                Severity::Critical,
                90,
                &format!("{distinct_paths} distinct paths across {total} requests"),
                now,
            ),
            VelocityAnomaly::AuthProbe { hits } => SecurityThreat::behavioral(
                ThreatCategory::AuthProbe,
                Severity::High,
                80,
                &format!("{hits} auth endpoints probed"),
                now,
            ),
            VelocityAnomaly::Scanning { distinct_paths } => SecurityThreat::behavioral(
                ThreatCategory::Scanning,
                Severity::Medium,
                70,
                &format!("{distinct_paths} distinct paths in recent history"),
                now,
            ),
        }
    }

    fn notify(&self, event_type: EventType, ip: &str, threat: &SecurityThreat) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(WebhookPayload::from_threat(event_type, ip, threat));
        }
    }

    fn notify_blocked(&self, ip: &str, now: u64) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(WebhookPayload {
                event_type: EventType::IpBlocked,
                timestamp: i64::try_from(now / 1000).unwrap_or(0),
                ip: Some(ip.to_string()),
                severity: Severity::Critical.rank(),
                message: format!("ip blocked, score {}", self.ledger.score(ip)),
            });
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl DetectionEngine {
    /// Rewinds an IP's reputation clock to simulate idle time.
    pub fn simulate_idle(&self, ip: &str, idle_ms: u64) {
        self.ledger.simulate_idle(ip, idle_ms);
    }

    /// Applies a raw penalty, for tests that need a specific score.
    pub fn penalize_for_test(&self, ip: &str, amount: f64) {
        self.ledger.penalize(ip, amount, now_ms());
    }
}
