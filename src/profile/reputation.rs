//! Per-IP reputation ledger.
//!
//! Each observed IP carries a trust score from 0 to 100, healed by
//! time-based decay and reduced by penalties. Blocking is hysteretic:
//! an IP blocks below the block threshold and only unblocks once decay
//! lifts the score past the (higher) unblock threshold. Unblocking
//! happens exclusively inside `decay`, which runs on a new sighting of
//! the IP; a blocked IP that goes silent stays blocked.

use papaya::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Mutable per-IP reputation record.
#[derive(Debug, Clone)]
pub struct IpReputationRecord {
    pub score: f64,
    pub last_update_ms: u64,
    pub violation_count: u32,
    pub blocked: bool,
}

impl IpReputationRecord {
    fn new(now_ms: u64) -> Self {
        Self {
            score: 100.0,
            last_update_ms: now_ms,
            violation_count: 0,
            blocked: false,
        }
    }
}

/// Concurrent ledger of per-IP reputation records.
pub struct ReputationLedger {
    records: HashMap<String, Mutex<IpReputationRecord>>,
    decay_rate_per_hour: f64,
    block_threshold: f64,
    unblock_threshold: f64,
}

impl ReputationLedger {
    #[must_use]
    pub fn new(decay_rate_per_hour: f64, block_threshold: f64, unblock_threshold: f64) -> Self {
        Self {
            records: HashMap::new(),
            decay_rate_per_hour,
            block_threshold,
            unblock_threshold,
        }
    }

    /// Heals the score for elapsed idle time and re-evaluates the block
    /// flag. Runs before any penalty in the same request, so reputation
    /// improves first and the current violations apply second.
    ///
    /// Returns whether the IP is blocked after the decay.
    ///
    /// # Panics
    ///
    /// Panics if a record mutex is poisoned.
    pub fn decay(&self, ip: &str, now_ms: u64) -> bool {
        let records = self.records.pin();
        let cell = records.get_or_insert_with(ip.to_string(), || {
            Mutex::new(IpReputationRecord::new(now_ms))
        });
        let mut record = cell.lock().unwrap();

        let elapsed_ms = now_ms.saturating_sub(record.last_update_ms);
        if elapsed_ms > 0 {
            let healed = (elapsed_ms as f64 / MS_PER_HOUR) * self.decay_rate_per_hour;
            record.score = (record.score + healed).min(100.0);
            record.last_update_ms = now_ms;
        }

        if record.blocked && record.score > self.unblock_threshold {
            record.blocked = false;
            info!(ip = %ip, score = record.score, "IP unblocked after decay");
        }

        record.blocked
    }

    /// Applies a penalty and re-evaluates the block flag. Never unblocks.
    ///
    /// # Panics
    ///
    /// Panics if a record mutex is poisoned.
    pub fn penalize(&self, ip: &str, amount: f64, now_ms: u64) {
        let records = self.records.pin();
        let cell = records.get_or_insert_with(ip.to_string(), || {
            Mutex::new(IpReputationRecord::new(now_ms))
        });
        let mut record = cell.lock().unwrap();

        record.score = (record.score - amount).max(0.0);
        record.violation_count += 1;

        if !record.blocked && record.score < self.block_threshold {
            record.blocked = true;
            warn!(
                ip = %ip,
                score = record.score,
                violations = record.violation_count,
                "IP blocked"
            );
        }
    }

    /// Current score, rounded. Unseen IPs report full trust.
    #[must_use]
    pub fn score(&self, ip: &str) -> u8 {
        self.records
            .pin()
            .get(ip)
            .map_or(100, |cell| cell.lock().unwrap().score.round() as u8)
    }

    #[must_use]
    pub fn is_blocked(&self, ip: &str) -> bool {
        self.records
            .pin()
            .get(ip)
            .is_some_and(|cell| cell.lock().unwrap().blocked)
    }

    #[must_use]
    pub fn violation_count(&self, ip: &str) -> u32 {
        self.records
            .pin()
            .get(ip)
            .map_or(0, |cell| cell.lock().unwrap().violation_count)
    }

    /// Manual block override. Blocking zeroes the score so the normal
    /// unblock hysteresis applies instead of the next decay call
    /// immediately lifting the block; unblocking leaves the score to
    /// heal on its own.
    pub fn set_blocked(&self, ip: &str, blocked: bool, now_ms: u64) {
        let records = self.records.pin();
        let cell = records.get_or_insert_with(ip.to_string(), || {
            Mutex::new(IpReputationRecord::new(now_ms))
        });
        let mut record = cell.lock().unwrap();
        record.blocked = blocked;
        if blocked {
            record.score = 0.0;
        }
    }

    /// Drops one record, or every record when `ip` is `None`.
    pub fn clear(&self, ip: Option<&str>) {
        let records = self.records.pin();
        match ip {
            Some(ip) => {
                records.remove(ip);
            }
            None => records.clear(),
        }
    }

    /// Removes records idle past the TTL, blocked ones included.
    /// Returns the number of evicted records.
    pub fn evict_idle(&self, now_ms: u64, max_idle_ms: u64) -> usize {
        let records = self.records.pin();
        let stale: Vec<String> = records
            .iter()
            .filter(|(_, cell)| {
                let record = cell.lock().unwrap();
                now_ms.saturating_sub(record.last_update_ms) > max_idle_ms
            })
            .map(|(ip, _)| ip.clone())
            .collect();
        for ip in &stale {
            records.remove(ip);
        }
        stale.len()
    }

    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        self.records.pin().len()
    }
}

#[cfg(any(test, feature = "testing"))]
impl ReputationLedger {
    /// Rewinds a record's last-update time to simulate idle hours.
    pub fn simulate_idle(&self, ip: &str, idle_ms: u64) {
        if let Some(cell) = self.records.pin().get(ip) {
            let mut record = cell.lock().unwrap();
            record.last_update_ms = record.last_update_ms.saturating_sub(idle_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ReputationLedger {
        ReputationLedger::new(10.0, 20.0, 50.0)
    }

    #[test]
    fn test_first_sighting_full_trust() {
        let ledger = ledger();
        assert_eq!(ledger.score("10.0.0.1"), 100);
        ledger.decay("10.0.0.1", 1_000);
        assert_eq!(ledger.score("10.0.0.1"), 100);
        assert!(!ledger.is_blocked("10.0.0.1"));
    }

    #[test]
    fn test_penalize_floors_at_zero() {
        let ledger = ledger();
        for _ in 0..50 {
            ledger.penalize("10.0.0.1", 10.0, 1_000);
        }
        assert_eq!(ledger.score("10.0.0.1"), 0);
        assert_eq!(ledger.violation_count("10.0.0.1"), 50);
    }

    #[test]
    fn test_decay_caps_at_hundred() {
        let ledger = ledger();
        let now = 100 * 3600 * 1000;
        ledger.penalize("10.0.0.1", 5.0, now);
        ledger.simulate_idle("10.0.0.1", 50 * 3600 * 1000);
        ledger.decay("10.0.0.1", now);
        assert_eq!(ledger.score("10.0.0.1"), 100);
    }

    #[test]
    fn test_block_threshold() {
        let ledger = ledger();
        ledger.penalize("10.0.0.1", 75.0, 0);
        assert!(!ledger.is_blocked("10.0.0.1"));
        ledger.penalize("10.0.0.1", 10.0, 0);
        assert!(ledger.is_blocked("10.0.0.1"));
    }

    #[test]
    fn test_penalize_never_unblocks() {
        let ledger = ledger();
        ledger.penalize("10.0.0.1", 85.0, 0);
        assert!(ledger.is_blocked("10.0.0.1"));
        // Healing past the unblock threshold via decay, then penalizing
        // lightly, must keep the flag that penalize itself set.
        ledger.set_blocked("10.0.0.1", true, 0);
        ledger.penalize("10.0.0.1", 0.0, 0);
        assert!(ledger.is_blocked("10.0.0.1"));
    }

    #[test]
    fn test_unblock_hysteresis() {
        let ledger = ledger();
        let now = 100 * 3600 * 1000;
        ledger.penalize("10.0.0.1", 85.0, now);
        assert!(ledger.is_blocked("10.0.0.1"));
        assert_eq!(ledger.score("10.0.0.1"), 15);

        // Two idle hours: 15 + 20 = 35, still below the unblock threshold.
        ledger.simulate_idle("10.0.0.1", 2 * 3600 * 1000);
        assert!(ledger.decay("10.0.0.1", now));
        assert!(ledger.is_blocked("10.0.0.1"));

        // Four more hours: 35 + 40 = 75 > 50, decay lifts the block.
        ledger.simulate_idle("10.0.0.1", 4 * 3600 * 1000);
        assert!(!ledger.decay("10.0.0.1", now));
        assert!(!ledger.is_blocked("10.0.0.1"));
    }

    #[test]
    fn test_score_bounds_over_random_sequences() {
        let ledger = ledger();
        let ip = "10.0.0.1";
        ledger.decay(ip, 0);
        let mut now = 0u64;
        for step in 0..500 {
            now += (step % 97) as u64 * 1000;
            if step % 3 == 0 {
                ledger.penalize(ip, f64::from(step % 13), now);
            } else {
                ledger.decay(ip, now);
            }
            let score = ledger.score(ip);
            assert!(score <= 100, "score out of bounds: {score}");
        }
    }

    #[test]
    fn test_manual_override() {
        let ledger = ledger();
        ledger.set_blocked("10.0.0.1", true, 0);
        assert!(ledger.is_blocked("10.0.0.1"));
        assert_eq!(ledger.score("10.0.0.1"), 0);
        ledger.set_blocked("10.0.0.1", false, 0);
        assert!(!ledger.is_blocked("10.0.0.1"));
    }

    #[test]
    fn test_manual_block_survives_next_sighting() {
        let ledger = ledger();
        ledger.decay("10.0.0.1", 1_000);
        ledger.set_blocked("10.0.0.1", true, 1_000);
        assert!(ledger.decay("10.0.0.1", 1_001));
        assert!(ledger.is_blocked("10.0.0.1"));
    }

    #[test]
    fn test_clear_and_evict() {
        let ledger = ledger();
        ledger.decay("10.0.0.1", 1_000);
        ledger.decay("10.0.0.2", 1_000);
        assert_eq!(ledger.tracked_ips(), 2);

        ledger.clear(Some("10.0.0.1"));
        assert_eq!(ledger.tracked_ips(), 1);

        ledger.clear(None);
        assert_eq!(ledger.tracked_ips(), 0);

        ledger.decay("10.0.0.3", 1_000);
        let evicted = ledger.evict_idle(10 * 3600 * 1000, 3600 * 1000);
        assert_eq!(evicted, 1);
        assert_eq!(ledger.tracked_ips(), 0);
    }
}
