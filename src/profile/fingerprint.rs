//! Client fingerprinting.
//!
//! Tracks how often each IP + User-Agent combination has been seen.
//! The frequency table is a supporting signal for the caller's policy
//! layer; it is not scored by the engine itself.

use papaya::HashMap;
use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// Sighting statistics for one IP + User-Agent combination.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint {
    pub occurrences: u64,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
}

/// Frequency table keyed by the hash of `ip + user_agent`.
pub struct FingerprintTracker {
    fingerprints: HashMap<String, Mutex<Fingerprint>>,
}

impl FingerprintTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fingerprints: HashMap::new(),
        }
    }

    fn key(ip: &str, user_agent: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(user_agent.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Records a sighting and returns the updated occurrence count.
    ///
    /// # Panics
    ///
    /// Panics if a fingerprint mutex is poisoned.
    pub fn observe(&self, ip: &str, user_agent: &str, now_ms: u64) -> u64 {
        let fingerprints = self.fingerprints.pin();
        let cell = fingerprints.get_or_insert_with(Self::key(ip, user_agent), || {
            Mutex::new(Fingerprint {
                occurrences: 0,
                first_seen_ms: now_ms,
                last_seen_ms: now_ms,
            })
        });
        let mut fingerprint = cell.lock().unwrap();
        fingerprint.occurrences += 1;
        fingerprint.last_seen_ms = now_ms;
        fingerprint.occurrences
    }

    /// Occurrence count without recording a sighting.
    #[must_use]
    pub fn occurrences(&self, ip: &str, user_agent: &str) -> u64 {
        self.fingerprints
            .pin()
            .get(&Self::key(ip, user_agent))
            .map_or(0, |cell| cell.lock().unwrap().occurrences)
    }

    /// Drops every fingerprint. Per-IP clearing is not possible because
    /// keys are one-way hashes.
    pub fn clear(&self) {
        self.fingerprints.pin().clear();
    }

    /// Removes fingerprints idle past the TTL.
    pub fn evict_idle(&self, now_ms: u64, max_idle_ms: u64) -> usize {
        let fingerprints = self.fingerprints.pin();
        let stale: Vec<String> = fingerprints
            .iter()
            .filter(|(_, cell)| {
                let fingerprint = cell.lock().unwrap();
                now_ms.saturating_sub(fingerprint.last_seen_ms) > max_idle_ms
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            fingerprints.remove(key);
        }
        stale.len()
    }
}

impl Default for FingerprintTracker {
    fn default() -> Self {
        Self::new()
    }
}
