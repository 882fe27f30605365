//! Threat types.
//!
//! Defines the immutable `SecurityThreat` record produced by the
//! detection pipeline and consumed by the blocking-policy layer.

use crate::inspect::whitelist::FieldContext;
use serde::Serialize;

const SNIPPET_MAX: usize = 120;

/// Severity of a detected threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank used by webhook payloads, 2 (low) through 5 (critical).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 4,
            Self::Critical => 5,
        }
    }
}

/// Attack category assigned to a threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    SqlInjection,
    NoSqlInjection,
    CommandInjection,
    Xss,
    PathTraversal,
    Xxe,
    Ssrf,
    Polyglot,
    UnicodeEvasion,
    RateLimitExceeded,
    BurstActivity,
    DistributedScan,
    AuthProbe,
    Scanning,
    SuspiciousUserAgent,
    BlockedIp,
}

impl ThreatCategory {
    /// Stable string label, used in logs and webhook messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SqlInjection => "sql_injection",
            Self::NoSqlInjection => "nosql_injection",
            Self::CommandInjection => "command_injection",
            Self::Xss => "xss",
            Self::PathTraversal => "path_traversal",
            Self::Xxe => "xxe",
            Self::Ssrf => "ssrf",
            Self::Polyglot => "polyglot",
            Self::UnicodeEvasion => "unicode_evasion",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::BurstActivity => "burst_activity",
            Self::DistributedScan => "distributed_scan",
            Self::AuthProbe => "auth_probe",
            Self::Scanning => "scanning",
            Self::SuspiciousUserAgent => "suspicious_user_agent",
            Self::BlockedIp => "blocked_ip",
        }
    }
}

/// One detected threat. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityThreat {
    pub category: ThreatCategory,
    pub severity: Severity,
    /// Certainty that this is a true positive, 0 to 100.
    pub confidence: u8,
    /// Number of distinct corpus patterns that matched. Zero for
    /// behavioral threats, which are derived from counters.
    pub matched_patterns: u32,
    /// Request field the offending value came from, e.g. `query.q`.
    pub source_field: String,
    /// Semantic context of the source field, when one was inferred.
    pub source_context: Option<FieldContext>,
    /// Truncated copy of the offending value.
    pub snippet: String,
    pub created_at_ms: u64,
}

impl SecurityThreat {
    /// Creates a pattern-based threat for a scored candidate.
    #[must_use]
    pub fn pattern(
        category: ThreatCategory,
        severity: Severity,
        confidence: u8,
        matched_patterns: u32,
        source_field: &str,
        source_context: Option<FieldContext>,
        raw: &str,
        now_ms: u64,
    ) -> Self {
        Self {
            category,
            severity,
            confidence,
            matched_patterns,
            source_field: source_field.to_string(),
            source_context,
            snippet: truncate(raw),
            created_at_ms: now_ms,
        }
    }

    /// Creates a behavioral threat derived from per-IP counters.
    #[must_use]
    pub fn behavioral(
        category: ThreatCategory,
        severity: Severity,
        confidence: u8,
        detail: &str,
        now_ms: u64,
    ) -> Self {
        Self {
            category,
            severity,
            confidence,
            matched_patterns: 0,
            source_field: "client".to_string(),
            source_context: None,
            snippet: truncate(detail),
            created_at_ms: now_ms,
        }
    }
}

fn truncate(raw: &str) -> String {
    if raw.len() <= SNIPPET_MAX {
        return raw.to_string();
    }
    let mut end = SNIPPET_MAX;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}
