//! Confidence scoring.
//!
//! Applies the compiled corpus to one candidate string and derives
//! severity plus a 0 to 100 confidence from the distinct-rule match
//! count. Candidates are also re-scored after iterative decoding
//! (URL, HTML-entity, unicode escapes) to catch nested-encoding
//! evasion; the strongest variant wins.

use crate::inspect::corpus::{MatchOutcome, PatternCorpus};
use crate::inspect::threat::{SecurityThreat, Severity, ThreatCategory};
use crate::inspect::whitelist::FieldContext;
use percent_encoding::percent_decode_str;
use tracing::debug;

/// Confidence floor for any Unicode/homoglyph sub-corpus detection.
const UNICODE_FLOOR: u8 = 85;
/// Confidence assigned to a high-confidence override match.
const OVERRIDE_CONFIDENCE: u8 = 100;

/// Non-linear confidence curve over the distinct-rule match count.
#[must_use]
pub const fn confidence_for(matched: u32) -> u8 {
    match matched {
        0 => 0,
        1 => 30,
        2 => 60,
        3 => 85,
        more => {
            let scaled = 85 + 5 * (more - 3);
            if scaled > 100 {
                100
            } else {
                scaled as u8
            }
        }
    }
}

/// Scores candidates against the corpus.
pub struct ConfidenceScorer {
    corpus: PatternCorpus,
    min_candidate_len: usize,
    max_candidate_len: usize,
    decode_depth: usize,
}

impl ConfidenceScorer {
    #[must_use]
    pub fn new(min_candidate_len: usize, max_candidate_len: usize, decode_depth: usize) -> Self {
        Self {
            corpus: PatternCorpus::new(),
            min_candidate_len,
            max_candidate_len,
            decode_depth,
        }
    }

    /// Evaluates one candidate, returning zero or one threat per category.
    #[must_use]
    pub fn score(
        &self,
        candidate: &str,
        source_field: &str,
        source_context: Option<FieldContext>,
        now_ms: u64,
    ) -> Vec<SecurityThreat> {
        if candidate.len() < self.min_candidate_len || candidate.len() > self.max_candidate_len {
            return Vec::new();
        }

        let mut best: Vec<(ThreatCategory, MatchOutcome)> = Vec::new();
        for variant in decode_variants(candidate, self.decode_depth) {
            for (category, outcome) in self.corpus.evaluate(&variant) {
                match best.iter_mut().find(|(c, _)| *c == category) {
                    Some((_, existing)) => {
                        if (outcome.override_hit, outcome.matched)
                            > (existing.override_hit, existing.matched)
                        {
                            *existing = outcome;
                        }
                    }
                    None => best.push((category, outcome)),
                }
            }
        }

        let mut threats = Vec::new();
        for (category, outcome) in best {
            if let Some(threat) = build_threat(
                category,
                outcome,
                source_field,
                source_context,
                candidate,
                now_ms,
            ) {
                debug!(
                    category = threat.category.label(),
                    confidence = threat.confidence,
                    matched = threat.matched_patterns,
                    field = %source_field,
                    "Pattern detection"
                );
                threats.push(threat);
            }
        }
        threats
    }
}

fn build_threat(
    category: ThreatCategory,
    outcome: MatchOutcome,
    source_field: &str,
    source_context: Option<FieldContext>,
    raw: &str,
    now_ms: u64,
) -> Option<SecurityThreat> {
    let (confidence, severity) = match category {
        ThreatCategory::UnicodeEvasion => {
            // One match suffices for the unicode sub-corpus.
            let confidence = confidence_for(outcome.matched).max(UNICODE_FLOOR);
            (confidence, Severity::Critical)
        }
        ThreatCategory::Polyglot => {
            // A lone polyglot marker is not a cross-class signal.
            if outcome.matched < 2 {
                return None;
            }
            (confidence_for(outcome.matched), Severity::Critical)
        }
        _ if outcome.override_hit => (OVERRIDE_CONFIDENCE, Severity::Critical),
        _ => {
            // Single matches are suppressed as too noisy.
            if outcome.matched < 2 {
                return None;
            }
            let severity = if outcome.matched >= 3 {
                Severity::Critical
            } else if category == ThreatCategory::Ssrf {
                Severity::Medium
            } else {
                Severity::High
            };
            (confidence_for(outcome.matched), severity)
        }
    };

    Some(SecurityThreat::pattern(
        category,
        severity,
        confidence,
        outcome.matched,
        source_field,
        source_context,
        raw,
        now_ms,
    ))
}

/// The candidate itself plus up to `depth` successive decodes, stopping
/// early once a pass no longer changes the text.
fn decode_variants(candidate: &str, depth: usize) -> Vec<String> {
    let mut variants = vec![candidate.to_string()];
    let mut current = candidate.to_string();
    for _ in 0..depth {
        let decoded = decode_once(&current);
        if decoded == current {
            break;
        }
        variants.push(decoded.clone());
        current = decoded;
    }
    variants
}

/// One decode pass: percent, plus-as-space, HTML entities, unicode escapes.
fn decode_once(input: &str) -> String {
    let url_decoded = percent_decode_str(input)
        .decode_utf8_lossy()
        .replace('+', " ");
    decode_escapes(&decode_entities(&url_decoded))
}

/// Decodes named and numeric HTML entities.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let probe = &tail.as_bytes()[..tail.len().min(12)];
        let Some(end) = probe.iter().position(|&b| b == b';') else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    num.strip_prefix(['x', 'X'])
                        .map_or_else(|| num.parse::<u32>().ok(), |hex| u32::from_str_radix(hex, 16).ok())
                })
                .and_then(char::from_u32),
        };
        if let Some(c) = decoded {
            out.push(c);
            rest = &tail[end + 1..];
        } else {
            out.push('&');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Decodes `\uXXXX` and `%uXXXX` escape sequences.
fn decode_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        let is_escape = (bytes[i] == b'\\' || bytes[i] == b'%')
            && i + 5 < bytes.len()
            && (bytes[i + 1] == b'u' || bytes[i + 1] == b'U')
            && bytes[i + 2..i + 6].iter().all(u8::is_ascii_hexdigit);
        if is_escape {
            let hex = &input[i + 2..i + 6];
            if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                out.push(c);
                i += 6;
                continue;
            }
        }
        // Advance one full character, not one byte.
        let ch_len = input[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(2, 10_000, 3)
    }

    #[test]
    fn test_confidence_curve_monotonic() {
        let mut prev = 0;
        for m in 0..12 {
            let c = confidence_for(m);
            assert!(c >= prev, "confidence dropped at m={m}");
            prev = c;
        }
        assert_eq!(confidence_for(1), 30);
        assert_eq!(confidence_for(2), 60);
        assert_eq!(confidence_for(3), 85);
        assert_eq!(confidence_for(4), 90);
        assert_eq!(confidence_for(6), 100);
        assert_eq!(confidence_for(100), 100);
    }

    #[test]
    fn test_sql_injection_scores() {
        let threats = scorer().score("admin' OR '1'='1", "query.q", None, 0);
        let sql = threats
            .iter()
            .find(|t| t.category == ThreatCategory::SqlInjection)
            .expect("sql threat expected");
        assert!(sql.confidence >= 60);
        assert!(sql.severity >= Severity::High);
        assert!(sql.matched_patterns >= 2);
    }

    #[test]
    fn test_single_match_suppressed() {
        // One lone SQL comment marker is not enough.
        let threats = scorer().score("a--b", "query.q", None, 0);
        assert!(threats
            .iter()
            .all(|t| t.category != ThreatCategory::SqlInjection));
    }

    #[test]
    fn test_unicode_floor() {
        let threats = scorer().score(
            "\u{FF33}\u{FF25}\u{FF2C}\u{FF25}\u{FF23}\u{FF34} * FROM users",
            "query.q",
            None,
            0,
        );
        assert_eq!(threats.len(), 1);
        let unicode = &threats[0];
        assert_eq!(unicode.category, ThreatCategory::UnicodeEvasion);
        assert!(unicode.confidence >= 85);
        assert_eq!(unicode.severity, Severity::Critical);
    }

    #[test]
    fn test_override_is_definitive() {
        let threats = scorer().score("x UNION SELECT 1,2,3", "query.q", None, 0);
        let sql = threats
            .iter()
            .find(|t| t.category == ThreatCategory::SqlInjection)
            .unwrap();
        assert_eq!(sql.confidence, 100);
        assert_eq!(sql.severity, Severity::Critical);
    }

    #[test]
    fn test_polyglot_reported_alongside_categories() {
        let threats = scorer().score(
            "' OR 1=1--<script>alert(1)</script>",
            "query.q",
            None,
            0,
        );
        let categories: Vec<ThreatCategory> = threats.iter().map(|t| t.category).collect();
        assert!(categories.contains(&ThreatCategory::Polyglot));
        assert!(categories.contains(&ThreatCategory::SqlInjection));
        assert!(categories.contains(&ThreatCategory::Xss));
        let poly = threats
            .iter()
            .find(|t| t.category == ThreatCategory::Polyglot)
            .unwrap();
        assert_eq!(poly.severity, Severity::Critical);
    }

    #[test]
    fn test_length_guards() {
        let s = scorer();
        assert!(s.score("a", "query.q", None, 0).is_empty());
        let huge = "<script>".repeat(2000);
        assert!(s.score(&huge, "query.q", None, 0).is_empty());
    }

    #[test]
    fn test_nested_encoding_detected() {
        // "<script>alert(1)</script>" URL-encoded twice.
        let once = "%3Cscript%3Ealert(1)%3C/script%3E";
        let twice = "%253Cscript%253Ealert(1)%253C/script%253E";
        for payload in [once, twice] {
            let threats = scorer().score(payload, "query.q", None, 0);
            assert!(
                threats.iter().any(|t| t.category == ThreatCategory::Xss),
                "xss not found in {payload}"
            );
        }
    }

    #[test]
    fn test_entity_encoding_detected() {
        let payload = "&lt;script&gt;alert(document.cookie)&lt;/script&gt;";
        let threats = scorer().score(payload, "body.comment", None, 0);
        assert!(threats.iter().any(|t| t.category == ThreatCategory::Xss));
    }

    #[test]
    fn test_decode_once_roundtrips() {
        assert_eq!(decode_once("a%27b"), "a'b");
        assert_eq!(decode_once("a+b"), "a b");
        assert_eq!(decode_once("&lt;x&gt;"), "<x>");
        assert_eq!(decode_once("&#60;x&#62;"), "<x>");
        assert_eq!(decode_once("&#x3c;x&#x3e;"), "<x>");
        assert_eq!(decode_once(r"<script"), "<script");
        assert_eq!(decode_once("%u003c"), "<");
        assert_eq!(decode_once("plain text & more"), "plain text & more");
    }

    #[test]
    fn test_decode_variants_bounded() {
        // A value that changes on every pass must still stop at the limit.
        let nested = "%252525253Cscript%252525253E";
        let variants = decode_variants(nested, 3);
        assert!(variants.len() <= 4);
    }
}
