//! Allow-rule suppression.
//!
//! The regex corpora are necessarily broad; without suppression,
//! legitimate inputs sharing vocabulary with attack keywords would
//! dominate false positives. Suppression runs before scoring: a
//! whitelisted candidate is never handed to the scorer.

use regex::Regex;
use serde::Serialize;
use url::Url;

/// Semantic context of a request field, inferred from the field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldContext {
    Email,
    Username,
    Uuid,
    Date,
    Url,
    Number,
    Name,
}

impl FieldContext {
    /// Infers a context from a field name, e.g. a query parameter called
    /// `email` gets the email context.
    #[must_use]
    pub fn infer(field_name: &str) -> Option<Self> {
        let name = field_name.to_lowercase();
        let last = name.rsplit(['.', '_', '-']).next().unwrap_or(&name);
        match last {
            "email" | "mail" => Some(Self::Email),
            "username" | "user" | "login" => Some(Self::Username),
            "uuid" | "guid" | "id" => Some(Self::Uuid),
            "date" | "birthday" | "dob" => Some(Self::Date),
            "url" | "uri" | "link" | "website" | "homepage" => Some(Self::Url),
            "number" | "count" | "amount" | "quantity" | "page" | "limit" | "offset" => {
                Some(Self::Number)
            }
            "name" | "firstname" | "lastname" | "fullname" | "surname" => Some(Self::Name),
            _ => None,
        }
    }
}

/// Characters that disqualify a candidate from the prose heuristic.
const STRUCTURAL_CHARS: &[char] = &[';', '\'', '"', '<', '>', '{', '}', '$', '|', '&', '`'];

/// Lone SQL keywords accepted as safe words (e.g. "select" as a sort field).
const SAFE_WORDS: &[&str] = &[
    "select", "from", "where", "order", "group", "update", "delete", "insert", "table", "join",
    "union", "create", "drop", "limit", "offset", "by", "desc", "asc", "and", "or", "not", "like",
    "between", "exists", "having", "values", "into", "set", "count", "distinct",
];

/// Context-aware and generic allow rules.
pub struct WhitelistFilter {
    email: Regex,
    username: Regex,
    uuid: Regex,
    date: Regex,
    number: Regex,
    name: Regex,
    alphanumeric: Regex,
    prose_word: Regex,
}

impl WhitelistFilter {
    /// Compiles the allow-rule patterns.
    ///
    /// # Panics
    ///
    /// Panics if a built-in pattern is invalid (compile-time invariant).
    #[must_use]
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
                .expect("Failed to compile email pattern"),
            username: Regex::new(r"^[A-Za-z0-9._-]{1,64}$")
                .expect("Failed to compile username pattern"),
            uuid: Regex::new(
                r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
            )
            .expect("Failed to compile uuid pattern"),
            date: Regex::new(r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2})?(\.\d+)?Z?)?$")
                .expect("Failed to compile date pattern"),
            number: Regex::new(r"^-?\d+(\.\d+)?$").expect("Failed to compile number pattern"),
            name: Regex::new(r"^[A-Za-z][A-Za-z .'-]{0,80}$")
                .expect("Failed to compile name pattern"),
            alphanumeric: Regex::new(r"^[A-Za-z0-9]+$")
                .expect("Failed to compile alphanumeric pattern"),
            prose_word: Regex::new(r"^[A-Za-z0-9,.!?:()-]+$")
                .expect("Failed to compile prose word pattern"),
        }
    }

    /// Returns true when the candidate should be suppressed before scoring.
    #[must_use]
    pub fn is_whitelisted(&self, candidate: &str, context: Option<FieldContext>) -> bool {
        if let Some(context) = context {
            if self.matches_context(candidate, context) {
                return true;
            }
        }
        self.is_generic_safe(candidate)
    }

    /// Full anchored match of the candidate against its context pattern.
    #[must_use]
    pub fn matches_context(&self, candidate: &str, context: FieldContext) -> bool {
        match context {
            FieldContext::Email => self.email.is_match(candidate),
            FieldContext::Username => self.username.is_match(candidate),
            FieldContext::Uuid => self.uuid.is_match(candidate),
            FieldContext::Date => self.date.is_match(candidate),
            FieldContext::Url => Self::is_canonical_url(candidate),
            FieldContext::Number => self.number.is_match(candidate),
            FieldContext::Name => self.name.is_match(candidate),
        }
    }

    fn is_generic_safe(&self, candidate: &str) -> bool {
        if self.alphanumeric.is_match(candidate) {
            return true;
        }

        let trimmed = candidate.trim();
        if SAFE_WORDS.iter().any(|w| trimmed.eq_ignore_ascii_case(w)) {
            return true;
        }

        self.is_prose(candidate)
    }

    /// Prose: more than three space-separated plain words, none of the
    /// structural characters used by injection payloads.
    fn is_prose(&self, candidate: &str) -> bool {
        if candidate.contains(STRUCTURAL_CHARS) {
            return false;
        }
        let words: Vec<&str> = candidate.split_whitespace().collect();
        words.len() > 3 && words.iter().all(|w| self.prose_word.is_match(w))
    }

    /// A canonical URL: well-formed http(s) with a named public host.
    /// Loopback, private, and IP-literal hosts do not qualify, so SSRF
    /// payloads in a url field still reach the scorer.
    fn is_canonical_url(candidate: &str) -> bool {
        let Ok(parsed) = Url::parse(candidate) else {
            return false;
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        if host.eq_ignore_ascii_case("localhost") || host.parse::<std::net::IpAddr>().is_ok() {
            return false;
        }
        host.contains('.')
    }
}

impl Default for WhitelistFilter {
    fn default() -> Self {
        Self::new()
    }
}
