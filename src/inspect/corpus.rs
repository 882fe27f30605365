//! Detection rule corpus.
//!
//! All rules live in one flat table so tests can enumerate and validate
//! every pattern independently of the scoring algorithm. At startup the
//! table is compiled into per-category matchers: literal patterns into a
//! case-insensitive Aho-Corasick automaton, regex patterns into a
//! `RegexSet`.

use crate::inspect::threat::ThreatCategory;
use aho_corasick::AhoCorasick;
use regex::RegexSet;
use tracing::debug;

/// One detection rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleDef {
    pub category: ThreatCategory,
    pub pattern: &'static str,
    /// Regex pattern when true, literal substring otherwise.
    pub regex: bool,
    /// A single match of an override rule is treated as definitive.
    pub override_rule: bool,
}

const fn lit(category: ThreatCategory, pattern: &'static str) -> RuleDef {
    RuleDef {
        category,
        pattern,
        regex: false,
        override_rule: false,
    }
}

const fn rx(category: ThreatCategory, pattern: &'static str) -> RuleDef {
    RuleDef {
        category,
        pattern,
        regex: true,
        override_rule: false,
    }
}

const fn lit_override(category: ThreatCategory, pattern: &'static str) -> RuleDef {
    RuleDef {
        category,
        pattern,
        regex: false,
        override_rule: true,
    }
}

const fn rx_override(category: ThreatCategory, pattern: &'static str) -> RuleDef {
    RuleDef {
        category,
        pattern,
        regex: true,
        override_rule: true,
    }
}

use ThreatCategory::{
    CommandInjection, NoSqlInjection, PathTraversal, Polyglot, Ssrf, SqlInjection,
    UnicodeEvasion, Xss, Xxe,
};

/// The full rule table.
pub const RULES: &[RuleDef] = &[
    // SQL injection
    lit(SqlInjection, "/*"),
    lit(SqlInjection, "--"),
    lit(SqlInjection, "@@"),
    lit(SqlInjection, "' or "),
    lit(SqlInjection, "\" or "),
    lit(SqlInjection, "waitfor delay"),
    lit(SqlInjection, "information_schema"),
    lit(SqlInjection, "sqlite_master"),
    lit_override(SqlInjection, "xp_cmdshell"),
    rx_override(SqlInjection, r"(?i)\bunion\s+(all\s+|distinct\s+)?select\b"),
    rx_override(SqlInjection, r"(?i);\s*(drop|delete|truncate|shutdown)\b"),
    rx(
        SqlInjection,
        r"(?i)\b(select|insert|update|delete|drop|truncate|alter)\b[\s\S]*\b(from|into|table|database|set|where)\b",
    ),
    rx(SqlInjection, r"(?i)\b(or|and)\b\s*'?\d+'?\s*=\s*'?\d+"),
    rx(SqlInjection, r"(?i)'\s*(or|and)\s*'"),
    rx(SqlInjection, r"(?i)\b(sleep|benchmark|pg_sleep)\s*\("),
    rx(SqlInjection, r"(?i)\border\s+by\s+\d+\s*(--|#)"),
    // NoSQL injection
    lit(NoSqlInjection, "$ne"),
    lit(NoSqlInjection, "$gt"),
    lit(NoSqlInjection, "$lt"),
    lit(NoSqlInjection, "$regex"),
    lit(NoSqlInjection, "$nin"),
    lit(NoSqlInjection, "$exists"),
    lit(NoSqlInjection, "$elemmatch"),
    lit_override(NoSqlInjection, "$where"),
    rx(
        NoSqlInjection,
        r#"(?i)[\{,]\s*"?\$(ne|eq|gt|gte|lt|lte|in|nin|or|and|not|where|regex|exists|type|mod|text|search)\b"#,
    ),
    rx(NoSqlInjection, r"(?i)\bthis\.[a-z_$][\w$]*\s*(==|!=|<|>)"),
    rx_override(
        NoSqlInjection,
        r"(?i)\bdb\.[a-z_]+\.(find|findone|insert|update|remove|drop|aggregate)\s*\(",
    ),
    // Command injection
    lit(CommandInjection, "$("),
    lit(CommandInjection, "`"),
    lit(CommandInjection, "/bin/sh"),
    lit(CommandInjection, "/bin/bash"),
    lit(CommandInjection, "/dev/tcp"),
    lit(CommandInjection, "2>&1"),
    lit(CommandInjection, "&&"),
    lit(CommandInjection, "||"),
    rx(
        CommandInjection,
        r"(?i);\s*(cat|ls|id|whoami|pwd|uname|ifconfig|ipconfig|netstat|nc|ncat|netcat|bash|sh|zsh|python|perl|ruby|php|curl|wget|ping|sleep|echo|rm)\b",
    ),
    rx(
        CommandInjection,
        r"(?i)\|\s*(cat|nc|ncat|netcat|bash|sh|zsh|python|perl|curl|wget|tee|base64)\b",
    ),
    rx(
        CommandInjection,
        r"(?i)&&\s*(cat|ls|id|whoami|rm|curl|wget|chmod)\b",
    ),
    rx_override(CommandInjection, r"(?i)\brm\s+-rf?\b"),
    rx_override(CommandInjection, r"(?i)\$\{IFS\}"),
    rx_override(CommandInjection, r"(?i)\b(wget|curl)\b.+\|\s*(ba)?sh\b"),
    rx(CommandInjection, r"(?i)\b(chmod|chown)\s+[0-7]{3,4}\b"),
    rx(CommandInjection, r"(?i)\bpython(3)?\s+-c\b"),
    // XSS
    lit_override(Xss, "<script"),
    lit(Xss, "</script"),
    lit(Xss, "javascript:"),
    lit(Xss, "document.cookie"),
    lit(Xss, "onerror="),
    lit(Xss, "onload="),
    lit(Xss, "<iframe"),
    lit(Xss, "<svg"),
    lit(Xss, "alert("),
    lit(Xss, "eval("),
    rx_override(Xss, r"(?i)<script[^>]*>"),
    rx(Xss, r"(?i)\bon\w+\s*="),
    rx(Xss, r"(?i)(javascript|vbscript|livescript)\s*:"),
    rx(Xss, r"(?i)<\s*(iframe|object|embed|applet|meta|link|form)\b"),
    rx(Xss, r"(?i)\b(document|window)\s*\.\s*(location|cookie|write|open)\b"),
    rx(Xss, r"(?i)\bexpression\s*\("),
    rx(Xss, r#"(?i)src\s*=\s*['"]?\s*(javascript|data):"#),
    // Path traversal
    lit(PathTraversal, "../"),
    lit(PathTraversal, "..\\"),
    lit(PathTraversal, "/proc/self"),
    lit(PathTraversal, "c:\\windows"),
    lit(PathTraversal, "boot.ini"),
    lit(PathTraversal, "web.config"),
    lit(PathTraversal, "%2e%2e"),
    lit(PathTraversal, "\0"),
    lit_override(PathTraversal, "/etc/passwd"),
    lit_override(PathTraversal, "/etc/shadow"),
    rx(PathTraversal, r"(?i)(\.\./){2,}|(\.\.\\){2,}"),
    rx(PathTraversal, r"(?i)%2e%2e(%2f|%5c|/|\\)"),
    rx(PathTraversal, r"(?i)(%c0%ae|%c1%9c|%e0%80%ae)"),
    rx(PathTraversal, r"(?i)/etc/(hosts|group|fstab|issue|motd)\b"),
    rx(PathTraversal, r"(?i)\.\.(%2f|%5c)"),
    // XXE
    lit(Xxe, "<!doctype"),
    lit(Xxe, "<![cdata["),
    lit_override(Xxe, "<!entity"),
    rx_override(Xxe, r"(?i)<!entity\s+\S+\s+(system|public)\b"),
    rx_override(Xxe, r#"(?i)system\s+['"](file|http|https|ftp|php|expect|jar|netdoc):"#),
    rx(Xxe, r"(?i)<!doctype\s+[^>]*\["),
    rx(Xxe, r"(?i)%\w+;\s*\]>"),
    // SSRF
    lit_override(Ssrf, "169.254.169.254"),
    lit_override(Ssrf, "metadata.google.internal"),
    lit(Ssrf, "file://"),
    lit(Ssrf, "gopher://"),
    lit(Ssrf, "dict://"),
    lit(Ssrf, "ldap://"),
    lit(Ssrf, "tftp://"),
    lit(Ssrf, "localhost"),
    lit(Ssrf, "127.0.0.1"),
    lit(Ssrf, "0.0.0.0"),
    rx(
        Ssrf,
        r"(?i)\bhttps?://(localhost|127\.0\.0\.1|\[?::1\]?|0\.0\.0\.0|0x7f000001)",
    ),
    rx(Ssrf, r"(?i)\bhttps?://10\.\d{1,3}\.\d{1,3}\.\d{1,3}"),
    rx(Ssrf, r"(?i)\bhttps?://192\.168\.\d{1,3}\.\d{1,3}"),
    rx(Ssrf, r"(?i)\bhttps?://172\.(1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}"),
    rx(Ssrf, r"(?i)\bhttps?://\d{8,10}\b"),
    rx(Ssrf, r"(?i)@(localhost|127\.0\.0\.1|\[::1\])"),
    // Unicode and homoglyph evasion
    rx(UnicodeEvasion, r"[\x{FF01}-\x{FF5E}]{2,}"),
    rx(UnicodeEvasion, r"[\x{200B}-\x{200F}\x{202A}-\x{202E}\x{2060}\x{FEFF}]"),
    rx(UnicodeEvasion, r"(?i)%u00[0-9a-f]{2}"),
    rx(
        UnicodeEvasion,
        r"[\x{0430}\x{0435}\x{043E}\x{0440}\x{0441}\x{0443}\x{0445}\x{0456}][a-zA-Z]|[a-zA-Z][\x{0430}\x{0435}\x{043E}\x{0440}\x{0441}\x{0443}\x{0445}\x{0456}]",
    ),
    rx(
        UnicodeEvasion,
        r"(?i)[\x{2018}\x{2019}\x{02BC}\x{FF07}]\s*(or|and|union|select)\b",
    ),
    rx(UnicodeEvasion, r"(?i)\\u00(27|22|3c|3e)"),
    // Polyglot: each pattern demands markers of two or more attack classes
    rx(Polyglot, r"(?i)(--|#|;)\s*<(script|img|svg|iframe)"),
    rx(Polyglot, r#"(?i)['"]\s*(or|and)\b.*<(script|img|svg|iframe)"#),
    rx(
        Polyglot,
        r"(?i)\b(union|select|insert|update)\b.*(<script|onerror|onload|javascript:)",
    ),
    rx(Polyglot, r"(?i)(\bor\b|\band\b)\s+\d+\s*=\s*\d+.*(<|%3c)"),
    rx(Polyglot, r"(?i)(\.\./|%2e%2e).*(<script|alert\s*\(|javascript:)"),
    rx(Polyglot, r"(?i)(<script|javascript:).*(\.\./|/etc/passwd)"),
    rx(Polyglot, r"(?i)(\$\(|`).*(<script|\bselect\b|\bunion\b)"),
    rx(Polyglot, r"(?i)(file|gopher|dict)://.*(<|>|')"),
];

/// Categories scanned per candidate, in reporting order.
pub const SCAN_ORDER: &[ThreatCategory] = &[
    SqlInjection,
    NoSqlInjection,
    CommandInjection,
    Xss,
    PathTraversal,
    Xxe,
    Ssrf,
    UnicodeEvasion,
    Polyglot,
];

/// Match result of one candidate against one category.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOutcome {
    /// Number of distinct rules that matched.
    pub matched: u32,
    /// Whether any matching rule is an override rule.
    pub override_hit: bool,
}

struct CategorySet {
    category: ThreatCategory,
    ac: Option<AhoCorasick>,
    lit_overrides: Vec<bool>,
    regexes: RegexSet,
    rx_overrides: Vec<bool>,
}

impl CategorySet {
    fn build(category: ThreatCategory) -> Self {
        let mut lit_patterns = Vec::new();
        let mut lit_overrides = Vec::new();
        let mut rx_patterns = Vec::new();
        let mut rx_overrides = Vec::new();

        for rule in RULES.iter().filter(|r| r.category == category) {
            if rule.regex {
                rx_patterns.push(rule.pattern);
                rx_overrides.push(rule.override_rule);
            } else {
                lit_patterns.push(rule.pattern);
                lit_overrides.push(rule.override_rule);
            }
        }

        let ac = if lit_patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .ascii_case_insensitive(true)
                    .build(&lit_patterns)
                    .expect("Failed to build Aho-Corasick automaton"),
            )
        };
        let regexes = RegexSet::new(&rx_patterns).expect("Failed to build RegexSet");

        Self {
            category,
            ac,
            lit_overrides,
            regexes,
            rx_overrides,
        }
    }

    fn matches(&self, candidate: &str) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();

        if let Some(ac) = &self.ac {
            let mut seen = vec![false; self.lit_overrides.len()];
            for mat in ac.find_iter(candidate) {
                seen[mat.pattern().as_usize()] = true;
            }
            for (idx, hit) in seen.iter().enumerate() {
                if *hit {
                    outcome.matched += 1;
                    outcome.override_hit |= self.lit_overrides[idx];
                }
            }
        }

        for idx in self.regexes.matches(candidate) {
            outcome.matched += 1;
            outcome.override_hit |= self.rx_overrides[idx];
        }

        outcome
    }
}

/// Compiled corpus, built once at engine construction.
pub struct PatternCorpus {
    categories: Vec<CategorySet>,
}

impl PatternCorpus {
    /// Compiles the rule table.
    ///
    /// # Panics
    ///
    /// Panics if any built-in rule contains an invalid regex pattern
    /// (compile-time invariant).
    #[must_use]
    pub fn new() -> Self {
        let categories = SCAN_ORDER
            .iter()
            .map(|&category| CategorySet::build(category))
            .collect::<Vec<_>>();
        debug!(rules = RULES.len(), categories = categories.len(), "Corpus compiled");
        Self { categories }
    }

    /// Evaluates one candidate against every category, returning only
    /// categories with at least one match.
    #[must_use]
    pub fn evaluate(&self, candidate: &str) -> Vec<(ThreatCategory, MatchOutcome)> {
        self.categories
            .iter()
            .filter_map(|set| {
                let outcome = set.matches(candidate);
                (outcome.matched > 0).then_some((set.category, outcome))
            })
            .collect()
    }
}

impl Default for PatternCorpus {
    fn default() -> Self {
        Self::new()
    }
}
