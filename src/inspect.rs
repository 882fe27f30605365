//! Request inspection.
//!
//! Implements the pattern-matching and confidence-scoring pipeline that
//! turns raw request fields into typed threats.

pub mod corpus;
pub mod extract;
pub mod scorer;
pub mod threat;
pub mod whitelist;

pub use corpus::{PatternCorpus, RULES};
pub use extract::{Signal, extract_signals};
pub use scorer::{ConfidenceScorer, confidence_for};
pub use threat::{SecurityThreat, Severity, ThreatCategory};
pub use whitelist::{FieldContext, WhitelistFilter};
