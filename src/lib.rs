//! Library definitions.
//!
//! Exports the detection engine, its configuration, and the threat and
//! request types consumed by callers.

pub mod config;
pub mod engine;
pub mod features;
pub mod inspect;
pub mod profile;
pub mod request;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use config::{Config, EngineError, Result};
pub use engine::DetectionEngine;
pub use features::webhook::{EventType, WebhookNotifier, WebhookPayload};
pub use inspect::threat::{SecurityThreat, Severity, ThreatCategory};
pub use inspect::whitelist::FieldContext;
pub use profile::velocity::RequestHistoryEntry;
pub use request::RequestView;
