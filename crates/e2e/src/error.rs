//! Error types for E2E conformance runs

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("No translation output within {waited_ms} ms")]
    TranslationTimeout { waited_ms: u64 },

    #[error("Output mismatch: expected {expected:?}, got {actual:?}")]
    AssertionMismatch { expected: String, actual: String },

    #[error("No partial translation after typing {partial:?}")]
    PartialOutputMissing { partial: String },

    #[error("Re-entering the same input changed the output from {first:?} to {second:?}")]
    NotIdempotent { first: String, second: String },

    #[error("Case exceeded its {0} ms budget")]
    CaseTimeout(u64),

    #[error("Target unreachable: {0}")]
    Setup(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Fixture error: {0}")]
    Fixture(#[from] swiftcheck_common::FixtureError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Report-level classification of why a fixture failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    ElementNotFound,
    TranslationTimeout,
    AssertionMismatch,
    Infrastructure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Navigation => write!(f, "navigation"),
            FailureKind::ElementNotFound => write!(f, "element-not-found"),
            FailureKind::TranslationTimeout => write!(f, "translation-timeout"),
            FailureKind::AssertionMismatch => write!(f, "assertion-mismatch"),
            FailureKind::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

impl E2eError {
    pub fn kind(&self) -> FailureKind {
        match self {
            E2eError::Navigation { .. } | E2eError::Setup(_) => FailureKind::Navigation,
            E2eError::ElementNotFound(_) => FailureKind::ElementNotFound,
            E2eError::TranslationTimeout { .. } | E2eError::CaseTimeout(_) => {
                FailureKind::TranslationTimeout
            }
            E2eError::AssertionMismatch { .. }
            | E2eError::PartialOutputMissing { .. }
            | E2eError::NotIdempotent { .. } => FailureKind::AssertionMismatch,
            _ => FailureKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let nav = E2eError::Navigation {
            url: "https://example.test".into(),
            reason: "HTTP 503".into(),
        };
        assert_eq!(nav.kind(), FailureKind::Navigation);
        assert_eq!(E2eError::CaseTimeout(100).kind(), FailureKind::TranslationTimeout);
        assert_eq!(E2eError::Bridge("eof".into()).kind(), FailureKind::Infrastructure);
        assert_eq!(FailureKind::ElementNotFound.to_string(), "element-not-found");
    }
}
