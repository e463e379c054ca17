//! Error types for FlowReplay

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using the FlowReplay Error
pub type Result<T> = std::result::Result<T, Error>;

/// One failed candidate from an `any` fallback attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFailure {
    /// Position in the candidate list (0-based)
    pub index: usize,
    /// Human-readable selector description
    pub selector: String,
    /// Why this candidate was rejected
    pub reason: String,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.index, self.selector, self.reason)
    }
}

/// FlowReplay error taxonomy
#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema error at {location}: {message}")]
    Schema {
        message: String,
        location: String,
        line: Option<usize>,
    },

    #[error("Variable error: {0}")]
    Var(String),

    #[error("No element matches {0}")]
    NoMatch(String),

    #[error("Selector {selector} matched {count} elements (strict mode)")]
    Ambiguous { selector: String, count: usize },

    #[error("Timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    #[error("All {} selector candidates failed:\n{}", .0.len(), format_candidates(.0))]
    AllCandidatesFailed(Vec<CandidateFailure>),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Unknown step '{name}'. Registered steps: [{registered}]")]
    UnknownStep { name: String, registered: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn format_candidates(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}", f))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Shorthand for a schema error without a source location.
    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema {
            message: message.into(),
            location: "document".to_string(),
            line: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_candidates_failed_lists_every_attempt_in_order() {
        let err = Error::AllCandidatesFailed(vec![
            CandidateFailure {
                index: 0,
                selector: "testId='save'".into(),
                reason: "no match".into(),
            },
            CandidateFailure {
                index: 1,
                selector: "role='button', name='Save'".into(),
                reason: "2 matches (strict violation)".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("All 2 selector candidates failed"));
        let first = text.find("testId='save'").unwrap();
        let second = text.find("role='button'").unwrap();
        assert!(first < second);
    }
}
