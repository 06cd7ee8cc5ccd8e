//! Error taxonomy for the incident engine.
//!
//! Only genuinely exceptional conditions live here. A guardrail block or a
//! validation timeout is a decision, carried on [`GuardrailDecision`] and
//! [`ValidationOutcome`] respectively, so callers can match on it.
//!
//! | Type                 | Raised by                       | Effect                         |
//! |----------------------|---------------------------------|--------------------------------|
//! | `ConfigError`        | config load / classifier build  | fatal at startup               |
//! | `CollaboratorError`  | metrics, ticketing, audit ports | per-call; logged or escalated  |
//! | `HistoryError`       | history persistence backend     | logged, in-memory state stands |
//!
//! [`GuardrailDecision`]: crate::guardrails::GuardrailDecision
//! [`ValidationOutcome`]: crate::validation::ValidationOutcome

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Malformed or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required configuration key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },

    #[error(
        "severity thresholds must be strictly ascending \
         (critical {critical} < high {high} < medium {medium})"
    )]
    UnorderedThresholds { critical: f64, high: f64, medium: f64 },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Failure reported by an external collaborator (metrics, ticketing, audit).
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Connection refused, DNS failure, TLS error and the like.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered but refused the request.
    #[error("{service} rejected request ({status}): {message}")]
    Rejected {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl CollaboratorError {
    /// Short machine-readable code for audit payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Rejected { .. } => "rejected",
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Failure in the remediation-history persistence backend.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to load remediation history: {0}")]
    Load(String),

    #[error("failed to persist remediation history for {ap_id}: {message}")]
    Persist { ap_id: String, message: String },
}
