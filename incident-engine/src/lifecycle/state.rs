//! Incident state model and legal transition guards.
//!
//! Every incident starts at `Detected` and ends at one of the terminal
//! states `Blocked`, `Restored` or `Escalated`. Nothing leaves a terminal
//! state, so a duplicate event for a finished incident is an error rather
//! than a silent second ticket update.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    /// Detection received, nothing done yet.
    Detected,
    /// Ticket open, gathering AP statistics and consulting guardrails.
    Diagnosing,
    /// Guardrails refused remediation; handed to a human. Terminal.
    Blocked,
    /// Action dispatched.
    Remediating,
    /// Polling for recovery.
    Validating,
    /// SLE recovered. Terminal.
    Restored,
    /// Remediation or validation failed. Terminal.
    Escalated,
}

impl IncidentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Blocked | Self::Restored | Self::Escalated)
    }
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detected => write!(f, "Detected"),
            Self::Diagnosing => write!(f, "Diagnosing"),
            Self::Blocked => write!(f, "Blocked"),
            Self::Remediating => write!(f, "Remediating"),
            Self::Validating => write!(f, "Validating"),
            Self::Restored => write!(f, "Restored"),
            Self::Escalated => write!(f, "Escalated"),
        }
    }
}

/// ```text
/// Detected    → Diagnosing
/// Diagnosing  → Blocked | Remediating
/// Remediating → Validating | Escalated
/// Validating  → Restored | Escalated
/// ```
fn is_legal_transition(from: IncidentState, to: IncidentState) -> bool {
    use IncidentState::*;

    matches!(
        (from, to),
        (Detected, Diagnosing)
            | (Diagnosing, Blocked)
            | (Diagnosing, Remediating)
            | (Remediating, Validating)
            // Failure or unsupported action
            | (Remediating, Escalated)
            | (Validating, Restored)
            | (Validating, Escalated)
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: IncidentState,
    pub to: IncidentState,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal incident transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: IncidentState,
    pub to: IncidentState,
}

/// An incident opened for one detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub ap_id: String,
    pub sle_type: String,
    pub detection_time: DateTime<Utc>,
    pub severity: Severity,
    pub ticket_id: Option<String>,
    pub current_state: IncidentState,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl Incident {
    pub fn new(
        ap_id: impl Into<String>,
        sle_type: impl Into<String>,
        severity: Severity,
        detection_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ap_id: ap_id.into(),
            sle_type: sle_type.into(),
            detection_time,
            severity,
            ticket_id: None,
            current_state: IncidentState::Detected,
            transitions: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.current_state.is_terminal()
    }

    /// Move to `to`, recording the transition.
    pub fn advance(
        &mut self,
        to: IncidentState,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<&TransitionRecord, IllegalTransition> {
        let from = self.current_state;
        if !is_legal_transition(from, to) {
            return Err(IllegalTransition { from, to });
        }

        tracing::debug!(
            incident = %self.id,
            ap_id = %self.ap_id,
            from = %from,
            to = %to,
            "incident transition"
        );

        self.current_state = to;
        self.transitions.push(TransitionRecord {
            from,
            to,
            at,
            reason: reason.map(String::from),
        });
        Ok(&self.transitions[self.transitions.len() - 1])
    }

    /// `Detected → … → current` as a single line.
    pub fn path(&self) -> String {
        std::iter::once(IncidentState::Detected)
            .chain(self.transitions.iter().map(|t| t.to))
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" → ")
    }
}
