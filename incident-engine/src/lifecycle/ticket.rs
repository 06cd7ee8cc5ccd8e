//! Ticket projection of an incident.
//!
//! The engine never reads tickets back. It keeps a local view of what it
//! has told the ticketing system and refuses to move that view backwards:
//! `New → Pending → {Solved | Escalated}`.
//!
//! The ticketing system has no "escalated" status. Escalation is sent as an
//! update without a status change and with an `escalated` tag.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TicketingConfig;
use crate::ports::{NewTicket, WireStatus};
use crate::severity::TicketPriority;
use crate::validation::ValidationOutcome;

use super::state::Incident;

pub const ESCALATED_TAG: &str = "escalated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    Pending,
    Solved,
    Escalated,
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Solved | Self::Escalated)
    }

    /// Status to put on the wire; `None` means leave it unchanged.
    pub fn wire(self) -> Option<WireStatus> {
        match self {
            Self::New => Some(WireStatus::New),
            Self::Pending => Some(WireStatus::Pending),
            Self::Solved => Some(WireStatus::Solved),
            Self::Escalated => None,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Pending => write!(f, "pending"),
            Self::Solved => write!(f, "solved"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal ticket transition: {from} → {to}")]
pub struct TicketTransitionError {
    pub from: TicketStatus,
    pub to: TicketStatus,
}

/// What the engine believes the ticket looks like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketStateView {
    pub ticket_id: Option<String>,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub tags: Vec<String>,
}

impl TicketStateView {
    pub fn new(priority: TicketPriority, tags: Vec<String>) -> Self {
        Self {
            ticket_id: None,
            status: TicketStatus::New,
            priority,
            tags,
        }
    }

    /// Advance the status; only forward moves are accepted.
    pub fn advance(&mut self, to: TicketStatus) -> Result<(), TicketTransitionError> {
        use TicketStatus::*;

        let legal = matches!(
            (self.status, to),
            (New, Pending) | (New, Escalated) | (Pending, Solved) | (Pending, Escalated)
        );
        if !legal {
            return Err(TicketTransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to == Escalated && !self.tags.iter().any(|t| t == ESCALATED_TAG) {
            self.tags.push(ESCALATED_TAG.to_string());
        }
        Ok(())
    }
}

/// Tags for a new ticket: fixed markers, then SLE type and AP id.
pub fn ticket_tags(config: &TicketingConfig, incident: &Incident) -> Vec<String> {
    let mut tags = config.tags.clone();
    for extra in [&incident.sle_type, &incident.ap_id] {
        if !tags.contains(extra) {
            tags.push(extra.clone());
        }
    }
    tags
}

pub fn new_ticket(
    config: &TicketingConfig,
    incident: &Incident,
    priority: TicketPriority,
    source: &str,
) -> NewTicket {
    let body = format!(
        "**Automated SLE Detection Alert**\n\n\
         - **Access Point**: {}\n\
         - **SLE Metric**: {}\n\
         - **Severity**: {}\n\
         - **Detection Time**: {}\n\
         - **Source**: {}\n\n\
         Automated remediation workflow has been initiated.",
        incident.ap_id,
        incident.sle_type,
        incident.severity,
        incident.detection_time.to_rfc3339(),
        source,
    );

    NewTicket {
        subject: format!(
            "Mist SLE Failure: {} on AP {}",
            incident.sle_type, incident.ap_id
        ),
        body,
        priority,
        tags: ticket_tags(config, incident),
        group: config.group.clone(),
    }
}

pub fn resolution_comment(outcome: &ValidationOutcome) -> String {
    let mut comment = String::from("**Automated Resolution**\n\n");
    if let Some(score) = outcome.final_score {
        comment.push_str(&format!("- **Final Score**: {score:.1}\n"));
    }
    if let Some(mttr) = outcome.mttr() {
        comment.push_str(&format!("- **MTTR**: {}s\n", mttr.as_secs()));
    }
    comment.push_str(&format!(
        "- **Validation Attempts**: {}\n\nSLE restored to acceptable levels.",
        outcome.attempts.len()
    ));
    comment
}

pub fn escalation_comment(reason: &str, last_score: Option<f64>) -> String {
    let mut comment = format!("**Escalated to on-call**\n\n- **Reason**: {reason}\n");
    if let Some(score) = last_score {
        comment.push_str(&format!("- **Last Observed Score**: {score:.1}\n"));
    }
    comment.push_str("\nAutomated remediation stopped; manual investigation required.");
    comment
}
