//! Collaborator interfaces.
//!
//! The engine talks to the wireless controller, the ticketing system and the
//! audit log only through these traits. Concrete HTTP clients live outside
//! the engine; tests and the agent supply their own implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audit::AuditEvent;
use crate::error::CollaboratorError;
use crate::severity::TicketPriority;

/// Point-in-time statistics for one access point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApStats {
    pub client_count: u32,
    pub online: bool,
    #[serde(default)]
    pub uptime_secs: u64,
    #[serde(default)]
    pub cpu_util: Option<f64>,
    #[serde(default)]
    pub mem_util: Option<f64>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Wireless metrics and control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn get_ap_stats(&self, ap_id: &str) -> Result<ApStats, CollaboratorError>;

    /// Current SLE score (0–100) of `sle_type` on `ap_id`.
    async fn get_sle_score(&self, ap_id: &str, sle_type: &str) -> Result<f64, CollaboratorError>;

    async fn reboot(&self, ap_id: &str) -> Result<(), CollaboratorError>;
}

/// Ticket status values the ticketing system understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    New,
    Pending,
    Solved,
}

/// Payload for ticket creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub subject: String,
    pub body: String,
    pub priority: TicketPriority,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Partial ticket update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WireStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// External ticketing system.
#[async_trait]
pub trait TicketingApi: Send + Sync {
    /// Create a ticket and return its id.
    async fn create(&self, ticket: &NewTicket) -> Result<String, CollaboratorError>;

    async fn update(&self, ticket_id: &str, update: &TicketUpdate)
        -> Result<(), CollaboratorError>;
}

/// Destination for structured audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: &AuditEvent) -> Result<(), CollaboratorError>;
}

pub type SharedMetrics = Arc<dyn MetricsApi>;
pub type SharedTicketing = Arc<dyn TicketingApi>;
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Audit sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn emit(&self, _event: &AuditEvent) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
