//! File-backed collaborators for the agent: audit events and ticket actions
//! appended as JSON lines.
//!
//! Audit lines use the HTTP Event Collector envelope so the file can be
//! replayed straight into Splunk:
//!
//! ```json
//! {"time":1749556800.0,"host":"sle-agent","source":"mist_automation",
//!  "sourcetype":"mist:sle:remediation","event":{...}}
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use incident_engine::ports::{NewTicket, TicketUpdate};
use incident_engine::{AuditEvent, AuditSink, CollaboratorError, TicketingApi};

use crate::config::SinkSettings;

// ── JSONL writer ─────────────────────────────────────────────────────────────

/// Append-only JSON-lines destination: a file, or an in-memory buffer when
/// no path is given.
pub struct JsonlLog {
    path: Option<PathBuf>,
    lines: Mutex<Vec<Value>>,
}

impl JsonlLog {
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Lines held in memory. Always empty for a file-backed log.
    pub fn lines(&self) -> Vec<Value> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn append(&self, record: &impl Serialize) -> Result<(), CollaboratorError> {
        let value = serde_json::to_value(record)
            .map_err(|e| CollaboratorError::Transport(format!("serialize: {e}")))?;
        // The lock also serializes file appends so lines never interleave.
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(path) = &self.path else {
            lines.push(value);
            return Ok(());
        };
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CollaboratorError::Transport(format!("{}: {e}", path.display())))?;
        writeln!(file, "{value}")
            .map_err(|e| CollaboratorError::Transport(format!("{}: {e}", path.display())))
    }
}

// ── Audit ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HecEnvelope<'a> {
    time: f64,
    host: &'a str,
    source: &'a str,
    sourcetype: &'static str,
    event: &'a AuditEvent,
}

/// [`AuditSink`] writing HEC-shaped JSON lines.
pub struct JsonlAuditSink {
    log: JsonlLog,
    settings: SinkSettings,
}

impl JsonlAuditSink {
    pub fn new(log: JsonlLog, settings: SinkSettings) -> Self {
        Self { log, settings }
    }

    pub fn log(&self) -> &JsonlLog {
        &self.log
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn emit(&self, event: &AuditEvent) -> Result<(), CollaboratorError> {
        let envelope = HecEnvelope {
            time: event.timestamp.timestamp_millis() as f64 / 1000.0,
            host: &self.settings.host,
            source: &self.settings.source,
            sourcetype: event.event_type.sourcetype(),
            event,
        };
        self.log.append(&envelope)?;
        debug!(
            incident_id = %event.incident_id,
            event_type = event.event_type.as_str(),
            "audit event written"
        );
        Ok(())
    }
}

// ── Ticketing ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum TicketRecord<'a> {
    Create {
        ticket_id: &'a str,
        ticket: &'a NewTicket,
    },
    Update {
        ticket_id: &'a str,
        update: &'a TicketUpdate,
    },
}

/// [`TicketingApi`] that assigns sequential ids and records every call.
pub struct JsonlTicketing {
    log: JsonlLog,
    next_id: AtomicU64,
}

impl JsonlTicketing {
    const FIRST_ID: u64 = 10_001;

    pub fn new(log: JsonlLog) -> Self {
        Self {
            log,
            next_id: AtomicU64::new(Self::FIRST_ID),
        }
    }

    pub fn log(&self) -> &JsonlLog {
        &self.log
    }
}

#[async_trait]
impl TicketingApi for JsonlTicketing {
    async fn create(&self, ticket: &NewTicket) -> Result<String, CollaboratorError> {
        let ticket_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        self.log.append(&TicketRecord::Create {
            ticket_id: &ticket_id,
            ticket,
        })?;
        info!(ticket_id = %ticket_id, subject = %ticket.subject, "ticket created");
        Ok(ticket_id)
    }

    async fn update(&self, ticket_id: &str, update: &TicketUpdate) -> Result<(), CollaboratorError> {
        self.log.append(&TicketRecord::Update { ticket_id, update })?;
        info!(ticket_id, status = ?update.status, "ticket updated");
        Ok(())
    }
}
