//! Audit event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Pipeline stage an audit event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Detection,
    Diagnostics,
    Remediation,
    Validation,
    TicketAction,
    WorkflowComplete,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detection => "detection",
            Self::Diagnostics => "diagnostics",
            Self::Remediation => "remediation",
            Self::Validation => "validation",
            Self::TicketAction => "ticket_action",
            Self::WorkflowComplete => "workflow_complete",
        }
    }

    /// Splunk sourcetype for this stage.
    pub fn sourcetype(self) -> &'static str {
        match self {
            Self::Detection => "mist:sle:detection",
            Self::Diagnostics => "mist:sle:diagnostics",
            Self::Remediation => "mist:sle:remediation",
            Self::Validation => "mist:sle:validation",
            Self::TicketAction => "mist:sle:ticketing",
            Self::WorkflowComplete => "mist:sle:workflow",
        }
    }
}

/// One structured audit record. `payload` is flat: nested objects are
/// folded into dotted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    pub incident_id: Uuid,
    pub ap_id: String,
    pub sle_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        incident_id: Uuid,
        ap_id: impl Into<String>,
        sle_type: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            timestamp,
            incident_id,
            ap_id: ap_id.into(),
            sle_type: sle_type.into(),
            payload: Map::new(),
        }
    }

    /// Add one field. Objects are flattened under `key`.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        insert_flat(&mut self.payload, key, to_value(value));
        self
    }

    /// Merge every field of a serializable struct into the payload.
    pub fn with_fields(mut self, value: impl Serialize) -> Self {
        match to_value(value) {
            Value::Object(fields) => {
                for (key, value) in fields {
                    insert_flat(&mut self.payload, &key, value);
                }
            }
            Value::Null => {}
            other => {
                self.payload.insert("value".to_string(), other);
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>")))
}

fn insert_flat(payload: &mut Map<String, Value>, key: &str, value: Value) {
    match value {
        Value::Object(fields) => {
            for (child, value) in fields {
                insert_flat(payload, &format!("{key}.{child}"), value);
            }
        }
        Value::Null => {}
        value => {
            payload.insert(key.to_string(), value);
        }
    }
}
