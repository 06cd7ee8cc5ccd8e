//! SLE Incident Engine
//!
//! Turns a wireless access-point SLE failure signal into a graded,
//! guardrail-checked remediation, confirms recovery by polling, and keeps an
//! external ticket in step with the incident.
//!
//! # Components
//!
//! - [`severity`]: score → severity → ticket priority
//! - [`guardrails`]: pure Allow/Block decision over per-device history
//! - [`history`]: per-device remediation history with per-key leases
//! - [`remediation`]: action selection and dispatch
//! - [`validation`]: bounded, cancellable recovery polling
//! - [`lifecycle`]: incident state machine and the end-to-end pipeline
//! - [`audit`]: structured audit events and the in-process audit bus
//!
//! External services are reached only through the traits in [`ports`].
//!
//! # Usage
//!
//! ```ignore
//! let config = Arc::new(EngineConfig::from_path("rules/sle_rules.yaml")?);
//! let lifecycle = IncidentLifecycle::new(
//!     config,
//!     Collaborators { metrics, ticketing, audit },
//!     RemediationHistoryStore::in_memory().shared(),
//!     SystemClock::shared(),
//! )?;
//! let report = lifecycle
//!     .process(Detection::new("ap-42", "throughput", 55.0), CancellationToken::new())
//!     .await?;
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod guardrails;
pub mod history;
pub mod lifecycle;
pub mod ports;
pub mod remediation;
pub mod severity;
pub mod validation;

pub use audit::{AuditBus, AuditEvent, AuditEventType};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::EngineConfig;
pub use error::{CollaboratorError, ConfigError, HistoryError};
pub use guardrails::{BlockReason, GuardrailDecision, GuardrailEvaluator};
pub use history::{RemediationHistory, RemediationHistoryStore, SharedHistoryStore};
pub use lifecycle::{
    Collaborators, Detection, Incident, IncidentLifecycle, IncidentReport, IncidentState,
};
pub use ports::{ApStats, AuditSink, MetricsApi, TicketingApi};
pub use remediation::{RemediationAction, RemediationOutcome, RemediationResult};
pub use severity::{Severity, SeverityClassifier, TicketPriority};
pub use validation::{ValidationOutcome, ValidationStatus};
