//! Audit trail for incident processing.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Lifecycle   │────▶│   AuditBus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │  AuditSink   │
//!                      │ (Splunk etc) │
//!                      └──────────────┘
//! ```
//!
//! Events are best-effort: a failing sink is logged and never blocks the
//! incident pipeline.

pub mod bus;
pub mod types;

pub use bus::{AuditBus, SharedAuditBus};
pub use types::{AuditEvent, AuditEventType};
