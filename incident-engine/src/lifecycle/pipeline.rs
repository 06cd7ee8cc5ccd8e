//! Incident pipeline: drives one detection from `Detected` to a terminal state.
//!
//! ```text
//! IncidentLifecycle::process(detection, cancel)
//!   → classify, audit `detection`
//!   → Diagnosing   : create ticket, set pending           audit `ticket_action`
//!   → fetch AP stats, guardrails + action under one history lease
//!       ├─ Blocked      : ticket escalated                 audit `diagnostics`
//!       └─ Remediating  : ticket comment                   audit `diagnostics`
//!   → Validating | Escalated                               audit `remediation`
//!   → Restored (ticket solved) | Escalated                 audit `validation`
//!   → audit `workflow_complete`
//! ```
//!
//! A cancel that lands before dispatch ends the incident in `Blocked` with
//! reason `cancelled`; once the action is out, it only cuts validation short.
//!
//! Ticketing and audit calls are best-effort: failures are logged, recorded
//! on the report, and the pipeline carries on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{AuditBus, AuditEvent, AuditEventType, SharedAuditBus};
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::diagnostics::DiagnosticReport;
use crate::error::ConfigError;
use crate::guardrails::{BlockReason, GuardrailDecision, GuardrailEvaluator};
use crate::history::SharedHistoryStore;
use crate::ports::{SharedAuditSink, SharedMetrics, SharedTicketing, TicketUpdate};
use crate::remediation::{ActionSelector, RemediationExecutor, RemediationResult};
use crate::severity::{Grading, SeverityClassifier};
use crate::validation::{ValidationOutcome, ValidationPoller};

use super::state::{IllegalTransition, Incident, IncidentState};
use super::ticket::{self, TicketStateView, TicketStatus, TicketTransitionError, ESCALATED_TAG};

// ── Inputs ───────────────────────────────────────────────────────────────────

/// An SLE failure signal for one access point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub ap_id: String,
    pub sle_type: String,
    pub score: f64,
    /// Defaults to the time the pipeline picks the detection up.
    #[serde(default)]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "splunk".to_string()
}

impl Detection {
    pub fn new(ap_id: impl Into<String>, sle_type: impl Into<String>, score: f64) -> Self {
        Self {
            ap_id: ap_id.into(),
            sle_type: sle_type.into(),
            score,
            detected_at: None,
            source: default_source(),
        }
    }
}

/// External services the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub metrics: SharedMetrics,
    pub ticketing: SharedTicketing,
    pub audit: SharedAuditSink,
}

// ── Outputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Transition(#[from] IllegalTransition),

    #[error(transparent)]
    Ticket(#[from] TicketTransitionError),
}

/// Everything that happened to one incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub incident: Incident,
    pub grading: Grading,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<GuardrailDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
    pub ticket: TicketStateView,
    /// Best-effort collaborator failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl IncidentReport {
    pub fn final_state(&self) -> IncidentState {
        self.incident.current_state
    }

    /// Escalated to a human, whether by guardrail or by failure.
    pub fn is_escalated(&self) -> bool {
        matches!(
            self.final_state(),
            IncidentState::Blocked | IncidentState::Escalated
        )
    }

    pub fn mttr(&self) -> Option<Duration> {
        self.validation.as_ref().and_then(ValidationOutcome::mttr)
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

pub struct IncidentLifecycle {
    config: Arc<EngineConfig>,
    classifier: SeverityClassifier,
    selector: ActionSelector,
    executor: RemediationExecutor,
    poller: ValidationPoller,
    metrics: SharedMetrics,
    ticketing: SharedTicketing,
    audit: SharedAuditBus,
    clock: SharedClock,
}

impl IncidentLifecycle {
    pub fn new(
        config: Arc<EngineConfig>,
        collaborators: Collaborators,
        store: SharedHistoryStore,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = SeverityClassifier::from_config(&config)?;
        let selector = ActionSelector::from_config(&config);
        let executor = RemediationExecutor::new(
            collaborators.metrics.clone(),
            GuardrailEvaluator::new(config.guardrails.clone()),
            store,
            clock.clone(),
        );
        let poller = ValidationPoller::new(
            collaborators.metrics.clone(),
            clock.clone(),
            config.validation.clone(),
        );

        Ok(Self {
            config,
            classifier,
            selector,
            executor,
            poller,
            metrics: collaborators.metrics,
            ticketing: collaborators.ticketing,
            audit: AuditBus::new(collaborators.audit).shared(),
            clock,
        })
    }

    pub fn audit_bus(&self) -> SharedAuditBus {
        self.audit.clone()
    }

    pub fn subscribe_audit(&self) -> broadcast::Receiver<AuditEvent> {
        self.audit.subscribe()
    }

    /// Run one detection through to a terminal state.
    pub async fn process(
        &self,
        detection: Detection,
        cancel: CancellationToken,
    ) -> Result<IncidentReport, LifecycleError> {
        let now = self.clock.now();
        let grading = self.classifier.grade(detection.score, &detection.sle_type);
        let incident = Incident::new(
            detection.ap_id.as_str(),
            detection.sle_type.as_str(),
            grading.severity,
            detection.detected_at.unwrap_or(now),
        );
        let ticket = TicketStateView::new(
            grading.priority,
            ticket::ticket_tags(&self.config.ticketing, &incident),
        );

        info!(
            incident = %incident.id,
            ap_id = %incident.ap_id,
            sle_type = %incident.sle_type,
            score = detection.score,
            severity = %grading.severity,
            "incident opened"
        );

        let mut run = Run {
            report: IncidentReport {
                incident,
                grading,
                diagnostics: None,
                decision: None,
                remediation: None,
                validation: None,
                ticket,
                warnings: Vec::new(),
            },
            detection_score: detection.score,
        };

        let event = self
            .event(&run.report.incident, AuditEventType::Detection)
            .with("score", detection.score)
            .with("severity", grading.severity)
            .with("priority", grading.priority)
            .with("source", &detection.source);
        self.audit.publish(event).await;

        self.open_ticket(&mut run, &detection.source).await?;

        let Some(client_count) = self.diagnose(&mut run).await else {
            return self.finish(run).await;
        };

        let action = self.selector.select(&run.report.incident.sle_type);
        let guarded = self
            .executor
            .guarded_execute(&run.report.incident.ap_id, client_count, action, &cancel)
            .await;
        run.report.decision = Some(guarded.decision.clone());

        let result = match (guarded.result, guarded.decision.reason.clone()) {
            (Some(result), _) => result,
            (None, Some(reason)) => {
                self.block(&mut run, reason).await?;
                return self.finish(run).await;
            }
            (None, None) => return self.finish(run).await,
        };

        self.transition(&mut run, IncidentState::Remediating, Some(action.as_str()))?;
        let event = self
            .event(&run.report.incident, AuditEventType::Diagnostics)
            .with_fields(&run.report.diagnostics)
            .with("decision", &guarded.decision)
            .with("action", action);
        self.audit.publish(event).await;
        let comment = format!(
            "Guardrails passed; dispatching {action}.\n\n{}",
            run.report
                .diagnostics
                .as_ref()
                .map(DiagnosticReport::summary)
                .unwrap_or_default()
        );
        self.update_ticket(&mut run, None, comment).await?;

        let dispatched = result.is_success();
        run.report.remediation = Some(result.clone());
        if dispatched {
            self.transition(&mut run, IncidentState::Validating, Some(result.detail.as_str()))?;
            let event = self
                .event(&run.report.incident, AuditEventType::Remediation)
                .with_fields(&result);
            self.audit.publish(event).await;
            self.update_ticket(
                &mut run,
                None,
                format!("{}. Validating recovery.", result.detail),
            )
            .await?;
        } else {
            self.transition(&mut run, IncidentState::Escalated, Some(result.detail.as_str()))?;
            let event = self
                .event(&run.report.incident, AuditEventType::Remediation)
                .with_fields(&result);
            self.audit.publish(event).await;
            let comment = ticket::escalation_comment(&result.detail, Some(run.detection_score));
            self.update_ticket(&mut run, Some(TicketStatus::Escalated), comment)
                .await?;
            return self.finish(run).await;
        }

        let outcome = self.poller.poll(&run.report.incident, &cancel).await;
        run.report.validation = Some(outcome.clone());
        let event = self
            .event(&run.report.incident, AuditEventType::Validation)
            .with("status", outcome.status)
            .with("final_score", outcome.final_score)
            .with("attempts", outcome.attempts.len())
            .with("elapsed_secs", outcome.elapsed_duration.as_secs_f64())
            .with("cancelled", outcome.cancelled);

        if outcome.is_restored() {
            self.transition(&mut run, IncidentState::Restored, None)?;
            self.audit.publish(event).await;
            let comment = ticket::resolution_comment(&outcome);
            self.update_ticket(&mut run, Some(TicketStatus::Solved), comment)
                .await?;
        } else {
            let reason = if outcome.cancelled {
                format!(
                    "validation cancelled after {} attempt(s)",
                    outcome.attempts.len()
                )
            } else {
                format!(
                    "SLE not restored after {} validation attempts",
                    outcome.attempts.len()
                )
            };
            self.transition(&mut run, IncidentState::Escalated, Some(reason.as_str()))?;
            self.audit.publish(event).await;
            let comment = ticket::escalation_comment(&reason, outcome.final_score);
            self.update_ticket(&mut run, Some(TicketStatus::Escalated), comment)
                .await?;
        }

        self.finish(run).await
    }

    // ── Stages ───────────────────────────────────────────────────────────────

    async fn open_ticket(&self, run: &mut Run, source: &str) -> Result<(), LifecycleError> {
        self.transition(run, IncidentState::Diagnosing, None)?;

        let request = ticket::new_ticket(
            &self.config.ticketing,
            &run.report.incident,
            run.report.grading.priority,
            source,
        );
        match self.ticketing.create(&request).await {
            Ok(id) => {
                info!(incident = %run.report.incident.id, ticket_id = %id, "ticket created");
                run.report.incident.ticket_id = Some(id.clone());
                run.report.ticket.ticket_id = Some(id);
            }
            Err(e) => {
                warn!(incident = %run.report.incident.id, error = %e, "ticket creation failed");
                run.report.warnings.push(format!("ticket create: {e}"));
            }
        }

        let event = self
            .event(&run.report.incident, AuditEventType::TicketAction)
            .with("action", "created")
            .with("ticket_id", &run.report.incident.ticket_id)
            .with("priority", run.report.grading.priority);
        self.audit.publish(event).await;

        self.update_ticket(
            run,
            Some(TicketStatus::Pending),
            "Collecting AP diagnostics.".to_string(),
        )
        .await
    }

    /// Gather AP stats. `None` means the incident has been blocked.
    async fn diagnose(&self, run: &mut Run) -> Option<u32> {
        let ap_id = run.report.incident.ap_id.clone();
        match self.metrics.get_ap_stats(&ap_id).await {
            Ok(stats) => {
                let report = DiagnosticReport::from_stats(
                    &ap_id,
                    &run.report.incident.sle_type,
                    &stats,
                    self.config.guardrails.min_reboot_interval,
                    self.clock.now(),
                );
                debug!(
                    incident = %run.report.incident.id,
                    clients = stats.client_count,
                    online = stats.online,
                    "diagnostics collected"
                );
                run.report.diagnostics = Some(report);
                Some(stats.client_count)
            }
            Err(e) => {
                warn!(incident = %run.report.incident.id, error = %e, "diagnostics unavailable");
                let reason = BlockReason::DiagnosticsUnavailable {
                    error: e.to_string(),
                };
                run.report.decision = Some(GuardrailDecision::block(reason.clone()));
                if let Err(e) = self.block(run, reason).await {
                    // Diagnosing → Blocked is always legal here.
                    run.report.warnings.push(e.to_string());
                }
                None
            }
        }
    }

    async fn block(&self, run: &mut Run, reason: BlockReason) -> Result<(), LifecycleError> {
        let message = reason.to_string();
        warn!(
            incident = %run.report.incident.id,
            ap_id = %run.report.incident.ap_id,
            reason = reason.code(),
            "remediation blocked by guardrails"
        );
        self.transition(run, IncidentState::Blocked, Some(reason.code()))?;

        let decision = GuardrailDecision::block(reason);
        let event = self
            .event(&run.report.incident, AuditEventType::Diagnostics)
            .with_fields(&run.report.diagnostics)
            .with("decision", &decision)
            .with("reason", &message);
        self.audit.publish(event).await;

        let comment = ticket::escalation_comment(&message, Some(run.detection_score));
        self.update_ticket(run, Some(TicketStatus::Escalated), comment)
            .await
    }

    async fn finish(&self, run: Run) -> Result<IncidentReport, LifecycleError> {
        let report = run.report;
        let incident = &report.incident;
        let event = self
            .event(incident, AuditEventType::WorkflowComplete)
            .with("status", incident.current_state)
            .with("severity", incident.severity)
            .with("ticket_id", &incident.ticket_id)
            .with("mttr_secs", report.mttr().map(|d| d.as_secs_f64()))
            .with(
                "attempts",
                report.validation.as_ref().map_or(0, |v| v.attempts.len()),
            )
            .with(
                "final_score",
                report.validation.as_ref().and_then(|v| v.final_score),
            )
            .with(
                "remediation_outcome",
                report.remediation.as_ref().map(|r| r.outcome),
            )
            .with("path", incident.path());
        self.audit.publish(event).await;

        if report.is_escalated() {
            warn!(
                incident = %incident.id,
                ap_id = %incident.ap_id,
                state = %incident.current_state,
                "incident escalated"
            );
        } else {
            info!(
                incident = %incident.id,
                ap_id = %incident.ap_id,
                mttr_secs = ?report.mttr().map(|d| d.as_secs()),
                "incident resolved"
            );
        }
        Ok(report)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn transition(
        &self,
        run: &mut Run,
        to: IncidentState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        let now = self.clock.now();
        run.report.incident.advance(to, reason, now)?;
        Ok(())
    }

    fn event(&self, incident: &Incident, event_type: AuditEventType) -> AuditEvent {
        AuditEvent::new(
            event_type,
            incident.id,
            incident.ap_id.as_str(),
            incident.sle_type.as_str(),
            self.clock.now(),
        )
    }

    /// Advance the local ticket view and push one update.
    async fn update_ticket(
        &self,
        run: &mut Run,
        status: Option<TicketStatus>,
        comment: String,
    ) -> Result<(), LifecycleError> {
        if let Some(to) = status {
            run.report.ticket.advance(to)?;
        }

        let Some(ticket_id) = run.report.ticket.ticket_id.clone() else {
            debug!(incident = %run.report.incident.id, "no ticket; update skipped");
            return Ok(());
        };

        let update = TicketUpdate {
            status: status.and_then(TicketStatus::wire),
            comment: Some(comment),
            tags: if status == Some(TicketStatus::Escalated) {
                vec![ESCALATED_TAG.to_string()]
            } else {
                Vec::new()
            },
        };
        if let Err(e) = self.ticketing.update(&ticket_id, &update).await {
            warn!(
                incident = %run.report.incident.id,
                ticket_id = %ticket_id,
                error = %e,
                "ticket update failed"
            );
            run.report.warnings.push(format!("ticket update: {e}"));
        }
        Ok(())
    }
}

/// Mutable state threaded through one `process` call.
struct Run {
    report: IncidentReport,
    detection_score: f64,
}
