//! Scenario runner: wires file-backed collaborators into the engine and fans
//! detections out across tasks.
//!
//! ```text
//!   Scenario ──► ScriptedMetrics ─┐
//!   AgentSettings ──► sinks ──────┼──► IncidentLifecycle
//!                    history ─────┘         │
//!   JoinSet::spawn(process(detection_i)) × N
//!                                           ▼
//!                               RunSummary (reports in input order)
//! ```
//!
//! `time_scale: instant` replays on a runtime with paused tokio time (see
//! [`runtime_for`]). Every incident reads the same [`SystemClock`] anchored at
//! the scenario start, and the runtime jumps straight to the next timer once
//! all tasks are idle. Concurrent pollers therefore wait side by side instead
//! of stacking their delays.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use incident_engine::{
    Collaborators, EngineConfig, IncidentLifecycle, IncidentReport, RemediationHistoryStore,
    SharedClock, SystemClock,
};

use crate::config::AgentSettings;
use crate::history_file::JsonFileHistory;
use crate::scenario::{Scenario, TimeScale};
use crate::sinks::{JsonlAuditSink, JsonlLog, JsonlTicketing};

/// Result of replaying one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// One report per detection that reached a terminal state, in input order.
    pub reports: Vec<IncidentReport>,
    /// Detections that aborted with an engine error.
    pub failures: Vec<String>,
    /// Audit events the sink refused during the run.
    pub audit_sink_failures: u64,
}

impl RunSummary {
    pub fn escalated(&self) -> usize {
        self.reports.iter().filter(|r| r.is_escalated()).count()
    }

    /// True when any incident needs a human or any detection aborted.
    pub fn needs_attention(&self) -> bool {
        self.escalated() > 0 || !self.failures.is_empty()
    }
}

/// Everything a run needs, assembled from settings and a scenario.
pub struct AgentRuntime {
    pub lifecycle: Arc<IncidentLifecycle>,
}

impl AgentRuntime {
    pub async fn build(
        config: Arc<EngineConfig>,
        scenario: &Scenario,
        settings: &AgentSettings,
    ) -> Result<Self> {
        let store = match &settings.history_path {
            Some(path) => RemediationHistoryStore::with_persistence(Arc::new(JsonFileHistory::new(
                path,
            )))
            .with_context(|| format!("Failed to open history {}", path.display()))?,
            None => RemediationHistoryStore::in_memory(),
        }
        .shared();
        for (ap_id, history) in &scenario.history {
            store.seed(ap_id, history.clone()).await;
        }

        let clock: SharedClock = match scenario.time_scale {
            TimeScale::Instant => Arc::new(SystemClock::starting_at(
                scenario.start.unwrap_or_else(Utc::now),
            )),
            TimeScale::Real => SystemClock::shared(),
        };

        let collaborators = Collaborators {
            metrics: Arc::new(scenario.metrics()),
            ticketing: Arc::new(JsonlTicketing::new(log_for(settings.ticket_log.as_ref()))),
            audit: Arc::new(JsonlAuditSink::new(
                log_for(settings.audit_log.as_ref()),
                settings.sinks.clone(),
            )),
        };

        let lifecycle = IncidentLifecycle::new(config, collaborators, store, clock)
            .context("Failed to build incident lifecycle")?;

        Ok(Self {
            lifecycle: Arc::new(lifecycle),
        })
    }

    /// Process every detection concurrently until each reaches a terminal
    /// state or `cancel` fires.
    pub async fn run(
        &self,
        scenario: &Scenario,
        settings: &AgentSettings,
        cancel: CancellationToken,
    ) -> RunSummary {
        let watchdog = settings.run_timeout.map(|timeout| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!(timeout_secs = timeout.as_secs(), "run timeout reached, cancelling");
                cancel.cancel();
            })
        });

        let mut join_set = JoinSet::new();
        for (index, detection) in scenario.detections.iter().cloned().enumerate() {
            let lifecycle = self.lifecycle.clone();
            let cancel = cancel.child_token();
            join_set.spawn(async move { (index, lifecycle.process(detection, cancel).await) });
        }

        let mut slots: Vec<Option<IncidentReport>> = vec![None; scenario.detections.len()];
        let mut failures = Vec::new();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((index, Ok(report))) => {
                    debug!(
                        index,
                        incident = %report.incident.id,
                        state = %report.final_state(),
                        "detection finished"
                    );
                    slots[index] = Some(report);
                }
                Ok((index, Err(e))) => {
                    warn!(index, error = %e, "detection aborted");
                    failures.push(format!("detection {index}: {e}"));
                }
                Err(e) => {
                    warn!(error = %e, "incident task panicked");
                    failures.push(format!("task failed: {e}"));
                }
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let summary = RunSummary {
            reports: slots.into_iter().flatten().collect(),
            failures,
            audit_sink_failures: self.lifecycle.audit_bus().sink_failures(),
        };
        if summary.audit_sink_failures > 0 {
            warn!(
                refused = summary.audit_sink_failures,
                "audit sink refused events during the run"
            );
        }
        info!(
            incidents = summary.reports.len(),
            escalated = summary.escalated(),
            failures = summary.failures.len(),
            "scenario complete"
        );
        summary
    }
}

/// Runtime suited to `time_scale`. Instant replays get a single-threaded
/// runtime with paused time; real runs get the multi-threaded scheduler.
pub fn runtime_for(time_scale: TimeScale) -> std::io::Result<tokio::runtime::Runtime> {
    match time_scale {
        TimeScale::Instant => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build(),
        TimeScale::Real => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build(),
    }
}

fn log_for(path: Option<&std::path::PathBuf>) -> JsonlLog {
    match path {
        Some(path) => JsonlLog::to_file(path),
        None => JsonlLog::in_memory(),
    }
}

/// Build a runtime for `scenario` and replay it.
///
/// Instant scenarios must run on a runtime with paused time, such as the one
/// from [`runtime_for`]; otherwise their waits take real time.
pub async fn run_scenario(
    config: Arc<EngineConfig>,
    scenario: &Scenario,
    settings: &AgentSettings,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let runtime = AgentRuntime::build(config, scenario, settings).await?;
    Ok(runtime.run(scenario, settings, cancel).await)
}
