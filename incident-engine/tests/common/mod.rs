//! Shared fakes for incident-engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use incident_engine::audit::{AuditEvent, AuditEventType};
use incident_engine::ports::{ApStats, AuditSink, MetricsApi, NewTicket, TicketUpdate, TicketingApi};
use incident_engine::{
    Collaborators, CollaboratorError, EngineConfig, IncidentLifecycle, ManualClock,
    RemediationHistoryStore, SharedHistoryStore,
};

pub const RULES: &str = r#"
thresholds:
  critical_bound: 60
  high_bound: 70
  medium_bound: 80
guardrails:
  min_clients: 3
  min_reboot_interval: 1800
  max_daily_reboots: 3
validation:
  stabilization_delay: 60
  poll_interval: 60
  max_attempts: 5
  threshold_score: 90
zendesk:
  priority_map:
    critical: urgent
    high: high
    medium: normal
    low: normal
"#;

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
}

pub fn config() -> EngineConfig {
    EngineConfig::from_yaml_str(RULES).unwrap()
}

pub fn stats(client_count: u32) -> ApStats {
    ApStats {
        client_count,
        online: true,
        uptime_secs: 86_400,
        cpu_util: Some(35.0),
        mem_util: Some(48.0),
        version: Some("0.14.29543".into()),
        model: Some("AP43".into()),
        ip: Some("10.20.0.42".into()),
    }
}

// ── Metrics ──────────────────────────────────────────────────────────────────

struct ApScript {
    stats: Result<ApStats, CollaboratorError>,
    scores: VecDeque<f64>,
    last_score: f64,
    reboot: Result<(), CollaboratorError>,
}

/// Scripted metrics API: per-AP stats, a score sequence and a reboot result.
#[derive(Default)]
pub struct FakeMetrics {
    aps: Mutex<HashMap<String, ApScript>>,
    reboots: Mutex<Vec<String>>,
    cancel_after_reboot: Mutex<Option<CancellationToken>>,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ap(self, ap_id: &str, stats: ApStats, scores: Vec<f64>) -> Self {
        self.aps.lock().unwrap().insert(
            ap_id.to_string(),
            ApScript {
                stats: Ok(stats),
                scores: scores.into(),
                last_score: 0.0,
                reboot: Ok(()),
            },
        );
        self
    }

    pub fn failing_stats(self, ap_id: &str) -> Self {
        self.script(ap_id, |s| {
            s.stats = Err(CollaboratorError::Transport("mist API unreachable".into()))
        });
        self
    }

    pub fn failing_reboot(self, ap_id: &str) -> Self {
        self.script(ap_id, |s| {
            s.reboot = Err(CollaboratorError::Rejected {
                service: "mist",
                status: 409,
                message: "device busy".into(),
            })
        });
        self
    }

    /// Fire `cancel` as soon as a reboot succeeds.
    pub fn cancel_after_reboot(self, cancel: CancellationToken) -> Self {
        *self.cancel_after_reboot.lock().unwrap() = Some(cancel);
        self
    }

    fn script(&self, ap_id: &str, f: impl FnOnce(&mut ApScript)) {
        let mut aps = self.aps.lock().unwrap();
        let script = aps.entry(ap_id.to_string()).or_insert_with(|| ApScript {
            stats: Ok(stats(15)),
            scores: VecDeque::new(),
            last_score: 0.0,
            reboot: Ok(()),
        });
        f(script);
    }

    pub fn reboot_calls(&self) -> Vec<String> {
        self.reboots.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsApi for FakeMetrics {
    async fn get_ap_stats(&self, ap_id: &str) -> Result<ApStats, CollaboratorError> {
        let aps = self.aps.lock().unwrap();
        match aps.get(ap_id) {
            Some(script) => script.stats.clone(),
            None => Err(CollaboratorError::NotFound(ap_id.to_string())),
        }
    }

    async fn get_sle_score(&self, ap_id: &str, _sle_type: &str) -> Result<f64, CollaboratorError> {
        let mut aps = self.aps.lock().unwrap();
        let script = aps
            .get_mut(ap_id)
            .ok_or_else(|| CollaboratorError::NotFound(ap_id.to_string()))?;
        if let Some(score) = script.scores.pop_front() {
            script.last_score = score;
        }
        Ok(script.last_score)
    }

    async fn reboot(&self, ap_id: &str) -> Result<(), CollaboratorError> {
        // Give a concurrent pipeline a chance to run mid-reboot.
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        let result = {
            let aps = self.aps.lock().unwrap();
            aps.get(ap_id)
                .map(|s| s.reboot.clone())
                .unwrap_or_else(|| Err(CollaboratorError::NotFound(ap_id.to_string())))
        };
        if result.is_ok() {
            self.reboots.lock().unwrap().push(ap_id.to_string());
            if let Some(cancel) = self.cancel_after_reboot.lock().unwrap().as_ref() {
                cancel.cancel();
            }
        }
        result
    }
}

// ── Ticketing ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TicketCall {
    Create(NewTicket),
    Update(String, TicketUpdate),
}

#[derive(Default)]
pub struct RecordingTicketing {
    calls: Mutex<Vec<TicketCall>>,
    fail: bool,
}

impl RecordingTicketing {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<TicketCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<TicketUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TicketCall::Update(_, update) => Some(update),
                TicketCall::Create(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl TicketingApi for RecordingTicketing {
    async fn create(&self, ticket: &NewTicket) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Transport("zendesk unreachable".into()));
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(TicketCall::Create(ticket.clone()));
        Ok(format!("ZD-{}", 1000 + calls.len()))
    }

    async fn update(&self, ticket_id: &str, update: &TicketUpdate) -> Result<(), CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Transport("zendesk unreachable".into()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(TicketCall::Update(ticket_id.to_string(), update.clone()));
        Ok(())
    }
}

// ── Audit ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn types(&self) -> Vec<AuditEventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn emit(&self, event: &AuditEvent) -> Result<(), CollaboratorError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

pub struct Harness {
    pub lifecycle: Arc<IncidentLifecycle>,
    pub metrics: Arc<FakeMetrics>,
    pub ticketing: Arc<RecordingTicketing>,
    pub audit: Arc<RecordingAudit>,
    pub store: SharedHistoryStore,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: EngineConfig, metrics: FakeMetrics) -> Self {
        Self::with_ticketing(config, metrics, RecordingTicketing::default())
    }

    pub fn with_ticketing(
        config: EngineConfig,
        metrics: FakeMetrics,
        ticketing: RecordingTicketing,
    ) -> Self {
        let metrics = Arc::new(metrics);
        let ticketing = Arc::new(ticketing);
        let audit = Arc::new(RecordingAudit::default());
        let store = RemediationHistoryStore::in_memory().shared();
        let clock = ManualClock::shared(noon());

        let lifecycle = IncidentLifecycle::new(
            Arc::new(config),
            Collaborators {
                metrics: metrics.clone(),
                ticketing: ticketing.clone(),
                audit: audit.clone(),
            },
            store.clone(),
            clock.clone(),
        )
        .unwrap();

        Self {
            lifecycle: Arc::new(lifecycle),
            metrics,
            ticketing,
            audit,
            store,
            clock,
        }
    }
}
