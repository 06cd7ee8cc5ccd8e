//! Validation Poller: confirm recovery after remediation.
//!
//! ```text
//!  stabilization_delay   poll_interval   poll_interval
//! |───────────────────|1|─────────────|2|─────────────|3| ... |max_attempts|
//! ```
//!
//! An attempt succeeds when `score >= threshold_score` and the AP is online.
//! The first success ends the loop with `Restored`; running out of attempts
//! ends it with `TimedOut`.
//!
//! Every wait races the cancellation token. A cancelled poll still makes one
//! observation if none has been made yet, and always reports `TimedOut`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::duration_secs;
use crate::lifecycle::Incident;
use crate::ports::SharedMetrics;

/// Polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(with = "duration_secs", default = "default_stabilization_delay")]
    pub stabilization_delay: Duration,
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub threshold_score: f64,
}

fn default_stabilization_delay() -> Duration {
    Duration::from_secs(60)
}

/// One observation of the remediated AP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    /// 1-based.
    pub attempt_number: u32,
    pub score: f64,
    pub ap_online: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationAttempt {
    pub fn meets(&self, threshold: f64) -> bool {
        self.ap_online && self.score >= threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Restored,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    pub final_score: Option<f64>,
    pub attempts: Vec<ValidationAttempt>,
    /// Time from detection to the last observation.
    #[serde(with = "duration_secs")]
    pub elapsed_duration: Duration,
    #[serde(default)]
    pub cancelled: bool,
}

impl ValidationOutcome {
    pub fn is_restored(&self) -> bool {
        self.status == ValidationStatus::Restored
    }

    /// Mean time to recovery, only defined for a restored incident.
    pub fn mttr(&self) -> Option<Duration> {
        self.is_restored().then_some(self.elapsed_duration)
    }

    pub fn last_attempt(&self) -> Option<&ValidationAttempt> {
        self.attempts.last()
    }
}

pub struct ValidationPoller {
    metrics: SharedMetrics,
    clock: SharedClock,
    config: ValidationConfig,
}

impl ValidationPoller {
    pub fn new(metrics: SharedMetrics, clock: SharedClock, config: ValidationConfig) -> Self {
        Self {
            metrics,
            clock,
            config,
        }
    }

    /// Poll until the incident's SLE recovers, attempts run out, or `cancel` fires.
    pub async fn poll(&self, incident: &Incident, cancel: &CancellationToken) -> ValidationOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let threshold = self.config.threshold_score;
        let mut attempts = Vec::with_capacity(max_attempts as usize);

        let mut cancelled = !self.wait(self.config.stabilization_delay, cancel).await;
        if cancelled {
            debug!(incident = %incident.id, "validation cancelled during stabilization");
        }

        let mut status = ValidationStatus::TimedOut;
        for attempt_number in 1..=max_attempts {
            let attempt = self.observe(incident, attempt_number).await;
            info!(
                incident = %incident.id,
                ap_id = %incident.ap_id,
                attempt = attempt_number,
                max_attempts,
                score = attempt.score,
                online = attempt.ap_online,
                "validation attempt"
            );
            let met = attempt.meets(threshold);
            attempts.push(attempt);

            if met && !cancelled {
                status = ValidationStatus::Restored;
                break;
            }
            if cancelled || attempt_number == max_attempts {
                break;
            }
            if !self.wait(self.config.poll_interval, cancel).await {
                cancelled = true;
                break;
            }
        }

        let elapsed_duration = (self.clock.now() - incident.detection_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let outcome = ValidationOutcome {
            status,
            final_score: attempts.last().map(|a| a.score),
            attempts,
            elapsed_duration,
            cancelled,
        };

        match outcome.status {
            ValidationStatus::Restored => info!(
                incident = %incident.id,
                attempts = outcome.attempts.len(),
                mttr_secs = elapsed_duration.as_secs(),
                "SLE restored"
            ),
            ValidationStatus::TimedOut => warn!(
                incident = %incident.id,
                attempts = outcome.attempts.len(),
                cancelled,
                final_score = ?outcome.final_score,
                "SLE not restored"
            ),
        }
        outcome
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.clock.sleep(duration) => true,
        }
    }

    async fn observe(&self, incident: &Incident, attempt_number: u32) -> ValidationAttempt {
        let (score, stats) = tokio::join!(
            self.metrics
                .get_sle_score(&incident.ap_id, &incident.sle_type),
            self.metrics.get_ap_stats(&incident.ap_id),
        );

        let mut errors = Vec::new();
        let score = score.unwrap_or_else(|e| {
            errors.push(format!("score: {e}"));
            0.0
        });
        let ap_online = match stats {
            Ok(stats) => stats.online,
            Err(e) => {
                errors.push(format!("stats: {e}"));
                false
            }
        };
        if !errors.is_empty() {
            warn!(incident = %incident.id, errors = ?errors, "validation fetch failed");
        }

        ValidationAttempt {
            attempt_number,
            score,
            ap_online,
            timestamp: self.clock.now(),
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        }
    }
}
