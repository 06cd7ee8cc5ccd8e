//! Remediation Executor: dispatch an approved action and record it.
//!
//! Only `reboot` is wired to a collaborator. The other action kinds are part
//! of the closed action set so that strategies can name them, but executing
//! them yields [`RemediationOutcome::NotSupported`] without side effects.
//!
//! [`RemediationExecutor::guarded_execute`] holds the device's history lease
//! across evaluate, act and write-back. Two triggers for one AP therefore
//! observe each other's history and at most one of them reboots. A trigger
//! whose cancel token fired while it waited for the lease is blocked before
//! anything is dispatched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::guardrails::{BlockReason, GuardrailDecision, GuardrailEvaluator};
use crate::history::{HistoryLease, SharedHistoryStore};
use crate::ports::SharedMetrics;

/// Closed set of remediation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    Reboot,
    WlanReset,
    #[serde(alias = "rrm", alias = "rrm_adjustment")]
    RrmAdjust,
}

impl RemediationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::WlanReset => "wlan_reset",
            Self::RrmAdjust => "rrm_adjust",
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcome {
    Success,
    Failure,
    NotSupported,
}

impl fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::NotSupported => write!(f, "not_supported"),
        }
    }
}

/// What happened when an action was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationResult {
    pub ap_id: String,
    pub action: RemediationAction,
    pub outcome: RemediationOutcome,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl RemediationResult {
    pub fn is_success(&self) -> bool {
        self.outcome == RemediationOutcome::Success
    }
}

/// Picks the action for an SLE type from configured strategies.
#[derive(Debug, Clone, Default)]
pub struct ActionSelector {
    strategies: std::collections::HashMap<String, RemediationAction>,
}

impl ActionSelector {
    pub fn from_config(config: &EngineConfig) -> Self {
        let strategies = config
            .remediation
            .strategies
            .iter()
            .filter_map(|(sle_type, entries)| {
                entries
                    .iter()
                    .min_by_key(|entry| entry.priority)
                    .map(|entry| (sle_type.clone(), entry.action))
            })
            .collect();
        Self { strategies }
    }

    /// Lowest-priority-number strategy for `sle_type`, else `reboot`.
    pub fn select(&self, sle_type: &str) -> RemediationAction {
        self.strategies
            .get(sle_type)
            .copied()
            .unwrap_or(RemediationAction::Reboot)
    }
}

/// Guardrail verdict plus the dispatch result when the verdict was Allow.
#[derive(Debug, Clone)]
pub struct GuardedRemediation {
    pub decision: GuardrailDecision,
    pub result: Option<RemediationResult>,
}

pub struct RemediationExecutor {
    metrics: SharedMetrics,
    evaluator: GuardrailEvaluator,
    store: SharedHistoryStore,
    clock: SharedClock,
}

impl RemediationExecutor {
    pub fn new(
        metrics: SharedMetrics,
        evaluator: GuardrailEvaluator,
        store: SharedHistoryStore,
        clock: SharedClock,
    ) -> Self {
        Self {
            metrics,
            evaluator,
            store,
            clock,
        }
    }

    /// Evaluate guardrails and, if allowed, run `action` under one lease.
    pub async fn guarded_execute(
        &self,
        ap_id: &str,
        client_count: u32,
        action: RemediationAction,
        cancel: &CancellationToken,
    ) -> GuardedRemediation {
        let mut lease = self.store.lease(ap_id).await;
        let decision = if cancel.is_cancelled() {
            warn!(ap_id, %action, "cancelled before dispatch");
            GuardrailDecision::block(BlockReason::Cancelled)
        } else {
            self.evaluator
                .evaluate(ap_id, lease.history(), client_count, self.clock.now())
        };
        if !decision.allowed {
            return GuardedRemediation {
                decision,
                result: None,
            };
        }
        let result = self.execute(&mut lease, action).await;
        GuardedRemediation {
            decision,
            result: Some(result),
        }
    }

    /// Dispatch `action` against the leased device. No retry.
    pub async fn execute(
        &self,
        lease: &mut HistoryLease,
        action: RemediationAction,
    ) -> RemediationResult {
        let ap_id = lease.ap_id().to_string();
        let (outcome, detail) = match action {
            RemediationAction::Reboot => match self.metrics.reboot(&ap_id).await {
                Ok(()) => {
                    let mut detail = format!("AP {ap_id} reboot initiated");
                    if let Err(e) = lease.record_action(self.clock.now()) {
                        detail.push_str(&format!(" (history not persisted: {e})"));
                    }
                    info!(ap_id = %ap_id, %action, "remediation dispatched");
                    (RemediationOutcome::Success, detail)
                }
                Err(e) => {
                    warn!(ap_id = %ap_id, %action, error = %e, "remediation failed");
                    (RemediationOutcome::Failure, format!("{action} failed: {e}"))
                }
            },
            RemediationAction::WlanReset | RemediationAction::RrmAdjust => {
                warn!(ap_id = %ap_id, %action, "remediation action not supported");
                (
                    RemediationOutcome::NotSupported,
                    format!("action {action} is not supported"),
                )
            }
        };

        RemediationResult {
            ap_id,
            action,
            outcome,
            detail,
            timestamp: self.clock.now(),
        }
    }
}
