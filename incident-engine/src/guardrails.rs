//! Guardrail Evaluator: may an automated action run right now?
//!
//! Rules are evaluated in a fixed order and the first failing rule is the
//! reported reason. A reason therefore says nothing about later rules.
//!
//! 1. `client_count < min_clients`                       → insufficient_clients
//! 2. `now - last_action_time < min_reboot_interval`     → interval_not_elapsed
//! 3. `daily_count >= max_daily_reboots` (UTC day)       → daily_limit_reached
//! 4. enforcement on and local time outside `[start, end)` → outside_business_hours
//!
//! The evaluator is pure. History is only written by the executor.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::config::duration_secs;
use crate::history::RemediationHistory;

/// Safety preconditions for automated remediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub min_clients: u32,
    #[serde(with = "duration_secs")]
    pub min_reboot_interval: Duration,
    pub max_daily_reboots: u32,
    #[serde(default)]
    pub business_hours_only: bool,
    #[serde(default)]
    pub business_hours: BusinessHours,
}

/// Local-time window during which actions are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

fn default_timezone() -> Tz {
    Tz::UTC
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: default_timezone(),
        }
    }
}

impl BusinessHours {
    /// Whether `local` falls in `[start, end)`; windows with `start > end`
    /// wrap past midnight.
    pub fn contains(&self, local: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= local && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }
}

impl fmt::Display for BusinessHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} {}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M"),
            self.timezone
        )
    }
}

mod hhmm {
    use super::*;
    use serde::de::Error;

    pub fn serialize<S: Serializer>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(|e| D::Error::custom(format!("invalid time of day `{raw}`: {e}")))
    }
}

/// Why an action was blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum BlockReason {
    InsufficientClients {
        client_count: u32,
        min_clients: u32,
    },
    IntervalNotElapsed {
        remaining_secs: u64,
        min_interval_secs: u64,
    },
    DailyLimitReached {
        daily_count: u32,
        max_daily_reboots: u32,
    },
    OutsideBusinessHours {
        local_time: String,
        window: String,
    },
    /// AP statistics could not be fetched, so no rule could be checked.
    DiagnosticsUnavailable { error: String },
    /// The run was stopped before the action was dispatched.
    Cancelled,
}

impl BlockReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientClients { .. } => "insufficient_clients",
            Self::IntervalNotElapsed { .. } => "interval_not_elapsed",
            Self::DailyLimitReached { .. } => "daily_limit_reached",
            Self::OutsideBusinessHours { .. } => "outside_business_hours",
            Self::DiagnosticsUnavailable { .. } => "diagnostics_unavailable",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientClients {
                client_count,
                min_clients,
            } => write!(f, "client count {} below minimum {}", client_count, min_clients),
            Self::IntervalNotElapsed {
                remaining_secs,
                min_interval_secs,
            } => write!(
                f,
                "reboot interval not elapsed: {}s remaining of {}s",
                remaining_secs, min_interval_secs
            ),
            Self::DailyLimitReached {
                daily_count,
                max_daily_reboots,
            } => write!(
                f,
                "daily reboot limit reached ({} of {})",
                daily_count, max_daily_reboots
            ),
            Self::OutsideBusinessHours { local_time, window } => {
                write!(f, "outside business hours ({} not in {})", local_time, window)
            }
            Self::DiagnosticsUnavailable { error } => {
                write!(f, "diagnostics unavailable: {}", error)
            }
            Self::Cancelled => write!(f, "cancelled before remediation was dispatched"),
        }
    }
}

/// Allow/Block verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
}

impl GuardrailDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn block(reason: BlockReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }

    pub fn reason_code(&self) -> Option<&'static str> {
        self.reason.as_ref().map(BlockReason::code)
    }
}

/// Stateless rule evaluator.
#[derive(Debug, Clone)]
pub struct GuardrailEvaluator {
    config: GuardrailConfig,
}

impl GuardrailEvaluator {
    pub fn new(config: GuardrailConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardrailConfig {
        &self.config
    }

    /// Decide whether `ap_id` may be remediated at `now`.
    pub fn evaluate(
        &self,
        ap_id: &str,
        history: &RemediationHistory,
        client_count: u32,
        now: DateTime<Utc>,
    ) -> GuardrailDecision {
        let decision = self.first_block(history, client_count, now).map_or_else(
            GuardrailDecision::allow,
            GuardrailDecision::block,
        );
        debug!(
            ap_id,
            allowed = decision.allowed,
            reason = decision.reason_code().unwrap_or("none"),
            "guardrails evaluated"
        );
        decision
    }

    fn first_block(
        &self,
        history: &RemediationHistory,
        client_count: u32,
        now: DateTime<Utc>,
    ) -> Option<BlockReason> {
        let c = &self.config;

        if client_count < c.min_clients {
            return Some(BlockReason::InsufficientClients {
                client_count,
                min_clients: c.min_clients,
            });
        }

        if let Some(last) = history.last_action_time {
            let interval = chrono::Duration::milliseconds(
                i64::try_from(c.min_reboot_interval.as_millis()).unwrap_or(i64::MAX),
            );
            let elapsed = now - last;
            if elapsed < interval {
                // Partial seconds round up.
                let remaining_ms = (interval - elapsed).num_milliseconds().max(0) as u64;
                let remaining = remaining_ms.div_ceil(1000);
                return Some(BlockReason::IntervalNotElapsed {
                    remaining_secs: remaining,
                    min_interval_secs: c.min_reboot_interval.as_secs(),
                });
            }
        }

        let daily_count = history.daily_count_on(now.date_naive());
        if daily_count >= c.max_daily_reboots {
            return Some(BlockReason::DailyLimitReached {
                daily_count,
                max_daily_reboots: c.max_daily_reboots,
            });
        }

        if c.business_hours_only {
            let hours = &c.business_hours;
            let local = now.with_timezone(&hours.timezone).time();
            if !hours.contains(local) {
                return Some(BlockReason::OutsideBusinessHours {
                    local_time: format!("{:02}:{:02}", local.hour(), local.minute()),
                    window: hours.to_string(),
                });
            }
        }

        None
    }
}
