//! Severity Classifier: score to severity grade to ticket priority
//!
//! ```text
//!   0 ──────── critical_bound ──────── high_bound ──────── medium_bound ──────── 100
//!   │  critical       │        high        │       medium       │        low        │
//! ```
//!
//! Bounds are exclusive upper limits: a score equal to a bound falls into
//! the next, less severe band.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, TicketingConfig};
use crate::error::ConfigError;

/// Severity grade, declared most severe first so `Ord` ranks `Critical` lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Returns `true` if `self` is at least as severe as `other`.
    pub fn at_least(self, other: Severity) -> bool {
        self <= other
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Ticket priority, declared least urgent first so `max` picks the more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// Score bounds for each severity band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub critical_bound: f64,
    pub high_bound: f64,
    pub medium_bound: f64,
}

impl SeverityThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = [self.critical_bound, self.high_bound, self.medium_bound];
        if bounds.iter().any(|b| !(0.0..=100.0).contains(b)) {
            return Err(ConfigError::invalid(
                "thresholds",
                format!("bounds {bounds:?} must lie within 0..=100"),
            ));
        }
        if !(self.critical_bound < self.high_bound && self.high_bound < self.medium_bound) {
            return Err(ConfigError::UnorderedThresholds {
                critical: self.critical_bound,
                high: self.high_bound,
                medium: self.medium_bound,
            });
        }
        Ok(())
    }
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            critical_bound: 60.0,
            high_bound: 70.0,
            medium_bound: 80.0,
        }
    }
}

/// Severity → ticket priority mapping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityMap {
    #[serde(default = "urgent")]
    pub critical: TicketPriority,
    #[serde(default = "high")]
    pub high: TicketPriority,
    #[serde(default = "normal")]
    pub medium: TicketPriority,
    #[serde(default = "normal")]
    pub low: TicketPriority,
}

fn urgent() -> TicketPriority {
    TicketPriority::Urgent
}

fn high() -> TicketPriority {
    TicketPriority::High
}

fn normal() -> TicketPriority {
    TicketPriority::Normal
}

impl Default for PriorityMap {
    fn default() -> Self {
        Self {
            critical: urgent(),
            high: high(),
            medium: normal(),
            low: normal(),
        }
    }
}

impl PriorityMap {
    pub fn get(&self, severity: Severity) -> TicketPriority {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// Severity and priority assigned to a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grading {
    pub severity: Severity,
    pub priority: TicketPriority,
}

/// Pure score → severity → priority classifier.
#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    thresholds: SeverityThresholds,
    priority_map: PriorityMap,
    critical_sle_types: Vec<String>,
}

impl SeverityClassifier {
    /// Build a classifier, rejecting a threshold table that is not strictly ordered.
    pub fn new(
        thresholds: SeverityThresholds,
        ticketing: &TicketingConfig,
    ) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            priority_map: ticketing.priority_map,
            critical_sle_types: ticketing.critical_sle_types.clone(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config.thresholds, &config.ticketing)
    }

    /// Map a score (0–100) to a severity. A NaN score is graded critical.
    pub fn classify(&self, score: f64) -> Severity {
        let t = &self.thresholds;
        if score.is_nan() || score < t.critical_bound {
            Severity::Critical
        } else if score < t.high_bound {
            Severity::High
        } else if score < t.medium_bound {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Ticket priority for a severity, raised to at least `high` for
    /// infrastructure-critical SLE types.
    pub fn priority(&self, severity: Severity, sle_type: &str) -> TicketPriority {
        let mapped = self.priority_map.get(severity);
        if self.critical_sle_types.iter().any(|t| t == sle_type) {
            mapped.max(TicketPriority::High)
        } else {
            mapped
        }
    }

    /// Classify a detection in one step.
    pub fn grade(&self, score: f64, sle_type: &str) -> Grading {
        let severity = self.classify(score);
        Grading {
            severity,
            priority: self.priority(severity, sle_type),
        }
    }
}
