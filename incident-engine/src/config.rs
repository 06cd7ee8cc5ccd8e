//! Engine configuration: a validated, strongly-typed rules document.
//!
//! Loaded once at startup from YAML and shared read-only afterwards.
//!
//! ```yaml
//! thresholds:
//!   critical_bound: 60
//!   high_bound: 70
//!   medium_bound: 80
//! guardrails:
//!   min_clients: 3
//!   min_reboot_interval: 1800     # seconds
//!   max_daily_reboots: 3
//!   business_hours_only: false
//!   business_hours: { start: "08:00", end: "18:00", timezone: "UTC" }
//! validation:
//!   stabilization_delay: 60       # seconds, optional
//!   poll_interval: 60
//!   max_attempts: 5
//!   threshold_score: 90
//! zendesk:
//!   priority_map: { critical: urgent, high: high, medium: normal, low: normal }
//! remediation:
//!   strategies:
//!     throughput: [{ action: reboot, priority: 1 }]
//! ```
//!
//! Required keys are checked by path before deserialization so the error
//! names the missing key. Unknown keys are ignored.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::guardrails::GuardrailConfig;
use crate::remediation::RemediationAction;
use crate::severity::{PriorityMap, SeverityThresholds};
use crate::validation::ValidationConfig;

/// Keys that must be present in every rules document.
pub const REQUIRED_KEYS: &[&str] = &[
    "thresholds.critical_bound",
    "thresholds.high_bound",
    "thresholds.medium_bound",
    "guardrails.min_clients",
    "guardrails.min_reboot_interval",
    "guardrails.max_daily_reboots",
    "validation.poll_interval",
    "validation.max_attempts",
    "validation.threshold_score",
];

/// Upper bound for any configured duration (one week).
const MAX_DURATION_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Top-level rules document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub thresholds: SeverityThresholds,
    pub guardrails: GuardrailConfig,
    pub validation: ValidationConfig,
    /// Ticket priority mapping and ticket decoration.
    #[serde(default, rename = "zendesk")]
    pub ticketing: TicketingConfig,
    #[serde(default)]
    pub remediation: RemediationConfig,
}

impl EngineConfig {
    /// Parse and validate a YAML rules document.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(source)?;
        for key in REQUIRED_KEYS {
            if lookup(&value, key).is_none() {
                return Err(ConfigError::MissingKey(key));
            }
        }

        let config: Self = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML rules file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        let g = &self.guardrails;
        check_duration("guardrails.min_reboot_interval", g.min_reboot_interval)?;
        if g.business_hours_only && g.business_hours.start == g.business_hours.end {
            return Err(ConfigError::invalid(
                "guardrails.business_hours",
                "start and end must differ",
            ));
        }

        let v = &self.validation;
        check_duration("validation.stabilization_delay", v.stabilization_delay)?;
        check_duration("validation.poll_interval", v.poll_interval)?;
        if v.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "validation.max_attempts",
                "must be at least 1",
            ));
        }
        if !(0.0..=100.0).contains(&v.threshold_score) {
            return Err(ConfigError::invalid(
                "validation.threshold_score",
                format!("{} is outside 0..=100", v.threshold_score),
            ));
        }

        Ok(())
    }
}

fn check_duration(key: &'static str, value: std::time::Duration) -> Result<(), ConfigError> {
    if value.as_secs_f64() > MAX_DURATION_SECS {
        return Err(ConfigError::invalid(
            key,
            format!("{}s exceeds the one-week maximum", value.as_secs()),
        ));
    }
    Ok(())
}

/// Walk a dotted key path through nested YAML mappings.
fn lookup<'a>(value: &'a serde_yaml::Value, dotted: &str) -> Option<&'a serde_yaml::Value> {
    dotted
        .split('.')
        .try_fold(value, |node, segment| node.get(segment))
        .filter(|node| !node.is_null())
}

/// Ticketing decoration: priority mapping, tags and assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    #[serde(default)]
    pub priority_map: PriorityMap,
    /// SLE types whose tickets are raised to at least `high` priority.
    #[serde(default = "default_critical_sle_types")]
    pub critical_sle_types: Vec<String>,
    /// Optional assignee group for created tickets.
    #[serde(default)]
    pub group: Option<String>,
    /// Fixed marker tags added to every ticket.
    #[serde(default = "default_ticket_tags")]
    pub tags: Vec<String>,
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            priority_map: PriorityMap::default(),
            critical_sle_types: default_critical_sle_types(),
            group: None,
            tags: default_ticket_tags(),
        }
    }
}

fn default_critical_sle_types() -> Vec<String> {
    vec!["gateway-availability".into(), "dhcp-performance".into()]
}

fn default_ticket_tags() -> Vec<String> {
    ["mist", "wireless", "sle", "automation"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Per-SLE-type remediation strategies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemediationConfig {
    #[serde(default)]
    pub strategies: HashMap<String, Vec<StrategyEntry>>,
}

/// One candidate action for an SLE type; lower `priority` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyEntry {
    pub action: RemediationAction,
    #[serde(default = "default_strategy_priority")]
    pub priority: u32,
}

fn default_strategy_priority() -> u32 {
    99
}

/// Serde adapter for `std::time::Duration` as (possibly fractional) seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() == 0 {
            serializer.serialize_u64(value.as_secs())
        } else {
            serializer.serialize_f64(value.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::severity::TicketPriority;
    use std::time::Duration;

    pub(crate) const SAMPLE: &str = r#"
thresholds:
  critical_bound: 60
  high_bound: 70
  medium_bound: 80
guardrails:
  min_clients: 3
  min_reboot_interval: 1800
  max_daily_reboots: 3
validation:
  poll_interval: 60
  max_attempts: 5
  threshold_score: 90
"#;

    #[test]
    fn parses_minimal_document_with_defaults() {
        let config = EngineConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.thresholds.critical_bound, 60.0);
        assert_eq!(config.guardrails.min_clients, 3);
        assert_eq!(
            config.guardrails.min_reboot_interval,
            Duration::from_secs(1800)
        );
        assert!(!config.guardrails.business_hours_only);
        assert_eq!(
            config.validation.stabilization_delay,
            Duration::from_secs(60)
        );
        assert_eq!(config.ticketing.priority_map.critical, TicketPriority::Urgent);
        assert_eq!(config.ticketing.tags.len(), 4);
        assert!(config.remediation.strategies.is_empty());
    }

    #[test]
    fn missing_required_key_is_named() {
        let source = SAMPLE.replace("  max_daily_reboots: 3\n", "");
        let err = EngineConfig::from_yaml_str(&source).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingKey("guardrails.max_daily_reboots")
        ));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let source = format!("{SAMPLE}\nsplunk:\n  index: wireless\n");
        assert!(EngineConfig::from_yaml_str(&source).is_ok());
    }

    #[test]
    fn unordered_thresholds_are_rejected() {
        let source = SAMPLE.replace("high_bound: 70", "high_bound: 50");
        let err = EngineConfig::from_yaml_str(&source).unwrap_err();
        assert!(matches!(err, ConfigError::UnorderedThresholds { .. }));
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let source = SAMPLE.replace("max_attempts: 5", "max_attempts: 0");
        let err = EngineConfig::from_yaml_str(&source).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "validation.max_attempts",
                ..
            }
        ));
    }

    #[test]
    fn business_hours_and_strategies_parse() {
        let source = format!(
            "{SAMPLE}\nremediation:\n  strategies:\n    throughput:\n      - {{ action: wlan_reset, priority: 2 }}\n      - {{ action: reboot, priority: 1 }}\n"
        )
        .replace(
            "  max_daily_reboots: 3\n",
            "  max_daily_reboots: 3\n  business_hours_only: true\n  business_hours:\n    start: \"09:00\"\n    end: \"17:30\"\n    timezone: America/New_York\n",
        );
        let config = EngineConfig::from_yaml_str(&source).unwrap();
        assert!(config.guardrails.business_hours_only);
        assert_eq!(
            config.guardrails.business_hours.timezone,
            chrono_tz::America::New_York
        );
        assert_eq!(config.remediation.strategies["throughput"].len(), 2);
    }

    #[test]
    fn unknown_action_fails_at_load() {
        let source = format!(
            "{SAMPLE}\nremediation:\n  strategies:\n    throughput:\n      - {{ action: factory_reset }}\n"
        );
        assert!(matches!(
            EngineConfig::from_yaml_str(&source),
            Err(ConfigError::Parse(_))
        ));
    }
}
