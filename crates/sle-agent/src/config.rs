use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use incident_engine::EngineConfig;

/// Identity stamped on every audit line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSettings {
    pub host: String,
    pub source: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            host: std::env::var("SLE_AGENT_HOST").unwrap_or_else(|_| "sle-agent".into()),
            source: std::env::var("SLE_AGENT_SOURCE").unwrap_or_else(|_| "mist_automation".into()),
        }
    }
}

/// Agent-level settings around the engine rules.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// JSON file backing remediation history (None = in-memory only).
    pub history_path: Option<PathBuf>,
    /// Audit JSONL destination (None = kept in memory).
    pub audit_log: Option<PathBuf>,
    /// Ticket JSONL destination (None = kept in memory).
    pub ticket_log: Option<PathBuf>,
    /// Wall-clock budget for a whole run; in-flight validations are
    /// cancelled when it expires.
    pub run_timeout: Option<Duration>,
    pub sinks: SinkSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            history_path: std::env::var("SLE_AGENT_HISTORY").ok().map(PathBuf::from),
            audit_log: std::env::var("SLE_AGENT_AUDIT_LOG").ok().map(PathBuf::from),
            ticket_log: std::env::var("SLE_AGENT_TICKET_LOG").ok().map(PathBuf::from),
            run_timeout: std::env::var("SLE_AGENT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            sinks: SinkSettings::default(),
        }
    }
}

/// Load and validate the rules document.
pub fn load_engine_config(path: &Path) -> Result<Arc<EngineConfig>> {
    let config = EngineConfig::from_path(path)
        .with_context(|| format!("Failed to load rules from {}", path.display()))?;
    info!(
        path = %path.display(),
        critical_bound = config.thresholds.critical_bound,
        max_attempts = config.validation.max_attempts,
        "rules loaded"
    );
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RULES: &str = r#"
thresholds: { critical_bound: 60, high_bound: 70, medium_bound: 80 }
guardrails: { min_clients: 3, min_reboot_interval: 1800, max_daily_reboots: 3 }
validation: { poll_interval: 60, max_attempts: 5, threshold_score: 90 }
"#;

    #[test]
    fn loads_rules_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, RULES).unwrap();
        let config = load_engine_config(&path).unwrap();
        assert_eq!(config.guardrails.max_daily_reboots, 3);
    }

    #[test]
    fn load_error_names_the_file() {
        let err = load_engine_config(Path::new("/nonexistent/rules.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/rules.yaml"));
    }
}
