//! Scenario files: detections to replay plus a scripted metrics plane.
//!
//! ```yaml
//! time_scale: instant          # or `real` (default)
//! start: 2025-06-10T12:00:00Z  # manual clock start, instant mode only
//! devices:
//!   ap-42:
//!     stats: { client_count: 15, online: true, uptime_secs: 86400 }
//!     scores: [72, 85, 93]
//!     reboot_error: null
//! history:
//!   ap-42: { last_action_time: 2025-06-10T11:20:00Z, daily_count: 0, count_day: 2025-06-10 }
//! detections:
//!   - { ap_id: ap-42, sle_type: throughput, score: 55 }
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use incident_engine::ports::{ApStats, MetricsApi};
use incident_engine::{CollaboratorError, Detection, RemediationHistory};

/// How the agent's clock advances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScale {
    /// Wall clock and real timers.
    #[default]
    Real,
    /// Manual clock; waits complete immediately.
    Instant,
}

/// Scripted behaviour of one access point.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceScript {
    #[serde(default)]
    pub stats: Option<ApStats>,
    /// Returned instead of stats when set.
    #[serde(default)]
    pub stats_error: Option<String>,
    /// Consumed one per score fetch; the last value repeats.
    #[serde(default)]
    pub scores: Vec<f64>,
    #[serde(default)]
    pub reboot_error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub time_scale: TimeScale,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub devices: HashMap<String, DeviceScript>,
    #[serde(default)]
    pub history: HashMap<String, RemediationHistory>,
    pub detections: Vec<Detection>,
}

impl Scenario {
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let scenario: Self = serde_yaml::from_str(source).context("Failed to parse scenario")?;
        if scenario.detections.is_empty() {
            anyhow::bail!("scenario has no detections");
        }
        Ok(scenario)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_yaml_str(&source).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn metrics(&self) -> ScriptedMetrics {
        ScriptedMetrics::new(&self.devices)
    }
}

struct DeviceState {
    script: DeviceScript,
    scores: VecDeque<f64>,
    last_score: Option<f64>,
}

/// [`MetricsApi`] that replays a scenario's device scripts.
pub struct ScriptedMetrics {
    devices: Mutex<HashMap<String, DeviceState>>,
}

impl ScriptedMetrics {
    pub fn new(devices: &HashMap<String, DeviceScript>) -> Self {
        let devices = devices
            .iter()
            .map(|(ap_id, script)| {
                (
                    ap_id.clone(),
                    DeviceState {
                        script: script.clone(),
                        scores: script.scores.iter().copied().collect(),
                        last_score: None,
                    },
                )
            })
            .collect();
        Self {
            devices: Mutex::new(devices),
        }
    }

    fn with_device<T>(
        &self,
        ap_id: &str,
        f: impl FnOnce(&mut DeviceState) -> Result<T, CollaboratorError>,
    ) -> Result<T, CollaboratorError> {
        let mut devices = self
            .devices
            .lock()
            .map_err(|_| CollaboratorError::Transport("metrics script poisoned".into()))?;
        let device = devices
            .get_mut(ap_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("AP {ap_id}")))?;
        f(device)
    }
}

#[async_trait]
impl MetricsApi for ScriptedMetrics {
    async fn get_ap_stats(&self, ap_id: &str) -> Result<ApStats, CollaboratorError> {
        self.with_device(ap_id, |device| {
            if let Some(error) = &device.script.stats_error {
                return Err(CollaboratorError::Transport(error.clone()));
            }
            device
                .script
                .stats
                .clone()
                .ok_or_else(|| CollaboratorError::NotFound(format!("stats for AP {ap_id}")))
        })
    }

    async fn get_sle_score(&self, ap_id: &str, sle_type: &str) -> Result<f64, CollaboratorError> {
        self.with_device(ap_id, |device| {
            if let Some(score) = device.scores.pop_front() {
                device.last_score = Some(score);
            }
            debug!(ap_id, sle_type, score = ?device.last_score, "scripted score");
            device
                .last_score
                .ok_or_else(|| CollaboratorError::NotFound(format!("{sle_type} score for AP {ap_id}")))
        })
    }

    async fn reboot(&self, ap_id: &str) -> Result<(), CollaboratorError> {
        self.with_device(ap_id, |device| match &device.script.reboot_error {
            Some(error) => Err(CollaboratorError::Rejected {
                service: "mist",
                status: 409,
                message: error.clone(),
            }),
            None => Ok(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
time_scale: instant
start: 2025-06-10T12:00:00Z
devices:
  ap-1:
    stats: { client_count: 15, online: true, uptime_secs: 86400 }
    scores: [72, 85]
  ap-2:
    stats_error: "502 bad gateway"
    reboot_error: "device busy"
detections:
  - { ap_id: ap-1, sle_type: throughput, score: 55 }
"#;

    #[test]
    fn parses_scenario_with_defaults() {
        let scenario = Scenario::from_yaml_str(SCENARIO).unwrap();
        assert_eq!(scenario.time_scale, TimeScale::Instant);
        assert_eq!(scenario.detections.len(), 1);
        assert_eq!(scenario.detections[0].source, "splunk");
        assert!(scenario.history.is_empty());
    }

    #[test]
    fn empty_detection_list_is_rejected() {
        let err = Scenario::from_yaml_str("detections: []").unwrap_err();
        assert!(err.to_string().contains("no detections"));
    }

    #[tokio::test]
    async fn scripted_scores_repeat_last_value() {
        let metrics = Scenario::from_yaml_str(SCENARIO).unwrap().metrics();
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(metrics.get_sle_score("ap-1", "throughput").await.unwrap());
        }
        assert_eq!(seen, vec![72.0, 85.0, 85.0]);
    }

    #[tokio::test]
    async fn scripted_errors_surface_as_collaborator_errors() {
        let metrics = Scenario::from_yaml_str(SCENARIO).unwrap().metrics();
        assert!(matches!(
            metrics.get_ap_stats("ap-2").await,
            Err(CollaboratorError::Transport(_))
        ));
        assert!(matches!(
            metrics.reboot("ap-2").await,
            Err(CollaboratorError::Rejected { status: 409, .. })
        ));
        assert!(matches!(
            metrics.get_ap_stats("ap-9").await,
            Err(CollaboratorError::NotFound(_))
        ));
    }
}
