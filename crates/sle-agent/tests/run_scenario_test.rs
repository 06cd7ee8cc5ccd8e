//! End-to-end runs of the agent against scripted scenarios with file-backed
//! history, audit and ticket logs.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use incident_engine::IncidentState;
use sle_agent::config::{load_engine_config, AgentSettings, SinkSettings};
use sle_agent::runner::run_scenario;
use sle_agent::scenario::Scenario;

const RULES: &str = r#"
thresholds: { critical_bound: 60, high_bound: 70, medium_bound: 80 }
guardrails: { min_clients: 3, min_reboot_interval: 1800, max_daily_reboots: 3 }
validation: { stabilization_delay: 60, poll_interval: 60, max_attempts: 5, threshold_score: 90 }
"#;

const SCENARIO: &str = r#"
time_scale: instant
start: 2025-06-10T12:00:00Z
devices:
  ap-42:
    stats: { client_count: 15, online: true, uptime_secs: 86400 }
    scores: [72, 85, 93]
  ap-7:
    stats: { client_count: 1, online: true, uptime_secs: 86400 }
    scores: [40]
detections:
  - { ap_id: ap-42, sle_type: throughput, score: 55 }
  - { ap_id: ap-7, sle_type: coverage, score: 65 }
"#;

fn settings(dir: &Path) -> AgentSettings {
    AgentSettings {
        history_path: Some(dir.join("history.json")),
        audit_log: Some(dir.join("audit.jsonl")),
        ticket_log: Some(dir.join("tickets.jsonl")),
        run_timeout: None,
        sinks: SinkSettings {
            host: "lab".into(),
            source: "mist_automation".into(),
        },
    }
}

fn read_jsonl(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn write_rules(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("rules.yaml");
    std::fs::write(&path, RULES).unwrap();
    path
}

/// Test: a mixed scenario restores one AP, blocks the other and writes every log
#[tokio::test(start_paused = true)]
async fn test_mixed_scenario_writes_logs_and_history() {
    let dir = tempdir().unwrap();
    let config = load_engine_config(&write_rules(dir.path())).unwrap();
    let scenario = Scenario::from_yaml_str(SCENARIO).unwrap();
    let settings = settings(dir.path());

    let summary = run_scenario(config, &scenario, &settings, CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.failures.is_empty());
    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.reports[0].incident.ap_id, "ap-42");
    assert_eq!(summary.reports[0].final_state(), IncidentState::Restored);
    assert_eq!(summary.reports[0].mttr().map(|d| d.as_secs()), Some(180));
    assert_eq!(summary.reports[1].final_state(), IncidentState::Blocked);
    assert_eq!(summary.escalated(), 1);
    assert!(summary.needs_attention());
    assert_eq!(summary.audit_sink_failures, 0);

    let audit = read_jsonl(&dir.path().join("audit.jsonl"));
    assert!(audit.iter().all(|line| line["host"] == "lab"));
    let ap42: Vec<&str> = audit
        .iter()
        .filter(|line| line["event"]["ap_id"] == "ap-42")
        .filter_map(|line| line["sourcetype"].as_str())
        .collect();
    assert_eq!(
        ap42,
        vec![
            "mist:sle:detection",
            "mist:sle:ticketing",
            "mist:sle:diagnostics",
            "mist:sle:remediation",
            "mist:sle:validation",
            "mist:sle:workflow",
        ]
    );

    let tickets = read_jsonl(&dir.path().join("tickets.jsonl"));
    let creates = tickets.iter().filter(|line| line["op"] == "create").count();
    assert_eq!(creates, 2);

    let history: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("history.json")).unwrap())
            .unwrap();
    assert_eq!(history["ap-42"]["daily_count"], 1);
    assert!(history.get("ap-7").is_none());
}

/// Test: persisted history makes a second run inside the reboot interval block
#[tokio::test(start_paused = true)]
async fn test_persisted_history_blocks_repeat_reboot() {
    let dir = tempdir().unwrap();
    let rules = write_rules(dir.path());
    let settings = settings(dir.path());
    let scenario = Scenario::from_yaml_str(SCENARIO).unwrap();

    let first = run_scenario(
        load_engine_config(&rules).unwrap(),
        &scenario,
        &settings,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(first.reports[0].final_state(), IncidentState::Restored);

    let second = run_scenario(
        load_engine_config(&rules).unwrap(),
        &scenario,
        &settings,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let report = &second.reports[0];
    assert_eq!(report.final_state(), IncidentState::Blocked);
    assert_eq!(
        report.decision.as_ref().unwrap().reason_code(),
        Some("interval_not_elapsed")
    );
}

/// Test: cancelling before the run starts blocks remediation without rebooting
#[tokio::test(start_paused = true)]
async fn test_cancelled_run_blocks_before_reboot() {
    let dir = tempdir().unwrap();
    let config = load_engine_config(&write_rules(dir.path())).unwrap();
    let scenario = Scenario::from_yaml_str(SCENARIO).unwrap();
    let settings = settings(dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = run_scenario(config, &scenario, &settings, cancel).await.unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.final_state(), IncidentState::Blocked);
    assert_eq!(
        report.decision.as_ref().unwrap().reason_code(),
        Some("cancelled")
    );
    assert!(report.remediation.is_none());
    assert!(report.validation.is_none());
    assert!(!dir.path().join("history.json").exists());
}

/// Test: concurrent incidents in an instant replay each report their own MTTR
#[tokio::test(start_paused = true)]
async fn test_instant_replay_reports_each_incident_own_mttr() {
    let dir = tempdir().unwrap();
    let config = load_engine_config(&write_rules(dir.path())).unwrap();
    let mut yaml = String::from("time_scale: instant\nstart: 2025-06-10T12:00:00Z\ndevices:\n");
    for n in 1..=4 {
        yaml.push_str(&format!(
            "  ap-{n}:\n    stats: {{ client_count: 12, online: true, uptime_secs: 3600 }}\n    scores: [95]\n"
        ));
    }
    yaml.push_str("detections:\n");
    for n in 1..=4 {
        yaml.push_str(&format!("  - {{ ap_id: ap-{n}, sle_type: throughput, score: 50 }}\n"));
    }
    let scenario = Scenario::from_yaml_str(&yaml).unwrap();
    let mut settings = settings(dir.path());
    settings.history_path = None;

    let summary = run_scenario(config, &scenario, &settings, CancellationToken::new())
        .await
        .unwrap();

    let start: DateTime<Utc> = "2025-06-10T12:00:00Z".parse().unwrap();
    assert_eq!(summary.reports.len(), 4);
    for report in &summary.reports {
        assert_eq!(report.final_state(), IncidentState::Restored);
        assert_eq!(report.mttr().map(|d| d.as_secs()), Some(60));
        let attempts = &report.validation.as_ref().unwrap().attempts;
        assert_eq!(attempts.len(), 1);
        let offset = attempts[0].timestamp - start;
        assert_eq!(offset.num_seconds(), 60);
    }
}

/// Test: audit events the sink cannot write are counted without failing the run
#[tokio::test(start_paused = true)]
async fn test_unwritable_audit_log_counts_sink_failures() {
    let dir = tempdir().unwrap();
    let config = load_engine_config(&write_rules(dir.path())).unwrap();
    let scenario = Scenario::from_yaml_str(SCENARIO).unwrap();
    let mut settings = settings(dir.path());
    settings.history_path = None;
    settings.audit_log = Some(dir.path().join("missing").join("audit.jsonl"));

    let summary = run_scenario(config, &scenario, &settings, CancellationToken::new())
        .await
        .unwrap();

    assert!(summary.failures.is_empty());
    assert_eq!(summary.reports[0].final_state(), IncidentState::Restored);
    assert!(summary.audit_sink_failures > 0);
}

/// Test: a scenario without detections is rejected up front
#[test]
fn test_empty_scenario_rejected() {
    assert!(Scenario::from_yaml_str("devices: {}\ndetections: []").is_err());
}
