use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use incident_engine::remediation::ActionSelector;
use incident_engine::SeverityClassifier;
use sle_agent::config::{load_engine_config, AgentSettings};
use sle_agent::runner::{run_scenario, runtime_for};
use sle_agent::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a scenario's detections through the engine
    Run {
        /// Rules document (YAML)
        #[arg(long, env = "SLE_AGENT_CONFIG")]
        config: PathBuf,

        /// Scenario file (YAML)
        #[arg(long)]
        scenario: PathBuf,

        /// Remediation history file (JSON)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Append audit events here as JSON lines
        #[arg(long)]
        audit_log: Option<PathBuf>,

        /// Append ticket actions here as JSON lines
        #[arg(long)]
        ticket_log: Option<PathBuf>,

        /// Cancel in-flight incidents after this many seconds (scenario
        /// seconds for instant replays)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Grade a single score without touching any collaborator
    Classify {
        #[arg(long, env = "SLE_AGENT_CONFIG")]
        config: PathBuf,

        #[arg(long)]
        score: f64,

        #[arg(long, default_value = "throughput")]
        sle: String,
    },

    /// Validate a rules document and print the effective configuration
    CheckConfig {
        #[arg(long, env = "SLE_AGENT_CONFIG")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.log_json);

    match args.command {
        Command::Run {
            config,
            scenario,
            history,
            audit_log,
            ticket_log,
            timeout_secs,
        } => {
            let engine_config = load_engine_config(&config)?;
            let scenario = Scenario::from_path(&scenario)?;

            let defaults = AgentSettings::default();
            let settings = AgentSettings {
                history_path: history.or(defaults.history_path),
                audit_log: audit_log.or(defaults.audit_log),
                ticket_log: ticket_log.or(defaults.ticket_log),
                run_timeout: timeout_secs.map(Duration::from_secs).or(defaults.run_timeout),
                sinks: defaults.sinks,
            };
            info!(
                detections = scenario.detections.len(),
                time_scale = ?scenario.time_scale,
                "SLE agent starting"
            );

            let runtime =
                runtime_for(scenario.time_scale).context("Failed to start tokio runtime")?;
            let summary = runtime.block_on(async {
                let cancel = CancellationToken::new();
                let on_signal = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, cancelling in-flight incidents");
                        on_signal.cancel();
                    }
                });
                run_scenario(engine_config, &scenario, &settings, cancel).await
            })?;
            for report in &summary.reports {
                println!(
                    "{}",
                    serde_json::to_string(report).context("Failed to serialize report")?
                );
            }
            for failure in &summary.failures {
                warn!(%failure, "detection did not complete");
            }

            Ok(if summary.needs_attention() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::Classify { config, score, sle } => {
            let engine_config = load_engine_config(&config)?;
            let classifier = SeverityClassifier::from_config(&engine_config)
                .context("Invalid severity configuration")?;
            let grading = classifier.grade(score, &sle);
            let action = ActionSelector::from_config(&engine_config).select(&sle);
            println!(
                "{}",
                json!({
                    "score": score,
                    "sle_type": sle,
                    "severity": grading.severity,
                    "priority": grading.priority,
                    "action": action,
                })
            );
            Ok(ExitCode::SUCCESS)
        }

        Command::CheckConfig { config } => {
            let engine_config = load_engine_config(&config)?;
            let rendered = serde_yaml::to_string(engine_config.as_ref())
                .context("Failed to render configuration")?;
            print!("{rendered}");
            Ok(ExitCode::SUCCESS)
        }
    }
}
