//! Diagnostic snapshot taken while an incident is `Diagnosing`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::ApStats;

/// Below this many clients a reboot is unlikely to be noticed either way.
const LOW_CLIENT_COUNT: u32 = 3;

pub const LOW_CLIENTS_RECOMMENDATION: &str =
    "Low client count - remediation may have limited impact";
pub const RECENT_REBOOT_RECOMMENDATION: &str = "AP recently rebooted - allow stabilization time";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub ap_id: String,
    pub sle_type: String,
    pub collected_at: DateTime<Utc>,
    pub online: bool,
    pub uptime_secs: u64,
    pub client_count: u32,
    pub cpu_util: Option<f64>,
    pub mem_util: Option<f64>,
    pub ip: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub recommendations: Vec<String>,
}

impl DiagnosticReport {
    pub fn from_stats(
        ap_id: &str,
        sle_type: &str,
        stats: &ApStats,
        min_reboot_interval: Duration,
        collected_at: DateTime<Utc>,
    ) -> Self {
        let mut recommendations = Vec::new();
        if stats.client_count < LOW_CLIENT_COUNT {
            recommendations.push(LOW_CLIENTS_RECOMMENDATION.to_string());
        }
        if stats.uptime_secs < min_reboot_interval.as_secs() {
            recommendations.push(RECENT_REBOOT_RECOMMENDATION.to_string());
        }

        Self {
            ap_id: ap_id.to_string(),
            sle_type: sle_type.to_string(),
            collected_at,
            online: stats.online,
            uptime_secs: stats.uptime_secs,
            client_count: stats.client_count,
            cpu_util: stats.cpu_util,
            mem_util: stats.mem_util,
            ip: stats.ip.clone(),
            model: stats.model.clone(),
            version: stats.version.clone(),
            recommendations,
        }
    }

    /// One-paragraph summary for ticket comments.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "AP status: {}, uptime {}s, {} clients",
            if self.online { "connected" } else { "disconnected" },
            self.uptime_secs,
            self.client_count
        );
        if let Some(cpu) = self.cpu_util {
            out.push_str(&format!(", cpu {cpu:.0}%"));
        }
        if let Some(mem) = self.mem_util {
            out.push_str(&format!(", mem {mem:.0}%"));
        }
        for rec in &self.recommendations {
            out.push_str("\n- ");
            out.push_str(rec);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(client_count: u32, uptime_secs: u64) -> ApStats {
        ApStats {
            client_count,
            online: true,
            uptime_secs,
            cpu_util: Some(41.0),
            ..ApStats::default()
        }
    }

    #[test]
    fn healthy_ap_has_no_recommendations() {
        let report = DiagnosticReport::from_stats(
            "ap-1",
            "throughput",
            &stats(15, 86_400),
            Duration::from_secs(1800),
            Utc::now(),
        );
        assert!(report.recommendations.is_empty());
        assert_eq!(
            report.summary(),
            "AP status: connected, uptime 86400s, 15 clients, cpu 41%"
        );
    }

    #[test]
    fn low_clients_and_recent_reboot_are_flagged() {
        let report = DiagnosticReport::from_stats(
            "ap-1",
            "throughput",
            &stats(2, 600),
            Duration::from_secs(1800),
            Utc::now(),
        );
        assert_eq!(
            report.recommendations,
            vec![
                LOW_CLIENTS_RECOMMENDATION.to_string(),
                RECENT_REBOOT_RECOMMENDATION.to_string()
            ]
        );
        assert!(report.summary().contains("\n- AP recently rebooted"));
    }
}
