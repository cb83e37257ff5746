//! End-of-run simulation report.

use crate::classifier::Band;
use crate::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Latency statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    /// Formats latency as a human-readable string.
    pub fn format_ms(&self) -> String {
        if self.count == 0 {
            "N/A".to_string()
        } else {
            format!(
                "p50={:.2}ms p95={:.2}ms p99={:.2}ms",
                self.p50_us as f64 / 1000.0,
                self.p95_us as f64 / 1000.0,
                self.p99_us as f64 / 1000.0
            )
        }
    }
}

/// How a client task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientOutcome {
    /// Announced a CRITICAL transition and stopped.
    CriticalExit,
    /// Stopped by the shutdown flags.
    Disconnected,
    /// A send failed or timed out.
    SendFailed,
    /// The initial connect failed; nothing was sent.
    ConnectFailed,
    /// Stopped by external cancellation.
    Cancelled,
}

impl std::fmt::Display for ClientOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientOutcome::CriticalExit => write!(f, "critical exit"),
            ClientOutcome::Disconnected => write!(f, "disconnected"),
            ClientOutcome::SendFailed => write!(f, "send failed"),
            ClientOutcome::ConnectFailed => write!(f, "connect failed"),
            ClientOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-client summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientReport {
    pub client: ClientId,
    pub outcome: ClientOutcome,
    /// Samples drawn
    pub ticks: u64,
    pub messages_sent: u64,
    pub last_logged_band: Option<Band>,
    /// This client's CRITICAL started the shutdown cascade.
    pub triggered_cascade: bool,
}

/// Complete simulation report.
#[derive(Debug, Serialize, Deserialize)]
pub struct SimulationReport {
    pub target: String,
    pub designated_client: ClientId,
    pub duration: Duration,
    pub clients: Vec<ClientReport>,

    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    pub suppressed_sends: u64,
    pub messages_by_type: BTreeMap<String, u64>,
    pub send_latency: LatencyStats,
}

impl SimulationReport {
    pub fn cascade_triggered(&self) -> bool {
        self.clients.iter().any(|c| c.triggered_cascade)
    }

    pub fn client(&self, id: ClientId) -> Option<&ClientReport> {
        self.clients.iter().find(|c| c.client == id)
    }

    pub fn messages_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.messages_sent as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Generates a JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Prints a summary to stdout.
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SIMULATION RESULTS");
        println!("{}", "=".repeat(60));

        println!(
            "\nTarget: {} | Clients: {} | Duration: {:.1}s",
            self.target,
            self.clients.len(),
            self.duration.as_secs_f64()
        );

        println!("\nCLIENTS:");
        for c in &self.clients {
            let marker = if c.triggered_cascade { " (cascade)" } else { "" };
            println!(
                "   {}: {}{} | ticks: {} | sent: {} | last band: {}",
                c.client,
                c.outcome,
                marker,
                format_number(c.ticks),
                format_number(c.messages_sent),
                c.last_logged_band.map_or("-", |b| b.label())
            );
        }

        println!("\nMESSAGES:");
        println!(
            "   Total: {} ({:.1}/s, {})",
            format_number(self.messages_sent),
            self.messages_per_second(),
            format_bytes(self.bytes_sent)
        );
        for (kind, count) in &self.messages_by_type {
            println!("   {:<9} {}", kind, format_number(*count));
        }
        println!("   Latency: {}", self.send_latency.format_ms());
        if self.send_errors > 0 {
            println!("   Send errors: {}", self.send_errors);
        }
        if self.suppressed_sends > 0 {
            println!("   Suppressed: {}", self.suppressed_sends);
        }

        println!("\n{}", "=".repeat(60));
    }
}

/// Formats a number with thousand separators.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Formats bytes in human-readable form.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SimulationReport {
        SimulationReport {
            target: "127.0.0.1:5050".to_string(),
            designated_client: 3,
            duration: Duration::from_secs(2),
            clients: vec![
                ClientReport {
                    client: 1,
                    outcome: ClientOutcome::Disconnected,
                    ticks: 10,
                    messages_sent: 14,
                    last_logged_band: Some(Band::Normal),
                    triggered_cascade: false,
                },
                ClientReport {
                    client: 3,
                    outcome: ClientOutcome::CriticalExit,
                    ticks: 12,
                    messages_sent: 18,
                    last_logged_band: Some(Band::Critical),
                    triggered_cascade: true,
                },
            ],
            messages_sent: 32,
            bytes_sent: 2048,
            send_errors: 0,
            suppressed_sends: 1,
            messages_by_type: BTreeMap::from([("DATA".to_string(), 22), ("INFO".to_string(), 10)]),
            send_latency: LatencyStats::default(),
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(123), "123");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_report_queries() {
        let report = report();
        assert!(report.cascade_triggered());
        assert_eq!(report.client(3).unwrap().outcome, ClientOutcome::CriticalExit);
        assert!(report.client(2).is_none());
        assert_eq!(report.messages_per_second(), 16.0);
    }

    #[test]
    fn test_json_report() {
        let json: serde_json::Value = serde_json::from_str(&report().to_json()).unwrap();
        assert_eq!(json["clients"][1]["outcome"], "critical_exit");
        assert_eq!(json["clients"][1]["last_logged_band"], "CRITICAL");
        assert_eq!(json["messages_by_type"]["DATA"], 22);
    }
}
