//! Configuration structs for the event trigger simulator.

use crate::classifier::{default_bands, validate_bands, Band, BandRange};
use crate::error::{Result, SimulatorError};
use crate::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Main configuration for the simulator. Can be loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// EventMonitor host
    pub host: String,

    /// EventMonitor port
    pub port: u16,

    /// Client ids to simulate, one task each
    pub clients: Vec<ClientId>,

    /// Client whose CRITICAL halts everyone (defaults to the last client)
    pub designated_client: Option<ClientId>,

    /// Delays and timeouts
    pub timing: TimingConfig,

    /// Normal transitions per stability summary
    pub stability_window: usize,

    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,

    /// Band table used by the classifier
    pub bands: Vec<BandRange>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5050,
            clients: vec![1, 2, 3],
            designated_client: None,
            timing: TimingConfig::default(),
            stability_window: 5,
            seed: None,
            bands: default_bands(),
        }
    }
}

impl SimulatorConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SimulatorConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Write default config to a file (for generating example config)
    pub fn write_default(path: impl AsRef<Path>) -> Result<()> {
        let yaml = serde_yaml::to_string(&Self::default())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Target address as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Designated client, falling back to the last configured one.
    pub fn designated(&self) -> Option<ClientId> {
        self.designated_client.or_else(|| self.clients.last().copied())
    }

    pub fn validate(&self) -> Result<()> {
        if self.clients.is_empty() {
            return Err(invalid("at least one client is required"));
        }

        let mut seen = HashSet::new();
        for id in &self.clients {
            if !seen.insert(id) {
                return Err(invalid(format!("client {} listed twice", id)));
            }
        }

        if let Some(designated) = self.designated_client {
            if !seen.contains(&designated) {
                return Err(invalid(format!(
                    "designated client {} is not in the client list",
                    designated
                )));
            }
        }

        if self.timing.min_interval_ms > self.timing.max_interval_ms {
            return Err(invalid(format!(
                "tick interval bounds reversed: {}ms > {}ms",
                self.timing.min_interval_ms, self.timing.max_interval_ms
            )));
        }

        if self.stability_window == 0 {
            return Err(invalid("stability window must be at least 1"));
        }

        validate_bands(&self.bands)?;

        if self.timing.critical_warmup_ms > 0
            && !self
                .bands
                .iter()
                .any(|b| b.band != Band::Critical && b.weight > 0.0)
        {
            return Err(invalid(
                "critical warm-up needs at least one non-CRITICAL band with weight",
            ));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> SimulatorError {
    SimulatorError::InvalidConfig(reason.into())
}

/// Delays and timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after "Module started" before the first sample
    pub settle_delay_ms: u64,

    /// Lower bound of the per-tick sleep
    pub min_interval_ms: u64,

    /// Upper bound of the per-tick sleep
    pub max_interval_ms: u64,

    /// Bound on a single send
    pub send_timeout_ms: u64,

    /// Bound on the initial connect
    pub connect_timeout_ms: u64,

    /// How long the fleet stays blocked before everyone is deactivated
    pub grace_period_ms: u64,

    /// CRITICAL is never drawn for this long after a module starts (0 = off)
    pub critical_warmup_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 200,
            min_interval_ms: 50,
            max_interval_ms: 150,
            send_timeout_ms: 400,
            connect_timeout_ms: 2000,
            grace_period_ms: 5000,
            critical_warmup_ms: 0,
        }
    }
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn critical_warmup(&self) -> Duration {
        Duration::from_millis(self.critical_warmup_ms)
    }
}
