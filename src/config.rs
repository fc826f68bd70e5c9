//! Configuration for Deadair.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deadair configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for the socket, pid file, and logs.
    pub data_dir: PathBuf,
    /// Maximum number of breakdown records retained in memory.
    pub history_capacity: usize,
    /// Optional YAML file with additional anchor personas.
    pub personas_file: Option<PathBuf>,
    /// Pacing knobs for the broadcast loops.
    pub timing: TimingSettings,
    /// Breakdown trigger and mental-state tuning.
    pub triggers: TriggerSettings,
    /// Daemon configuration.
    pub daemon: DaemonSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deadair");

        Self {
            data_dir,
            history_capacity: 100,
            personas_file: None,
            timing: TimingSettings::default(),
            triggers: TriggerSettings::default(),
            daemon: DaemonSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/deadair/deadair.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join("deadair").join("deadair.yml");
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./deadair.yml
        let fallback_config = PathBuf::from("deadair.yml");
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Get the socket path for the daemon.
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join("deadair.sock")
    }

    /// Get the PID file path.
    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("deadair.pid")
    }

    /// Convert to DaemonConfig.
    pub fn to_daemon_config(&self) -> crate::daemon::DaemonConfig {
        crate::daemon::DaemonConfig {
            socket_path: self.socket_path(),
            pid_path: self.pid_path(),
            data_path: self.data_dir.clone(),
        }
    }

    /// Convert to the control room's runtime configuration.
    pub fn to_control_config(&self) -> crate::broadcast::ControlRoomConfig {
        crate::broadcast::ControlRoomConfig {
            tick_interval: Duration::from_secs(self.timing.tick_interval_secs),
            rotation_interval: Duration::from_secs(self.timing.rotation_interval_secs),
            stage_delay_min: Duration::from_secs(self.timing.stage_delay_min_secs),
            stage_delay_max: Duration::from_secs(self.timing.stage_delay_max_secs),
            dialogue_timeout: Duration::from_secs(self.timing.dialogue_timeout_secs),
            triggers: self.triggers.clone(),
            history_capacity: self.history_capacity,
        }
    }
}

/// Pacing knobs for the broadcast loops.
///
/// These are policy parameters, not correctness constraints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Scheduler tick interval (seconds).
    pub tick_interval_secs: u64,
    /// Anchor rotation interval (seconds).
    pub rotation_interval_secs: u64,
    /// Minimum inter-stage delay during a breakdown (seconds).
    pub stage_delay_min_secs: u64,
    /// Maximum inter-stage delay during a breakdown (seconds).
    pub stage_delay_max_secs: u64,
    /// Timeout for the dialogue collaborator per stage (seconds).
    pub dialogue_timeout_secs: u64,
    /// Metrics snapshot interval (seconds).
    pub metrics_interval_secs: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            rotation_interval_secs: 300,
            stage_delay_min_secs: 2,
            stage_delay_max_secs: 5,
            dialogue_timeout_secs: 10,
            metrics_interval_secs: 600,
        }
    }
}

/// Breakdown trigger and mental-state tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TriggerSettings {
    /// Lower bound of the next-breakdown window (hours after the last one).
    pub breakdown_window_min_hours: f64,
    /// Upper bound of the next-breakdown window (hours after the last one).
    pub breakdown_window_max_hours: f64,
    /// Drift trigger: probability gained per hour since the last breakdown.
    pub drift_rate_per_hour: f64,
    /// Drift trigger: probability ceiling.
    pub drift_cap: f64,
    /// Chance per tick that an anchor gains confusion.
    pub confusion_chance: f64,
    /// Confusion gained when the per-tick roll hits.
    pub confusion_increment: u8,
    /// Sanity lost per hour on air.
    pub sanity_decay_per_hour: f64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            breakdown_window_min_hours: 2.0,
            breakdown_window_max_hours: 6.0,
            drift_rate_per_hour: 0.01,
            drift_cap: 0.10,
            confusion_chance: 0.05,
            confusion_increment: 10,
            sanity_decay_per_hour: 1.5,
        }
    }
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Auto-start daemon if not running.
    pub auto_start: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self { auto_start: true }
    }
}
