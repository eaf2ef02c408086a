// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Configuration file handling.
//!
//! Startup configuration for the engine and the simulated board, in TOML.
//! Default path: `/etc/thermal-fan/config.toml`

use crate::alarm::AlarmThresholds;
use crate::curve::{self, FanCurve};
use crate::engine::{self, ChannelConfig, EngineSettings, SensorBinding};
use crate::ramp;
use crate::tach::{self, TachSettings};
use crate::thermistor::ThermistorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/thermal-fan/config.toml";

/// Default control tick period in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 250;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine timing and channel counts.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Thermistor divider constants.
    #[serde(default)]
    pub thermistor: ThermistorConfig,

    /// Per-fan settings, indexed by fan channel.
    #[serde(default = "default_fans")]
    pub fans: Vec<FanConfig>,

    /// Simulated board parameters (binary only).
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Control tick period, in milliseconds.
    pub tick_interval_ms: u64,

    /// Time between ramp steps, in milliseconds.
    pub step_period_ms: u64,

    /// A fan with no tachometer edge for this long reads 0 RPM.
    pub stuck_threshold_ms: u64,

    /// Tachometer edges closer than this are ignored.
    pub debounce_ms: u64,

    pub pulses_per_revolution: u32,

    /// Duty (percent) used when a fan's sensor is unavailable.
    pub fallback_duty_percent: u8,

    /// Number of thermistor channels.
    pub sensor_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            step_period_ms: ramp::DEFAULT_STEP_PERIOD_MS,
            stuck_threshold_ms: tach::DEFAULT_STUCK_THRESHOLD_MS,
            debounce_ms: tach::DEFAULT_DEBOUNCE_MS,
            pulses_per_revolution: tach::DEFAULT_PULSES_PER_REVOLUTION,
            fallback_duty_percent: engine::DEFAULT_FALLBACK_DUTY_PERCENT,
            sensor_count: engine::DEFAULT_SENSOR_COUNT,
        }
    }
}

/// How a single fan channel is driven.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanConfig {
    /// Temperature channel feeding the curve and the temperature alarm.
    #[serde(default)]
    pub sensor: usize,

    /// Temperature alarm threshold in Celsius; absent disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_alarm_c: Option<f32>,

    /// Minimum RPM before the RPM alarm fires; absent disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm_alarm: Option<u32>,

    /// Nominal ramp length in step periods.
    #[serde(default = "default_step_duration")]
    pub step_duration_seconds: u8,

    /// Temperature threshold to PWM duty points, ascending.
    #[serde(default = "curve::default_curve")]
    pub curve: FanCurve,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            sensor: 0,
            temperature_alarm_c: None,
            rpm_alarm: None,
            step_duration_seconds: default_step_duration(),
            curve: curve::default_curve(),
        }
    }
}

impl FanConfig {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            curve: self.curve.clone(),
            binding: SensorBinding {
                sensor: self.sensor,
                thresholds: AlarmThresholds {
                    temperature_c: self.temperature_alarm_c,
                    rpm: self.rpm_alarm,
                },
                step_duration_seconds: self.step_duration_seconds,
            },
        }
    }
}

/// Parameters for the simulated board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Coolant temperature with fans at full speed.
    pub ambient_c: f64,

    /// Rise above ambient with fans stopped.
    pub heat_load_c: f64,

    /// Fan speed at full duty.
    pub max_rpm: u32,

    /// Fans whose rotor is held still; their tachometers never pulse.
    pub stalled_fans: Vec<usize>,

    /// Period of the status line, in milliseconds. Zero disables it.
    pub status_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ambient_c: 27.0,
            heat_load_c: 20.0,
            max_rpm: 1800,
            stalled_fans: Vec::new(),
            status_interval_ms: 2000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            thermistor: ThermistorConfig::default(),
            fans: default_fans(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            fan_count: self.fans.len(),
            sensor_count: self.engine.sensor_count,
            tach: TachSettings {
                debounce_ms: self.engine.debounce_ms,
                stuck_threshold_ms: self.engine.stuck_threshold_ms,
                pulses_per_revolution: self.engine.pulses_per_revolution,
            },
            step_period_ms: self.engine.step_period_ms,
            fallback_duty: curve::percent_to_duty(self.engine.fallback_duty_percent),
            thermistor: self.thermistor,
        }
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.fans.is_empty() {
            return Err("At least one fan must be configured".to_string());
        }
        if self.engine.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be at least 1".to_string());
        }
        if self.engine.sensor_count == 0 {
            return Err("sensor_count must be at least 1".to_string());
        }
        if self.engine.pulses_per_revolution == 0 {
            return Err("pulses_per_revolution must be at least 1".to_string());
        }
        for (i, fan) in self.fans.iter().enumerate() {
            if fan.sensor >= self.engine.sensor_count {
                return Err(format!(
                    "Fan {i} references sensor {} but only {} are configured",
                    fan.sensor, self.engine.sensor_count
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load config from a TOML file, or return the default if the file doesn't exist.
pub fn load_config(path: &Path) -> io::Result<Config> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config = parse_config(&contents)?;

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parse and validate config text.
pub fn parse_config(contents: &str) -> io::Result<Config> {
    let config: Config = toml::from_str(contents).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse config: {e}"),
        )
    })?;
    config
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(config)
}

/// Render a config as TOML.
pub fn render_config(config: &Config) -> io::Result<String> {
    toml::to_string_pretty(config).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to serialize config: {e}"),
        )
    })
}

/// Resolve the config file path from CLI arg or default.
pub fn resolve_config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_fans() -> Vec<FanConfig> {
    vec![FanConfig::default(); engine::DEFAULT_FAN_COUNT]
}

fn default_step_duration() -> u8 {
    1
}
