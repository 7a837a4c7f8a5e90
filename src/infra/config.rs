//! Configuration loading from TOML files
//!
//! The binary selects the file with `--config <path>`, falling back to the
//! CONFIG_FILE environment variable and then `config/dev.toml`.

use crate::domain::{GeofenceDefinition, Position, Transition};
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Fence id used when the config does not name one
pub const DEFAULT_FENCE_ID: &str = "USER_GEOFENCE";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub id: String,
}

fn default_device_id() -> String {
    "geoalert".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    /// Requested interval between fixes
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { interval_ms: default_interval_ms(), high_accuracy: default_high_accuracy() }
    }
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_high_accuracy() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct FenceConfig {
    #[serde(default = "default_fence_id")]
    pub id: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
    #[serde(default = "default_fence_transitions")]
    pub transitions: Vec<Transition>,
}

impl Default for FenceConfig {
    fn default() -> Self {
        Self {
            id: default_fence_id(),
            latitude: None,
            longitude: None,
            radius_m: default_radius_m(),
            transitions: default_fence_transitions(),
        }
    }
}

fn default_fence_id() -> String {
    DEFAULT_FENCE_ID.to_string()
}

fn default_radius_m() -> f64 {
    200.0
}

fn default_fence_transitions() -> Vec<Transition> {
    vec![Transition::Enter, Transition::Exit]
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON file backing the key-value persistence
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    "geo_prefs.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Per-subscriber queue depth before the oldest event is overwritten
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { subscriber_capacity: default_subscriber_capacity() }
    }
}

fn default_subscriber_capacity() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_simulation_interval")]
    pub interval_ms: u64,
    /// Route replayed by the demo location source, as [lat, lng] pairs
    #[serde(default)]
    pub route: Vec<[f64; 2]>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { interval_ms: default_simulation_interval(), route: Vec::new() }
    }
}

fn default_simulation_interval() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub fence: FenceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    device_id: String,
    sampler_interval_ms: u64,
    sampler_high_accuracy: bool,
    fence_id: String,
    fence_center: Option<(f64, f64)>,
    fence_radius_m: f64,
    fence_transitions: Vec<Transition>,
    store_path: String,
    subscriber_capacity: usize,
    metrics_interval_secs: u64,
    simulation_interval_ms: u64,
    simulation_route: Vec<[f64; 2]>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let fence_center = match (toml_config.fence.latitude, toml_config.fence.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        };

        Self {
            device_id: toml_config.device.id,
            sampler_interval_ms: toml_config.sampler.interval_ms,
            sampler_high_accuracy: toml_config.sampler.high_accuracy,
            fence_id: toml_config.fence.id,
            fence_center,
            fence_radius_m: toml_config.fence.radius_m,
            fence_transitions: toml_config.fence.transitions,
            store_path: toml_config.store.path,
            subscriber_capacity: toml_config.bus.subscriber_capacity,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            simulation_interval_ms: toml_config.simulation.interval_ms,
            simulation_route: toml_config.simulation.route,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Fence described by the `[fence]` section, if it names a center
    ///
    /// The definition is not validated here; activation rejects malformed fences.
    pub fn fence(&self) -> Option<GeofenceDefinition> {
        let (lat, lng) = self.fence_center?;
        Some(
            GeofenceDefinition::new(self.fence_id.clone(), Position::new(lat, lng, 0), self.fence_radius_m)
                .with_transitions(self.fence_transitions.iter().copied()),
        )
    }

    // Getters for all config fields
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn sampler_interval_ms(&self) -> u64 {
        self.sampler_interval_ms
    }

    pub fn sampler_high_accuracy(&self) -> bool {
        self.sampler_high_accuracy
    }

    pub fn fence_id(&self) -> &str {
        &self.fence_id
    }

    pub fn fence_radius_m(&self) -> f64 {
        self.fence_radius_m
    }

    pub fn store_path(&self) -> &str {
        &self.store_path
    }

    pub fn subscriber_capacity(&self) -> usize {
        self.subscriber_capacity
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn simulation_interval_ms(&self) -> u64 {
        self.simulation_interval_ms
    }

    pub fn simulation_route(&self) -> &[[f64; 2]] {
        &self.simulation_route
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to place a fence
    #[cfg(test)]
    pub fn with_fence(mut self, lat: f64, lng: f64, radius_m: f64) -> Self {
        self.fence_center = Some((lat, lng));
        self.fence_radius_m = radius_m;
        self
    }
}
