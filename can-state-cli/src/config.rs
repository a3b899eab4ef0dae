//! Bench configuration loading and parsing

use anyhow::{Context, Result};
use can_state_decoder::{DecoderConfig, Feature, SimulatedState, VehicleVariant};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub params: ParamsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VehicleConfig {
    pub variant: VehicleVariant,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub accel_profile_button_link: bool,
    /// Override of the angle offset filter time constant in seconds
    pub offset_time_constant_s: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BenchConfig {
    /// Simulated speed in m/s
    #[serde(default)]
    pub speed: f64,
    /// Simulated road-wheel angle in radians
    #[serde(default)]
    pub angle_rad: f64,
    #[serde(default)]
    pub cruise_button: u8,
    #[serde(default)]
    pub engaged: bool,
    #[serde(default = "default_frames")]
    pub frames: u64,
    /// DBC replacing the built-in bench profile
    pub dbc: Option<PathBuf>,
}

fn default_frames() -> u64 {
    100
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            speed: 0.0,
            angle_rad: 0.0,
            cruise_button: 0,
            engaged: false,
            frames: default_frames(),
            dbc: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParamsConfig {
    /// Directory of the file-backed parameter store
    pub dir: Option<PathBuf>,
}

impl VehicleConfig {
    pub fn new(variant: VehicleVariant) -> Self {
        Self {
            variant,
            features: Vec::new(),
            accel_profile_button_link: false,
            offset_time_constant_s: None,
        }
    }

    /// Decoder session configuration for this vehicle
    pub fn decoder_config(&self) -> DecoderConfig {
        let mut config = self
            .features
            .iter()
            .fold(DecoderConfig::new(self.variant), |config, feature| config.with_feature(*feature))
            .with_accel_profile_button_link(self.accel_profile_button_link);
        if let Some(seconds) = self.offset_time_constant_s {
            config = config.with_offset_time_constant(seconds);
        }
        config
    }
}

impl BenchConfig {
    pub fn simulated_state(&self) -> SimulatedState {
        SimulatedState {
            speed: self.speed,
            angle_rad: self.angle_rad,
            cruise_button: self.cruise_button,
            is_engaged: self.engaged,
        }
    }
}

impl AppConfig {
    /// Configuration for a vehicle given on the command line only
    pub fn for_variant(variant: VehicleVariant) -> Self {
        Self {
            vehicle: VehicleConfig::new(variant),
            bench: BenchConfig::default(),
            params: ParamsConfig::default(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.bench.speed < 0.0 {
        anyhow::bail!("Bench speed must not be negative, got {}", config.bench.speed);
    }
    if let Some(dbc) = &config.bench.dbc {
        if !dbc.exists() {
            anyhow::bail!("Bench DBC not found: {:?}", dbc);
        }
    }

    Ok(config)
}
