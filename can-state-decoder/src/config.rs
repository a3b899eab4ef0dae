//! Decoder session configuration
//!
//! This module defines the per-session configuration of the decoder: which
//! vehicle is on the bus, which optional hardware it carries and the optional
//! toggles read from the configuration store. Everything here is fixed once the
//! session starts.

use crate::params::{self, ParamStore};
use crate::types::{DecoderError, Result};
use crate::variant::{Feature, FeatureFlags, VehicleVariant};
use serde::{Deserialize, Serialize};

/// Configuration for one decoder session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Vehicle variant on the bus
    pub variant: VehicleVariant,

    /// Optional hardware fitted to the car
    #[serde(default)]
    pub features: Vec<Feature>,

    /// Sync the on-car drive-mode switch to the acceleration profile setting
    #[serde(default)]
    pub accel_profile_button_link: bool,

    /// Time constant of the steering angle offset filter in seconds
    #[serde(default = "default_offset_time_constant")]
    pub steer_angle_offset_time_constant_s: f64,

    /// Decode cycle period in seconds
    #[serde(default = "default_control_period")]
    pub control_period_s: f64,
}

fn default_offset_time_constant() -> f64 {
    60.0
}

fn default_control_period() -> f64 {
    0.01
}

impl DecoderConfig {
    /// Create a configuration for `variant` with no optional features
    ///
    /// Features implied by the variant itself (radar ACC, hybrid powertrain)
    /// are filled in.
    pub fn new(variant: VehicleVariant) -> Self {
        let mut features = Vec::new();
        if variant.has_radar_acc() {
            features.push(Feature::RadarAcc);
        }
        if variant.is_hybrid() {
            features.push(Feature::Hybrid);
        }

        Self {
            variant,
            features,
            accel_profile_button_link: false,
            steer_angle_offset_time_constant_s: default_offset_time_constant(),
            control_period_s: default_control_period(),
        }
    }

    /// Builder method: add an optional feature
    pub fn with_feature(mut self, feature: Feature) -> Self {
        if !self.features.contains(&feature) {
            self.features.push(feature);
        }
        self
    }

    /// Builder method: link the drive-mode switch to the acceleration profile
    pub fn with_accel_profile_button_link(mut self, enabled: bool) -> Self {
        self.accel_profile_button_link = enabled;
        self
    }

    /// Builder method: set the angle offset filter time constant
    pub fn with_offset_time_constant(mut self, seconds: f64) -> Self {
        self.steer_angle_offset_time_constant_s = seconds;
        self
    }

    /// Builder method: apply the toggles found in the configuration store
    ///
    /// Toggles only switch features on; a missing key leaves the
    /// configuration untouched.
    pub fn with_param_toggles(mut self, store: &dyn ParamStore) -> Self {
        if store.get_bool(params::KEY_SECONDARY_STEER_SENSOR) {
            self = self.with_feature(Feature::SecondarySteerSensor);
        }
        if store.get_bool(params::KEY_ACCEL_PROFILE_BUTTON_LINK) {
            self.accel_profile_button_link = true;
        }
        self
    }

    /// Feature flags for this session
    pub fn flags(&self) -> FeatureFlags {
        FeatureFlags::from_features(&self.features)
    }

    /// Reject filter timings that cannot drive the session filters
    pub fn validate_timing(&self) -> Result<()> {
        let timings = [
            ("control_period_s", self.control_period_s),
            ("steer_angle_offset_time_constant_s", self.steer_angle_offset_time_constant_s),
        ];
        for (name, value) in timings {
            if !value.is_finite() || value <= 0.0 {
                return Err(DecoderError::InvalidConfiguration(format!(
                    "{} must be a positive number of seconds, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
