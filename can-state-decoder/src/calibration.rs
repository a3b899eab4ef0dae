//! Steering angle offset calibration
//!
//! The steering angle sensor is absolute but coarse. The torque sensor (or an
//! aftermarket secondary sensor) reports a finer angle, but is zeroed wherever
//! the wheel happened to be at power-on. [`AngleCalibration`] learns the offset
//! between the two with a slow low-pass filter and, once it has seen enough
//! samples, reports the fine angle with the offset removed.

use serde::{Deserialize, Serialize};

/// Fine-sensor readings at or below this magnitude are treated as unset
const SEEN_EPSILON_DEG: f64 = 1e-3;

/// Offsets learned at large angles are unreliable
const MAX_CALIBRATION_ANGLE_DEG: f64 = 90.0;

/// First-order low-pass filter
///
/// The first sample seeds the estimate. The filter reports itself initialized
/// after one time constant's worth of samples.
#[derive(Debug, Clone)]
pub struct FirstOrderFilter {
    x: f64,
    alpha: f64,
    updates: u64,
    required_updates: u64,
}

impl FirstOrderFilter {
    /// Create a filter with time constant `time_constant_s` sampled every `dt_s`
    pub fn new(time_constant_s: f64, dt_s: f64) -> Self {
        let required_updates = (time_constant_s / dt_s).round().max(1.0) as u64;
        Self {
            x: 0.0,
            alpha: dt_s / (time_constant_s + dt_s),
            updates: 0,
            required_updates,
        }
    }

    /// Feed one sample and return the new estimate
    pub fn update(&mut self, sample: f64) -> f64 {
        if self.updates == 0 {
            self.x = sample;
        } else {
            self.x = (1.0 - self.alpha) * self.x + self.alpha * sample;
        }
        self.updates = self.updates.saturating_add(1);
        self.x
    }

    /// Current estimate
    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn initialized(&self) -> bool {
        self.updates >= self.required_updates
    }

    /// Number of samples needed before the filter is initialized
    pub fn required_updates(&self) -> u64 {
        self.required_updates
    }
}

/// Calibration progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    /// No plausible fine-sensor sample yet
    Unseen,
    /// Learning the offset
    Seen,
    /// Offset estimate in use
    Initialized,
}

/// Result of one calibration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedAngle {
    /// Best available steering angle
    pub angle_deg: f64,
    /// Learned offset, once initialized
    pub offset_deg: Option<f64>,
}

/// Offset estimator between the coarse and fine angle sensors
#[derive(Debug, Clone)]
pub struct AngleCalibration {
    filter: FirstOrderFilter,
    seen: bool,
}

impl AngleCalibration {
    /// # Arguments
    /// * `time_constant_s` - Offset filter time constant
    /// * `dt_s` - Decode cycle period
    pub fn new(time_constant_s: f64, dt_s: f64) -> Self {
        Self {
            filter: FirstOrderFilter::new(time_constant_s, dt_s),
            seen: false,
        }
    }

    /// Run one calibration step
    ///
    /// # Arguments
    /// * `coarse_deg` - Absolute angle from the steering angle sensor
    /// * `fine_deg` - Angle from the fine sensor, zeroed at power-on
    /// * `initializing` - Fine sensor reports it is still initializing
    /// * `bus_valid` - Powertrain bus health this cycle
    pub fn update(
        &mut self,
        coarse_deg: f64,
        fine_deg: f64,
        initializing: bool,
        bus_valid: bool,
    ) -> CorrectedAngle {
        if !self.seen && fine_deg.abs() > SEEN_EPSILON_DEG && !initializing {
            log::debug!("Fine steering angle seen ({:.3} deg), learning offset", fine_deg);
            self.seen = true;
        }

        if self.seen && coarse_deg.abs() < MAX_CALIBRATION_ANGLE_DEG && bus_valid {
            let was_initialized = self.filter.initialized();
            self.filter.update(fine_deg - coarse_deg);
            if !was_initialized && self.filter.initialized() {
                log::debug!("Steering angle offset initialized at {:.3} deg", self.filter.x());
            }
        }

        if self.filter.initialized() {
            CorrectedAngle {
                angle_deg: fine_deg - self.filter.x(),
                offset_deg: Some(self.filter.x()),
            }
        } else {
            CorrectedAngle {
                angle_deg: coarse_deg,
                offset_deg: None,
            }
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        if self.filter.initialized() {
            CalibrationPhase::Initialized
        } else if self.seen {
            CalibrationPhase::Seen
        } else {
            CalibrationPhase::Unseen
        }
    }
}
