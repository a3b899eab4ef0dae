//! Vehicle state snapshot types
//!
//! One [`VehicleStateSnapshot`] is produced per decode cycle and handed to the
//! publishing boundary by value. All fields are always populated.

use crate::calibration::CalibrationPhase;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Gear selector position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearShifter {
    #[default]
    Unknown,
    Park,
    Drive,
    Neutral,
    Reverse,
    Sport,
    Low,
    Brake,
    Eco,
    Manumatic,
}

impl GearShifter {
    /// Parse the letter used in DBC value tables
    pub fn from_letter(letter: &str) -> Self {
        match letter {
            "P" => GearShifter::Park,
            "R" => GearShifter::Reverse,
            "N" => GearShifter::Neutral,
            "E" => GearShifter::Eco,
            "T" => GearShifter::Manumatic,
            "D" => GearShifter::Drive,
            "S" => GearShifter::Sport,
            "L" => GearShifter::Low,
            "B" => GearShifter::Brake,
            _ => GearShifter::Unknown,
        }
    }
}

impl fmt::Display for GearShifter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GearShifter::Unknown => "unknown",
            GearShifter::Park => "park",
            GearShifter::Drive => "drive",
            GearShifter::Neutral => "neutral",
            GearShifter::Reverse => "reverse",
            GearShifter::Sport => "sport",
            GearShifter::Low => "low",
            GearShifter::Brake => "brake",
            GearShifter::Eco => "eco",
            GearShifter::Manumatic => "manumatic",
        };
        write!(f, "{}", name)
    }
}

/// Raw gear code to selector position
#[derive(Debug, Clone, PartialEq)]
pub struct ShifterTable {
    codes: HashMap<i64, GearShifter>,
}

impl ShifterTable {
    /// Build a table from (code, letter) pairs as found in a DBC value table
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (i64, &'a str)>) -> Self {
        Self {
            codes: pairs
                .into_iter()
                .map(|(code, letter)| (code, GearShifter::from_letter(letter)))
                .collect(),
        }
    }

    /// Selector for a raw code; unknown codes map to [`GearShifter::Unknown`]
    pub fn lookup(&self, code: i64) -> GearShifter {
        self.codes.get(&code).copied().unwrap_or_default()
    }
}

impl Default for ShifterTable {
    /// `GEAR_PACKET.GEAR` values of the Toyota powertrain DBCs
    fn default() -> Self {
        Self::from_pairs([(0, "D"), (1, "S"), (8, "N"), (16, "R"), (32, "P")])
    }
}

/// Acceleration profile selected with the drive-mode switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelProfile {
    Eco = 0,
    Normal = 1,
    Sport = 2,
}

impl AccelProfile {
    /// Value written to the configuration store
    pub fn as_param(&self) -> String {
        (*self as u8).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub fl: f64,
    pub fr: f64,
    pub rl: f64,
    pub rr: f64,
}

impl WheelSpeeds {
    /// Arithmetic mean of the four wheels
    pub fn mean(&self) -> f64 {
        (self.fl + self.fr + self.rl + self.rr) / 4.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CruiseState {
    /// Main switch on
    pub available: bool,
    pub enabled: bool,
    /// Set speed in m/s
    pub speed: f64,
    /// Held at standstill, waiting for a resume command
    pub standstill: bool,
    /// Plain cruise control rather than ACC
    pub non_adaptive: bool,
}

/// Decoded vehicle state for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleStateSnapshot {
    // Body
    pub door_open: bool,
    pub seatbelt_unlatched: bool,
    pub parking_brake: bool,
    pub generic_toggle: bool,
    pub left_blinker: bool,
    pub right_blinker: bool,

    // Pedals
    pub brake_pressed: bool,
    pub brake_lights: bool,
    pub gas: f64,
    pub gas_pressed: bool,

    // Longitudinal
    pub wheel_speeds: WheelSpeeds,
    pub v_ego_raw: f64,
    pub v_ego: f64,
    pub a_ego: f64,
    pub standstill: bool,
    pub engine_rpm: f64,
    pub gear_shifter: GearShifter,

    // Steering
    pub steering_angle_deg: f64,
    /// Learned offset between the angle sensors, once calibrated
    pub steering_angle_offset_deg: Option<f64>,
    pub steering_rate_deg: f64,
    /// Driver torque
    pub steering_torque: f64,
    /// Assist torque, scaled to driver torque units
    pub steering_torque_eps: f64,
    pub steering_pressed: bool,
    pub steer_fault_temporary: bool,
    /// Raw EPS assist state
    pub steer_state: f64,
    pub calibration_phase: CalibrationPhase,

    // Cruise
    pub cruise_state: CruiseState,
    pub cruise_actual_enabled: bool,
    /// Raw PCM cruise state
    pub pcm_acc_status: f64,
    pub distance_lines: f64,
    pub accel_profile: Option<AccelProfile>,
    pub low_speed_lockout: bool,
    pub acc_type: f64,

    // Safety systems
    pub esp_disabled: bool,
    pub left_blindspot: bool,
    pub right_blindspot: bool,
    pub stock_fcw: bool,
    pub stock_aeb: bool,

    // Bus health
    pub can_valid: bool,
    pub camera_can_valid: bool,
}
