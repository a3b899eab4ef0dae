//! Vehicle state decoder
//!
//! [`VehicleStateDecoder`] turns the latest signal values of the powertrain and
//! camera buses into one [`VehicleStateSnapshot`] per cycle. Everything that
//! must survive between cycles (offset calibration, speed filter, lockout and
//! profile tracking) lives in a [`DecoderSession`] owned by the caller, so the
//! decoder itself holds only immutable session configuration.

use crate::calibration::AngleCalibration;
use crate::config::DecoderConfig;
use crate::params::{ParamStore, KEY_ACCEL_PROFILE, KEY_LAST_MODIFIED};
use crate::parser::RawSignalFrame;
use crate::schema::{build_schema, BusSchema, SignalPresence, SignalSchema};
use crate::speed::SpeedEstimator;
use crate::state::{AccelProfile, CruiseState, ShifterTable, VehicleStateSnapshot, WheelSpeeds};
use crate::types::Result;
use crate::variant::{FeatureFlags, VehicleVariant};

const KPH_TO_MS: f64 = 1.0 / 3.6;

/// Raw speed below which the car is at standstill
const STANDSTILL_SPEED: f64 = 0.001;

/// Averaged interceptor reading above which the pedal counts as pressed
const INTERCEPTOR_GAS_THRESHOLD: f64 = 805.0;

/// PCM cruise state reported while held at standstill
const CRUISE_STATE_STANDSTILL: f64 = 7.0;

/// `PCM_CRUISE_2.LOW_SPEED_LOCKOUT` value meaning locked out
const LOW_SPEED_LOCKOUT_ACTIVE: f64 = 2.0;

/// ACC type of the stock stop-and-go capable control path
const ACC_TYPE_STOCK: f64 = 1.0;

/// Pre-collision brake force below this is an active stock AEB request
const AEB_FORCE_THRESHOLD: f64 = -1e-5;

/// Cross-cycle state of one decoding session
#[derive(Debug, Clone)]
pub struct DecoderSession {
    calibration: AngleCalibration,
    speed: SpeedEstimator,
    low_speed_lockout: bool,
    accel_profile: Option<AccelProfile>,
    accel_profile_synced: bool,
    cycles: u64,
}

impl DecoderSession {
    /// Fresh session state for `config`
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            calibration: AngleCalibration::new(
                config.steer_angle_offset_time_constant_s,
                config.control_period_s,
            ),
            speed: SpeedEstimator::new(config.control_period_s),
            low_speed_lockout: false,
            accel_profile: None,
            accel_profile_synced: false,
            cycles: 0,
        }
    }

    pub fn calibration(&self) -> &AngleCalibration {
        &self.calibration
    }

    /// Number of completed decode cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

/// Signal lookup on one bus with the schema's fallback policy applied
struct BusView<'a> {
    frame: &'a RawSignalFrame,
    schema: &'a BusSchema,
}

impl<'a> BusView<'a> {
    fn new(frame: &'a RawSignalFrame, schema: &'a BusSchema) -> Self {
        Self { frame, schema }
    }

    /// Latest value, or the documented default when the parser has none
    fn get(&self, message: &str, signal: &str) -> f64 {
        match (self.frame.value(message, signal), self.schema.presence(message, signal)) {
            (Some(value), Some(_)) => value,
            (None, Some(SignalPresence::Optional { default })) => default,
            (None, Some(SignalPresence::Required)) => 0.0,
            (_, None) => {
                log::trace!("{}.{} not in bus {} schema", message, signal, self.schema.bus);
                0.0
            }
        }
    }

    fn is_set(&self, message: &str, signal: &str) -> bool {
        self.get(message, signal) != 0.0
    }
}

/// Decodes bus snapshots into vehicle state for one configured vehicle
pub struct VehicleStateDecoder {
    config: DecoderConfig,
    flags: FeatureFlags,
    schema: SignalSchema,
    shifter_table: ShifterTable,
    params: Option<Box<dyn ParamStore>>,
}

impl VehicleStateDecoder {
    /// Create a decoder for one session
    ///
    /// # Arguments
    /// * `config` - Vehicle variant and optional features
    ///
    /// # Returns
    /// * `Result<Self>` - Err if the feature flags are invalid for the variant,
    ///   or if the control period or offset time constant is not positive
    ///
    /// # Example
    /// ```
    /// use can_state_decoder::{
    ///     DecoderConfig, DecoderSession, RawSignalFrame, VehicleStateDecoder, VehicleVariant,
    /// };
    ///
    /// let config = DecoderConfig::new(VehicleVariant::Corolla);
    /// let decoder = VehicleStateDecoder::new(config.clone()).unwrap();
    /// let mut session = DecoderSession::new(&config);
    ///
    /// let pt = RawSignalFrame::new(0).with_value("WHEEL_SPEEDS", "WHEEL_SPEED_FL", 4.0);
    /// let cam = RawSignalFrame::new(2);
    /// let state = decoder.decode(&pt, &cam, &mut session);
    /// assert_eq!(state.v_ego_raw, 1.0);
    /// ```
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate_timing()?;
        let flags = config.flags();
        let schema = build_schema(config.variant, flags)?;

        log::info!(
            "Decoder configured for {} (flags {:?}): {} powertrain messages, {} camera messages",
            config.variant,
            flags,
            schema.powertrain.messages.len(),
            schema.camera.messages.len()
        );

        Ok(Self {
            config,
            flags,
            schema,
            shifter_table: ShifterTable::default(),
            params: None,
        })
    }

    /// Builder method: use a custom gear code table
    pub fn with_shifter_table(mut self, table: ShifterTable) -> Self {
        self.shifter_table = table;
        self
    }

    /// Builder method: record the acceleration profile in a configuration store
    pub fn with_param_store(mut self, store: Box<dyn ParamStore>) -> Self {
        self.params = Some(store);
        self
    }

    /// Schema both bus parsers must be configured with
    pub fn schema(&self) -> &SignalSchema {
        &self.schema
    }

    pub fn variant(&self) -> VehicleVariant {
        self.config.variant
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    /// Decode one cycle
    ///
    /// Never fails: missing signals resolve to their schema defaults, and an
    /// invalid powertrain bus only pauses the angle calibration.
    pub fn decode(
        &self,
        pt_frame: &RawSignalFrame,
        cam_frame: &RawSignalFrame,
        session: &mut DecoderSession,
    ) -> VehicleStateSnapshot {
        let pt = BusView::new(pt_frame, &self.schema.powertrain);
        let cam = BusView::new(cam_frame, &self.schema.camera);
        let variant = self.config.variant;
        let interceptor = self.flags.contains(FeatureFlags::GAS_INTERCEPTOR);

        // Pedals
        let brake_pressed = pt.is_set("BRAKE_MODULE", "BRAKE_PRESSED");
        let brake_lights = pt.is_set("ESP_CONTROL", "BRAKE_LIGHTS_ACC") || brake_pressed;
        let (gas, gas_pressed) = if interceptor {
            let gas = ((pt.get("GAS_SENSOR", "INTERCEPTOR_GAS")
                + pt.get("GAS_SENSOR", "INTERCEPTOR_GAS2"))
                / 2.0)
                .floor();
            (gas, gas > INTERCEPTOR_GAS_THRESHOLD)
        } else {
            // Pedal value and release flag can disagree; the release flag wins
            let pedal_msg = if self.flags.contains(FeatureFlags::HYBRID) {
                "GAS_PEDAL_HYBRID"
            } else {
                "GAS_PEDAL"
            };
            (
                pt.get(pedal_msg, "GAS_PEDAL"),
                pt.get("PCM_CRUISE", "GAS_RELEASED") == 0.0,
            )
        };

        // Longitudinal
        let wheel_speeds = WheelSpeeds {
            fl: pt.get("WHEEL_SPEEDS", "WHEEL_SPEED_FL"),
            fr: pt.get("WHEEL_SPEEDS", "WHEEL_SPEED_FR"),
            rl: pt.get("WHEEL_SPEEDS", "WHEEL_SPEED_RL"),
            rr: pt.get("WHEEL_SPEEDS", "WHEEL_SPEED_RR"),
        };
        let v_ego_raw = wheel_speeds.mean();
        let (v_ego, a_ego) = session.speed.update(v_ego_raw);

        // Steering
        let coarse_angle = pt.get("STEER_ANGLE_SENSOR", "STEER_ANGLE")
            + pt.get("STEER_ANGLE_SENSOR", "STEER_FRACTION");
        let fine_angle = if self.flags.contains(FeatureFlags::SECONDARY_STEER_SENSOR) {
            pt.get("SECONDARY_STEER_ANGLE", "ZORRO_STEER")
        } else {
            pt.get("STEER_TORQUE_SENSOR", "STEER_ANGLE")
        };
        let corrected = session.calibration.update(
            coarse_angle,
            fine_angle,
            pt.is_set("STEER_TORQUE_SENSOR", "STEER_ANGLE_INITIALIZING"),
            pt_frame.bus_valid,
        );

        let steering_torque = pt.get("STEER_TORQUE_SENSOR", "STEER_TORQUE_DRIVER");
        let steer_state = pt.get("EPS_STATUS", "LKA_STATE");

        let gear_shifter = self.shifter_table.lookup(pt.get("GEAR_PACKET", "GEAR") as i64);
        let accel_profile = if self.config.accel_profile_button_link {
            self.update_accel_profile(&pt, session)
        } else {
            None
        };

        // Cruise
        let cruise_msg = if variant.uses_dsu_cruise() {
            "DSU_CRUISE"
        } else {
            "PCM_CRUISE_2"
        };
        let pcm_acc_status = pt.get("PCM_CRUISE", "CRUISE_STATE");
        let cruise_enabled = pt.is_set("PCM_CRUISE", "CRUISE_ACTIVE");
        let cruise_state = CruiseState {
            available: pt.is_set(cruise_msg, "MAIN_ON"),
            enabled: cruise_enabled,
            speed: pt.get(cruise_msg, "SET_SPEED") * KPH_TO_MS,
            // These cars resume from standstill on their own
            standstill: !(variant.has_no_stop_timer() || interceptor)
                && pcm_acc_status == CRUISE_STATE_STANDSTILL,
            non_adaptive: (1.0..=6.0).contains(&pcm_acc_status),
        };

        let (acc_type, stock_fcw) = if self.flags.contains(FeatureFlags::RADAR_ACC) {
            (pt.get("ACC_CONTROL", "ACC_TYPE"), pt.is_set("ACC_HUD", "FCW"))
        } else if variant.is_tss2() {
            (cam.get("ACC_CONTROL", "ACC_TYPE"), cam.is_set("ACC_HUD", "FCW"))
        } else {
            (ACC_TYPE_STOCK, false)
        };

        // Some TSS2 cars report a permanent lockout, identified by a non-stock ACC type
        let reads_lockout = (!variant.is_tss2() && !variant.ignores_low_speed_lockout())
            || (variant.is_tss2() && acc_type == ACC_TYPE_STOCK);
        if reads_lockout {
            let lockout = pt.get("PCM_CRUISE_2", "LOW_SPEED_LOCKOUT") == LOW_SPEED_LOCKOUT_ACTIVE;
            if lockout != session.low_speed_lockout {
                log::debug!("Low speed lockout {}", if lockout { "engaged" } else { "released" });
            }
            session.low_speed_lockout = lockout;
        }

        let blindspot_monitor = self.flags.contains(FeatureFlags::BLIND_SPOT_MONITOR);
        let (left_blindspot, right_blindspot) = if blindspot_monitor {
            (
                pt.get("BSM", "L_ADJACENT") == 1.0 || pt.get("BSM", "L_APPROACHING") == 1.0,
                pt.get("BSM", "R_ADJACENT") == 1.0 || pt.get("BSM", "R_APPROACHING") == 1.0,
            )
        } else {
            (false, false)
        };

        let turn_signals = pt.get("BLINKERS_STATE", "TURN_SIGNALS");
        session.cycles += 1;

        VehicleStateSnapshot {
            door_open: ["DOOR_OPEN_FL", "DOOR_OPEN_FR", "DOOR_OPEN_RL", "DOOR_OPEN_RR"]
                .iter()
                .any(|door| pt.is_set("BODY_CONTROL_STATE", door)),
            seatbelt_unlatched: pt.is_set("BODY_CONTROL_STATE", "SEATBELT_DRIVER_UNLATCHED"),
            parking_brake: pt.get("BODY_CONTROL_STATE", "PARKING_BRAKE") == 1.0,
            generic_toggle: pt.is_set("LIGHT_STALK", "AUTO_HIGH_BEAM"),
            left_blinker: turn_signals == 1.0,
            right_blinker: turn_signals == 2.0,

            brake_pressed,
            brake_lights,
            gas,
            gas_pressed,

            wheel_speeds,
            v_ego_raw,
            v_ego,
            a_ego,
            standstill: v_ego_raw < STANDSTILL_SPEED,
            engine_rpm: pt.get("ENGINE_RPM", "RPM"),
            gear_shifter,

            steering_angle_deg: corrected.angle_deg,
            steering_angle_offset_deg: corrected.offset_deg,
            steering_rate_deg: pt.get("STEER_ANGLE_SENSOR", "STEER_RATE"),
            steering_torque,
            steering_torque_eps: pt.get("STEER_TORQUE_SENSOR", "STEER_TORQUE_EPS")
                * variant.eps_torque_scale(),
            steering_pressed: steering_torque.abs() > variant.steer_threshold(),
            // 1 and 5 are the nominal assist states
            steer_fault_temporary: steer_state != 1.0 && steer_state != 5.0,
            steer_state,
            calibration_phase: session.calibration.phase(),

            cruise_state,
            cruise_actual_enabled: cruise_enabled,
            pcm_acc_status,
            distance_lines: pt.get("PCM_CRUISE_SM", "DISTANCE_LINES"),
            accel_profile,
            low_speed_lockout: session.low_speed_lockout,
            acc_type,

            esp_disabled: pt.is_set("ESP_CONTROL", "TC_DISABLED"),
            left_blindspot,
            right_blindspot,
            stock_fcw,
            stock_aeb: cam.is_set("PRE_COLLISION", "PRECOLLISION_ACTIVE")
                && cam.get("PRE_COLLISION", "FORCE") < AEB_FORCE_THRESHOLD,

            can_valid: pt_frame.bus_valid,
            camera_can_valid: cam_frame.bus_valid,
        }
    }

    /// Resolve the drive-mode switch and sync it to the configuration store
    ///
    /// The switch is read from `GEAR_PACKET` on every variant. `SPORT_ON_2` and
    /// `GEAR_PACKET2` are decoded by the parser but never decide the profile.
    fn update_accel_profile(
        &self,
        pt: &BusView<'_>,
        session: &mut DecoderSession,
    ) -> Option<AccelProfile> {
        let sport_on = pt.get("GEAR_PACKET", "SPORT_ON");
        let econ_on = pt.get("GEAR_PACKET", "ECON_ON");

        let profile = if sport_on == 0.0 && econ_on == 0.0 {
            Some(AccelProfile::Normal)
        } else if sport_on == 1.0 {
            Some(AccelProfile::Sport)
        } else if econ_on == 1.0 {
            Some(AccelProfile::Eco)
        } else {
            session.accel_profile
        };

        if let Some(profile) = profile {
            if !session.accel_profile_synced || session.accel_profile != Some(profile) {
                log::debug!("Acceleration profile now {:?}", profile);
                if let Some(params) = &self.params {
                    params.put_nonblocking(KEY_ACCEL_PROFILE, profile.as_param());
                    let now = chrono::Utc::now().timestamp();
                    params.put_nonblocking(KEY_LAST_MODIFIED, now.to_string());
                }
                session.accel_profile_synced = true;
            }
        }
        session.accel_profile = profile;
        profile
    }
}
