//! Signal schema registry
//!
//! Resolves a (variant, feature flags) pair into the messages and signals each
//! bus parser must decode, together with the minimum update frequency used to
//! flag stale messages. The registry is a pure function: building the same
//! schema twice yields identical values.
//!
//! Every signal carries an explicit [`SignalPresence`]. Optional signals declare
//! the value the decoder substitutes when the bus parser never reports them, so
//! fallback behaviour is data rather than scattered special cases.

use crate::types::{DecoderError, Result};
use crate::variant::{FeatureFlags, VehicleVariant};
use serde::Serialize;
use std::collections::BTreeMap;

/// Powertrain bus index
pub const POWERTRAIN_BUS: u8 = 0;
/// Camera bus index
pub const CAMERA_BUS: u8 = 2;

/// Whether a signal must be reported, and what to use when it is not
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPresence {
    /// Present in every message layout of the variant
    Required,
    /// May be absent from the variant's layout; absent means `default`
    Optional { default: f64 },
}

/// One message the parser must decode
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MessageRequirement {
    /// Signals to decode from this message
    pub signals: BTreeMap<String, SignalPresence>,
    /// Minimum update frequency in Hz; `None` disables the freshness check
    pub frequency_hz: Option<f64>,
}

/// Messages and signals required on one bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusSchema {
    /// Bus index the schema applies to
    pub bus: u8,
    /// Requirements keyed by message name
    pub messages: BTreeMap<String, MessageRequirement>,
}

impl BusSchema {
    /// Create an empty schema for `bus`
    pub fn new(bus: u8) -> Self {
        Self {
            bus,
            messages: BTreeMap::new(),
        }
    }

    /// Require `signal` from `message`
    pub fn add_signal(
        &mut self,
        signal: &str,
        message: &str,
        presence: SignalPresence,
    ) -> &mut Self {
        self.messages
            .entry(message.to_string())
            .or_default()
            .signals
            .insert(signal.to_string(), presence);
        self
    }

    /// Require `message` to update at least `frequency_hz` times per second
    ///
    /// A frequency of zero registers the message without a freshness check.
    pub fn check(&mut self, message: &str, frequency_hz: f64) -> &mut Self {
        let requirement = self.messages.entry(message.to_string()).or_default();
        requirement.frequency_hz = if frequency_hz > 0.0 { Some(frequency_hz) } else { None };
        self
    }

    /// Presence contract of a signal, `None` when it is not in the schema
    pub fn presence(&self, message: &str, signal: &str) -> Option<SignalPresence> {
        self.messages
            .get(message)
            .and_then(|req| req.signals.get(signal))
            .copied()
    }

    /// Whether the schema asks for `signal` on `message`
    pub fn contains(&self, message: &str, signal: &str) -> bool {
        self.presence(message, signal).is_some()
    }

    /// Required frequency of a message
    pub fn frequency(&self, message: &str) -> Option<f64> {
        self.messages.get(message).and_then(|req| req.frequency_hz)
    }

    /// Messages with a freshness check, with their frequency
    pub fn checked_messages(&self) -> impl Iterator<Item = (&str, f64)> {
        self.messages
            .iter()
            .filter_map(|(name, req)| req.frequency_hz.map(|freq| (name.as_str(), freq)))
    }

    /// Total number of (signal, message) pairs
    pub fn num_signals(&self) -> usize {
        self.messages.values().map(|req| req.signals.len()).sum()
    }

    fn required(&mut self, message: &str, signals: &[&str]) -> &mut Self {
        for signal in signals {
            self.add_signal(signal, message, SignalPresence::Required);
        }
        self
    }

    fn optional(&mut self, message: &str, signals: &[&str], default: f64) -> &mut Self {
        for signal in signals {
            self.add_signal(signal, message, SignalPresence::Optional { default });
        }
        self
    }
}

/// Schemas for both buses of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSchema {
    pub variant: VehicleVariant,
    #[serde(serialize_with = "serialize_flags")]
    pub flags: FeatureFlags,
    pub powertrain: BusSchema,
    pub camera: BusSchema,
}

fn serialize_flags<S: serde::Serializer>(
    flags: &FeatureFlags,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u8(flags.bits())
}

/// Build the signal schema for a variant and its feature flags
///
/// Fails when the flags claim hardware the variant is never fitted with, or
/// disagree with the variant's ACC architecture.
pub fn build_schema(variant: VehicleVariant, flags: FeatureFlags) -> Result<SignalSchema> {
    validate(variant, flags)?;

    Ok(SignalSchema {
        variant,
        flags,
        powertrain: powertrain_schema(variant, flags),
        camera: camera_schema(variant, flags),
    })
}

fn validate(variant: VehicleVariant, flags: FeatureFlags) -> Result<()> {
    if flags.contains(FeatureFlags::HYBRID) && !variant.is_hybrid() {
        return Err(DecoderError::InvalidConfiguration(format!(
            "{} is never fitted with a hybrid powertrain",
            variant
        )));
    }

    let radar_flag = flags.contains(FeatureFlags::RADAR_ACC);
    if radar_flag != variant.has_radar_acc() {
        return Err(DecoderError::InvalidConfiguration(format!(
            "{} uses {} ACC but radar ACC flag is {}",
            variant,
            if variant.has_radar_acc() { "radar" } else { "camera" },
            if radar_flag { "set" } else { "unset" }
        )));
    }

    Ok(())
}

fn powertrain_schema(variant: VehicleVariant, flags: FeatureFlags) -> BusSchema {
    let mut schema = BusSchema::new(POWERTRAIN_BUS);

    schema
        .required("STEER_ANGLE_SENSOR", &["STEER_ANGLE", "STEER_FRACTION", "STEER_RATE"])
        .required("GEAR_PACKET", &["GEAR"])
        .optional("GEAR_PACKET", &["SPORT_ON", "ECON_ON"], 0.0)
        .required("BRAKE_MODULE", &["BRAKE_PRESSED"])
        .required(
            "WHEEL_SPEEDS",
            &["WHEEL_SPEED_FL", "WHEEL_SPEED_FR", "WHEEL_SPEED_RL", "WHEEL_SPEED_RR"],
        )
        .required(
            "BODY_CONTROL_STATE",
            &[
                "DOOR_OPEN_FL",
                "DOOR_OPEN_FR",
                "DOOR_OPEN_RL",
                "DOOR_OPEN_RR",
                "SEATBELT_DRIVER_UNLATCHED",
                "PARKING_BRAKE",
            ],
        )
        .required("ESP_CONTROL", &["TC_DISABLED"])
        .optional("ESP_CONTROL", &["BRAKE_LIGHTS_ACC"], 0.0)
        .required("PCM_CRUISE", &["CRUISE_ACTIVE", "CRUISE_STATE", "GAS_RELEASED"])
        .required(
            "STEER_TORQUE_SENSOR",
            &[
                "STEER_TORQUE_DRIVER",
                "STEER_TORQUE_EPS",
                "STEER_ANGLE",
                "STEER_ANGLE_INITIALIZING",
            ],
        )
        .required("BLINKERS_STATE", &["TURN_SIGNALS"])
        .required("EPS_STATUS", &["LKA_STATE"])
        .required("LIGHT_STALK", &["AUTO_HIGH_BEAM"])
        .optional("PCM_CRUISE_SM", &["DISTANCE_LINES"], 0.0)
        .optional("ENGINE_RPM", &["RPM"], 0.0);

    schema
        .check("GEAR_PACKET", 1.0)
        .check("LIGHT_STALK", 1.0)
        .check("BLINKERS_STATE", 0.15)
        .check("BODY_CONTROL_STATE", 3.0)
        .check("ESP_CONTROL", 3.0)
        .check("EPS_STATUS", 25.0)
        .check("BRAKE_MODULE", 40.0)
        .check("WHEEL_SPEEDS", 80.0)
        .check("STEER_ANGLE_SENSOR", 80.0)
        .check("PCM_CRUISE", 33.0)
        .check("STEER_TORQUE_SENSOR", 50.0)
        .check("ENGINE_RPM", 100.0)
        .check("PCM_CRUISE_SM", 1.0);

    // Hybrids report the pedal on their own message
    let pedal_msg = if flags.contains(FeatureFlags::HYBRID) {
        "GAS_PEDAL_HYBRID"
    } else {
        "GAS_PEDAL"
    };
    schema.required(pedal_msg, &["GAS_PEDAL"]).check(pedal_msg, 33.0);

    // Drive-mode switch candidates
    if variant.has_sport_on_2() {
        schema.optional("GEAR_PACKET", &["SPORT_ON_2"], 0.0);
    }
    if variant.has_gear_packet2() {
        schema.optional("GEAR_PACKET2", &["SPORT_ON", "ECON_ON"], 0.0);
    }

    if variant.uses_dsu_cruise() {
        schema
            .required("DSU_CRUISE", &["MAIN_ON", "SET_SPEED"])
            .check("DSU_CRUISE", 5.0);
    } else {
        schema
            .required("PCM_CRUISE_2", &["MAIN_ON", "SET_SPEED"])
            .optional("PCM_CRUISE_2", &["LOW_SPEED_LOCKOUT"], 0.0)
            .check("PCM_CRUISE_2", 33.0);
    }

    let alt_pedal_msg = if variant.uses_alt_gas_pedal() {
        "GAS_PEDAL_ALT"
    } else {
        "GAS_PEDAL"
    };
    schema.required(alt_pedal_msg, &["GAS_PEDAL"]).check(alt_pedal_msg, 33.0);

    if flags.contains(FeatureFlags::GAS_INTERCEPTOR) {
        schema
            .required("GAS_SENSOR", &["INTERCEPTOR_GAS", "INTERCEPTOR_GAS2"])
            .check("GAS_SENSOR", 50.0);
    }

    if flags.contains(FeatureFlags::BLIND_SPOT_MONITOR) {
        schema
            .optional(
                "BSM",
                &["L_ADJACENT", "L_APPROACHING", "R_ADJACENT", "R_APPROACHING"],
                0.0,
            )
            .check("BSM", 1.0);
    }

    if flags.contains(FeatureFlags::SECONDARY_STEER_SENSOR) {
        // Not checked: the sensor only starts transmitting once powered up
        schema.required("SECONDARY_STEER_ANGLE", &["ZORRO_STEER"]);
    }

    if flags.contains(FeatureFlags::RADAR_ACC) {
        add_acc_group(&mut schema);
    }

    schema
}

fn camera_schema(variant: VehicleVariant, flags: FeatureFlags) -> BusSchema {
    let mut schema = BusSchema::new(CAMERA_BUS);

    schema
        .required("PRE_COLLISION", &["FORCE", "PRECOLLISION_ACTIVE"])
        .check("PRE_COLLISION", 0.0)
        // Steering message is only checked to detect a connected camera
        .check("STEERING_LKA", 42.0);

    if variant.is_tss2() && !flags.contains(FeatureFlags::RADAR_ACC) {
        add_acc_group(&mut schema);
    }

    schema
}

fn add_acc_group(schema: &mut BusSchema) {
    schema
        .optional("ACC_CONTROL", &["ACC_TYPE"], 1.0)
        .optional("ACC_HUD", &["FCW"], 0.0)
        .check("ACC_CONTROL", 33.0)
        .check("ACC_HUD", 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_schema_is_deterministic() {
        for variant in VehicleVariant::ALL {
            let flags = FeatureFlags::for_variant(*variant)
                | FeatureFlags::BLIND_SPOT_MONITOR
                | FeatureFlags::GAS_INTERCEPTOR;
            let first = build_schema(*variant, flags).unwrap();
            let second = build_schema(*variant, flags).unwrap();
            assert_eq!(first, second, "schema for {} differs between calls", variant);
        }
    }

    #[test]
    fn test_base_schema() {
        let schema = build_schema(VehicleVariant::Corolla, FeatureFlags::empty()).unwrap();
        let pt = &schema.powertrain;

        assert_eq!(pt.bus, POWERTRAIN_BUS);
        assert!(pt.contains("WHEEL_SPEEDS", "WHEEL_SPEED_RR"));
        assert!(pt.contains("GAS_PEDAL", "GAS_PEDAL"));
        assert!(pt.contains("PCM_CRUISE_2", "LOW_SPEED_LOCKOUT"));
        assert!(!pt.messages.contains_key("GAS_SENSOR"));
        assert!(!pt.messages.contains_key("BSM"));
        assert!(!pt.messages.contains_key("ACC_CONTROL"));
        assert_eq!(pt.frequency("WHEEL_SPEEDS"), Some(80.0));
        assert_eq!(pt.frequency("BLINKERS_STATE"), Some(0.15));

        // Pre-TSS2 cars have no ACC group on the camera bus
        assert!(!schema.camera.messages.contains_key("ACC_CONTROL"));
        assert_eq!(schema.camera.frequency("STEERING_LKA"), Some(42.0));
        assert_eq!(schema.camera.frequency("PRE_COLLISION"), None);
    }

    #[test]
    fn test_optional_defaults() {
        let schema =
            build_schema(VehicleVariant::CorollaTss2, FeatureFlags::BLIND_SPOT_MONITOR).unwrap();
        assert_eq!(
            schema.powertrain.presence("GEAR_PACKET", "SPORT_ON"),
            Some(SignalPresence::Optional { default: 0.0 })
        );
        assert_eq!(
            schema.camera.presence("ACC_CONTROL", "ACC_TYPE"),
            Some(SignalPresence::Optional { default: 1.0 })
        );
        assert_eq!(
            schema.powertrain.presence("BSM", "L_ADJACENT"),
            Some(SignalPresence::Optional { default: 0.0 })
        );
        assert_eq!(
            schema.powertrain.presence("GEAR_PACKET", "GEAR"),
            Some(SignalPresence::Required)
        );
    }

    #[test]
    fn test_dsu_cruise_override() {
        let schema = build_schema(VehicleVariant::LexusIs, FeatureFlags::empty()).unwrap();
        assert!(schema.powertrain.contains("DSU_CRUISE", "SET_SPEED"));
        assert!(!schema.powertrain.messages.contains_key("PCM_CRUISE_2"));
        assert_eq!(schema.powertrain.frequency("DSU_CRUISE"), Some(5.0));
    }

    #[test]
    fn test_hybrid_pedal_messages() {
        let schema = build_schema(VehicleVariant::LexusIsHybrid, FeatureFlags::HYBRID).unwrap();
        assert!(schema.powertrain.contains("GAS_PEDAL_HYBRID", "GAS_PEDAL"));
        assert!(schema.powertrain.contains("GAS_PEDAL_ALT", "GAS_PEDAL"));
        assert!(!schema.powertrain.messages.contains_key("GAS_PEDAL"));

        let schema = build_schema(VehicleVariant::CamryHybrid, FeatureFlags::HYBRID).unwrap();
        assert!(schema.powertrain.contains("GAS_PEDAL_HYBRID", "GAS_PEDAL"));
        assert!(schema.powertrain.contains("GAS_PEDAL", "GAS_PEDAL"));
    }

    #[test]
    fn test_acc_group_bus_selection() {
        let radar = build_schema(VehicleVariant::Rav4Tss2_2022, FeatureFlags::RADAR_ACC).unwrap();
        assert!(radar.powertrain.contains("ACC_CONTROL", "ACC_TYPE"));
        assert!(!radar.camera.contains("ACC_CONTROL", "ACC_TYPE"));

        let camera = build_schema(VehicleVariant::Rav4Tss2, FeatureFlags::empty()).unwrap();
        assert!(!camera.powertrain.contains("ACC_CONTROL", "ACC_TYPE"));
        assert!(camera.camera.contains("ACC_CONTROL", "ACC_TYPE"));
        assert!(camera.powertrain.contains("GEAR_PACKET", "SPORT_ON_2"));
    }

    #[test]
    fn test_feature_groups() {
        let flags = FeatureFlags::GAS_INTERCEPTOR
            | FeatureFlags::BLIND_SPOT_MONITOR
            | FeatureFlags::SECONDARY_STEER_SENSOR;
        let schema = build_schema(VehicleVariant::Corolla, flags).unwrap();
        let pt = &schema.powertrain;

        assert!(pt.contains("GAS_SENSOR", "INTERCEPTOR_GAS2"));
        assert_eq!(pt.frequency("GAS_SENSOR"), Some(50.0));
        assert!(pt.contains("BSM", "R_APPROACHING"));
        assert!(pt.contains("SECONDARY_STEER_ANGLE", "ZORRO_STEER"));
        assert_eq!(pt.frequency("SECONDARY_STEER_ANGLE"), None);
    }

    #[test]
    fn test_invalid_combinations_rejected() {
        let hybrid_on_petrol = build_schema(VehicleVariant::Corolla, FeatureFlags::HYBRID);
        assert!(matches!(hybrid_on_petrol, Err(DecoderError::InvalidConfiguration(_))));

        let radar_on_camera_car =
            build_schema(VehicleVariant::CorollaTss2, FeatureFlags::RADAR_ACC);
        assert!(matches!(radar_on_camera_car, Err(DecoderError::InvalidConfiguration(_))));

        let radar_car_without_flag =
            build_schema(VehicleVariant::Rav4Tss2_2022, FeatureFlags::empty());
        assert!(matches!(radar_car_without_flag, Err(DecoderError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_checked_messages() {
        let schema = build_schema(VehicleVariant::Corolla, FeatureFlags::empty()).unwrap();
        let checked: Vec<&str> =
            schema.powertrain.checked_messages().map(|(name, _)| name).collect();
        assert!(checked.contains(&"PCM_CRUISE"));
        assert!(checked.contains(&"GAS_PEDAL"));
        assert!(!schema.camera.checked_messages().any(|(name, _)| name == "PRE_COLLISION"));
    }
}
