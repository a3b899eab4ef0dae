//! Decode cycle scenarios over hand-built bus snapshots

use can_state_decoder::{
    CalibrationPhase, DecoderConfig, DecoderSession, Feature, GearShifter, RawSignalFrame,
    ShifterTable, VehicleStateDecoder, VehicleVariant,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn setup(config: DecoderConfig) -> (VehicleStateDecoder, DecoderSession) {
    init_logging();
    let session = DecoderSession::new(&config);
    (VehicleStateDecoder::new(config).unwrap(), session)
}

/// Powertrain snapshot of a car driving normally at `speed`, every message fresh
fn driving(speed: f64) -> RawSignalFrame {
    let mut frame = RawSignalFrame::new(0);
    for wheel in ["WHEEL_SPEED_FL", "WHEEL_SPEED_FR", "WHEEL_SPEED_RL", "WHEEL_SPEED_RR"] {
        frame.set("WHEEL_SPEEDS", wheel, speed);
    }
    frame.set("PCM_CRUISE", "GAS_RELEASED", 1.0);
    frame.set("EPS_STATUS", "LKA_STATE", 5.0);
    frame.set("PCM_CRUISE_2", "MAIN_ON", 1.0);
    frame.set("PCM_CRUISE_2", "SET_SPEED", 72.0);
    frame.set("BODY_CONTROL_STATE", "SEATBELT_DRIVER_UNLATCHED", 0.0);
    for message in ["WHEEL_SPEEDS", "PCM_CRUISE", "EPS_STATUS", "PCM_CRUISE_2"] {
        frame.fresh.insert(message.to_string(), true);
    }
    frame
}

fn camera() -> RawSignalFrame {
    RawSignalFrame::new(2)
}

#[test]
fn test_base_variant_driving() {
    let (decoder, mut session) = setup(DecoderConfig::new(VehicleVariant::Corolla));
    let decoder = decoder.with_shifter_table(ShifterTable::from_pairs([(4, "D"), (2, "P")]));

    let frame = driving(10.0).with_value("GEAR_PACKET", "GEAR", 4.0);
    let state = decoder.decode(&frame, &camera(), &mut session);

    assert!(!state.standstill);
    assert_eq!(state.v_ego_raw, 10.0);
    assert!((state.v_ego - 10.0).abs() < 1e-9);
    assert_eq!(state.gear_shifter, GearShifter::Drive);
    assert!(state.cruise_state.available);
    assert!((state.cruise_state.speed - 20.0).abs() < 1e-9);
    assert!(!state.gas_pressed);
    assert!(!state.steer_fault_temporary);
    assert!(!state.left_blindspot && !state.right_blindspot);
    assert!(!state.stock_fcw && !state.stock_aeb);
    assert!(state.can_valid && state.camera_can_valid);
}

#[test]
fn test_standstill_at_zero_speed() {
    let (decoder, mut session) = setup(DecoderConfig::new(VehicleVariant::Corolla));
    let state = decoder.decode(&driving(0.0), &camera(), &mut session);
    assert!(state.standstill);
    assert_eq!(state.v_ego, 0.0);
}

#[test]
fn test_secondary_sensor_initializing() {
    let config =
        DecoderConfig::new(VehicleVariant::Corolla).with_feature(Feature::SecondarySteerSensor);
    let (decoder, mut session) = setup(config);

    let frame = driving(10.0)
        .with_value("STEER_ANGLE_SENSOR", "STEER_ANGLE", 5.0)
        .with_value("SECONDARY_STEER_ANGLE", "ZORRO_STEER", 5.0)
        .with_value("STEER_TORQUE_SENSOR", "STEER_ANGLE_INITIALIZING", 1.0);
    let state = decoder.decode(&frame, &camera(), &mut session);

    assert_eq!(state.calibration_phase, CalibrationPhase::Unseen);
    assert_eq!(state.steering_angle_deg, 5.0);
    assert_eq!(state.steering_angle_offset_deg, None);
}

#[test]
fn test_secondary_sensor_replaces_torque_sensor_angle() {
    let config = DecoderConfig::new(VehicleVariant::Corolla)
        .with_feature(Feature::SecondarySteerSensor)
        .with_offset_time_constant(0.01);
    let (decoder, mut session) = setup(config);

    let frame = driving(10.0)
        .with_value("STEER_ANGLE_SENSOR", "STEER_ANGLE", 3.0)
        .with_value("STEER_ANGLE_SENSOR", "STEER_FRACTION", 0.5)
        .with_value("STEER_TORQUE_SENSOR", "STEER_ANGLE", 100.0)
        .with_value("SECONDARY_STEER_ANGLE", "ZORRO_STEER", 10.0);
    let state = decoder.decode(&frame, &camera(), &mut session);

    assert_eq!(state.calibration_phase, CalibrationPhase::Initialized);
    assert_eq!(state.steering_angle_offset_deg, Some(6.5));
    assert_eq!(state.steering_angle_deg, 3.5);
}

#[test]
fn test_interceptor_gas_pressed() {
    let config = DecoderConfig::new(VehicleVariant::Corolla).with_feature(Feature::GasInterceptor);
    let (decoder, mut session) = setup(config);

    let pressed = driving(10.0)
        .with_value("GAS_SENSOR", "INTERCEPTOR_GAS", 890.0)
        .with_value("GAS_SENSOR", "INTERCEPTOR_GAS2", 910.0);
    let state = decoder.decode(&pressed, &camera(), &mut session);
    assert_eq!(state.gas, 900.0);
    assert!(state.gas_pressed);

    let resting = driving(10.0)
        .with_value("GAS_SENSOR", "INTERCEPTOR_GAS", 400.0)
        .with_value("GAS_SENSOR", "INTERCEPTOR_GAS2", 401.0)
        .with_value("PCM_CRUISE", "GAS_RELEASED", 0.0);
    let state = decoder.decode(&resting, &camera(), &mut session);
    assert_eq!(state.gas, 400.0);
    // Interceptor reading wins over the release flag
    assert!(!state.gas_pressed);
}

#[test]
fn test_calibration_converges_over_time_constant() {
    let (decoder, mut session) = setup(DecoderConfig::new(VehicleVariant::CorollaTss2));
    let frame = driving(15.0)
        .with_value("STEER_ANGLE_SENSOR", "STEER_ANGLE", 12.0)
        .with_value("STEER_TORQUE_SENSOR", "STEER_ANGLE", 20.0);

    let mut last_phase = CalibrationPhase::Unseen;
    for cycle in 0..6000 {
        let state = decoder.decode(&frame, &camera(), &mut session);
        assert!(state.calibration_phase >= last_phase);
        last_phase = state.calibration_phase;

        if cycle < 5999 {
            // Coarse sensor is passed through untouched until initialized
            assert_eq!(state.steering_angle_deg, 12.0);
            assert_eq!(state.calibration_phase, CalibrationPhase::Seen);
        } else {
            assert_eq!(state.calibration_phase, CalibrationPhase::Initialized);
            let offset = state.steering_angle_offset_deg.unwrap();
            assert!((offset - 8.0).abs() < 1e-9);
            assert!((state.steering_angle_deg - (20.0 - offset)).abs() < 1e-12);
        }
    }
    assert_eq!(session.cycles(), 6000);
    assert_eq!(session.calibration().phase(), CalibrationPhase::Initialized);
}

#[test]
fn test_stale_bus_keeps_producing_snapshots() {
    let (decoder, mut session) = setup(DecoderConfig::new(VehicleVariant::Corolla));
    let stale = driving(10.0).with_bus_valid(false);
    let state = decoder.decode(&stale, &camera().with_bus_valid(false), &mut session);

    assert!(!state.can_valid);
    assert!(!state.camera_can_valid);
    assert_eq!(state.v_ego_raw, 10.0);
}

#[test]
fn test_feature_groups_do_not_leak_between_cycles() {
    let config =
        DecoderConfig::new(VehicleVariant::CorollaTss2).with_feature(Feature::BlindSpotMonitor);
    let (decoder, mut session) = setup(config);

    let occupied = driving(10.0).with_value("BSM", "L_ADJACENT", 1.0);
    let first = decoder.decode(&occupied, &camera(), &mut session);
    assert!(first.left_blindspot);

    let clear = driving(10.0);
    let second = decoder.decode(&clear, &camera(), &mut session);
    assert!(!second.left_blindspot);
    // Earlier snapshot is unaffected by later cycles
    assert!(first.left_blindspot);
}

#[test]
fn test_snapshot_serializes() {
    let (decoder, mut session) = setup(DecoderConfig::new(VehicleVariant::Rav4Tss2));
    let state = decoder.decode(&driving(3.0), &camera(), &mut session);
    let json = serde_json::to_value(&state).unwrap();

    assert_eq!(json["gear_shifter"], "drive");
    assert_eq!(json["calibration_phase"], "unseen");
    assert_eq!(json["v_ego_raw"], 3.0);
}
