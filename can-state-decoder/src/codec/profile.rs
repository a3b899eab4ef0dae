//! Built-in bench vehicle profile
//!
//! Bit layouts of the messages the bench loop synthesizes and reads back: the
//! powertrain and camera messages of a Honda Civic (2016, Touring) and the
//! radar diagnostic and track messages of its Nidec radar. All signals are
//! Motorola byte order. Layouts must match the car bit-for-bit, so changes here
//! need a matching DBC.

use crate::signals::database::{
    ByteOrder, MessageDefinition, SignalDatabase, SignalDefinition, ValueType,
};

/// Source name recorded on built-in definitions
pub const PROFILE_SOURCE: &str = "honda_civic_touring_2016";

/// Kilometres per hour to metres per second at DBC precision
const KPH_SCALED: f64 = 0.002759506;

/// Number of radar track messages
pub const RADAR_TRACKS: u32 = 16;

/// CAN ID of `TRACK_0`; later tracks follow consecutively
pub const RADAR_TRACK_BASE: u32 = 0x310;

struct Layout {
    address: u32,
    name: String,
    size: usize,
    signals: Vec<SignalDefinition>,
}

impl Layout {
    fn new(address: u32, name: &str, size: usize) -> Self {
        Self {
            address,
            name: name.to_string(),
            size,
            signals: Vec::new(),
        }
    }

    fn unsigned(mut self, name: &str, start_bit: u16, length: u16) -> Self {
        let max = ((1u64 << length) - 1) as f64;
        self.signals.push(signal(name, start_bit, length, ValueType::Unsigned, 1.0, 0.0, max));
        self
    }

    fn scaled(
        mut self,
        name: &str,
        start_bit: u16,
        length: u16,
        value_type: ValueType,
        factor: f64,
        range: (f64, f64),
    ) -> Self {
        self.signals.push(signal(name, start_bit, length, value_type, factor, range.0, range.1));
        self
    }

    /// 2-bit counter and nibble checksum at the end of the message
    fn counted(self) -> Self {
        let last_byte = (self.size as u16 - 1) * 8;
        self.unsigned("COUNTER", last_byte + 5, 2)
            .unsigned("CHECKSUM", last_byte + 3, 4)
    }

    fn build(self) -> MessageDefinition {
        MessageDefinition {
            address: self.address,
            name: self.name,
            size: self.size,
            sender: None,
            signals: self.signals,
            source: PROFILE_SOURCE.to_string(),
        }
    }
}

fn signal(
    name: &str,
    start_bit: u16,
    length: u16,
    value_type: ValueType,
    factor: f64,
    min: f64,
    max: f64,
) -> SignalDefinition {
    SignalDefinition {
        name: name.to_string(),
        start_bit,
        length,
        byte_order: ByteOrder::BigEndian,
        value_type,
        factor,
        offset: 0.0,
        min,
        max,
        unit: None,
    }
}

/// Signal database of the bench profile
pub fn honda_bench_database() -> SignalDatabase {
    use ValueType::{Signed, Unsigned};

    let mut messages = vec![
        // Powertrain bus
        Layout::new(0x158, "ENGINE_DATA", 8)
            .scaled("XMISSION_SPEED", 7, 16, Unsigned, KPH_SCALED, (0.0, 180.0))
            .unsigned("ENGINE_RPM", 23, 16)
            .scaled("XMISSION_SPEED2", 39, 16, Unsigned, KPH_SCALED, (0.0, 180.0))
            .unsigned("ODOMETER", 55, 8)
            .counted(),
        // No counter: the wheel speeds run into the last byte
        Layout::new(0x1d0, "WHEEL_SPEEDS", 8)
            .scaled("WHEEL_SPEED_FL", 7, 15, Unsigned, KPH_SCALED, (0.0, 90.0))
            .scaled("WHEEL_SPEED_FR", 8, 15, Unsigned, KPH_SCALED, (0.0, 90.0))
            .scaled("WHEEL_SPEED_RL", 25, 15, Unsigned, KPH_SCALED, (0.0, 90.0))
            .scaled("WHEEL_SPEED_RR", 42, 15, Unsigned, KPH_SCALED, (0.0, 90.0))
            .unsigned("CHECKSUM", 59, 4),
        Layout::new(0x296, "SCM_BUTTONS", 4)
            .unsigned("CRUISE_BUTTONS", 7, 3)
            .unsigned("CRUISE_SETTING", 3, 2)
            .unsigned("LIGHTS_SETTING", 1, 2)
            .counted(),
        Layout::new(0x201, "GAS_SENSOR", 6)
            .unsigned("INTERCEPTOR_GAS", 7, 16)
            .unsigned("INTERCEPTOR_GAS2", 23, 16)
            .unsigned("STATE", 39, 4)
            .unsigned("COUNTER_PEDAL", 35, 4)
            .unsigned("CHECKSUM_PEDAL", 47, 8),
        Layout::new(0x1a3, "GEARBOX", 8)
            .unsigned("GEAR", 7, 8)
            .unsigned("GEAR_SHIFTER", 35, 6)
            .counted(),
        Layout::new(0x13c, "GAS_PEDAL_2", 8)
            .scaled("ENGINE_TORQUE_ESTIMATE", 7, 16, Signed, 1.0, (-1000.0, 1000.0))
            .unsigned("CAR_GAS", 39, 8)
            .counted(),
        Layout::new(0x305, "SEATBELT_STATUS", 7)
            .unsigned("SEATBELT_DRIVER_LAMP", 7, 1)
            .unsigned("SEATBELT_DRIVER_LATCHED", 10, 1)
            .counted(),
        Layout::new(0x18f, "STEER_STATUS", 7)
            .scaled("STEER_TORQUE_SENSOR", 7, 16, Signed, 1.0, (-31000.0, 31000.0))
            .scaled("STEER_TORQUE_MOTOR", 23, 16, Signed, 1.0, (-31000.0, 31000.0))
            .unsigned("STEER_STATUS", 39, 4)
            .unsigned("STEER_CONTROL_ACTIVE", 35, 1)
            .counted(),
        Layout::new(0x14a, "STEERING_SENSORS", 8)
            .scaled("STEER_ANGLE", 7, 16, Signed, -0.1, (-500.0, 500.0))
            .scaled("STEER_ANGLE_RATE", 23, 16, Signed, -1.0, (-3000.0, 3000.0))
            .unsigned("STEER_SENSOR_STATUS", 42, 1)
            .scaled("STEER_ANGLE_OFFSET", 39, 8, Signed, -0.1, (-12.8, 12.8))
            .counted(),
        Layout::new(0x1a4, "VSA_STATUS", 8)
            .unsigned("USER_BRAKE", 7, 16)
            .unsigned("ESP_DISABLED", 28, 1)
            .counted(),
        Layout::new(0x1b0, "STANDSTILL", 7)
            .unsigned("CONTROLLED_STANDSTILL", 0, 1)
            .unsigned("BRAKE_ERROR_2", 9, 1)
            .unsigned("BRAKE_ERROR_1", 11, 1)
            .unsigned("WHEELS_MOVING", 12, 1)
            .counted(),
        Layout::new(0x1ab, "STEER_MOTOR_TORQUE", 3)
            .unsigned("CONFIG_VALID", 7, 1)
            .unsigned("OUTPUT_DISABLED", 5, 1)
            .unsigned("MOTOR_TORQUE", 1, 10)
            .counted(),
        Layout::new(0x1c2, "EPB_STATUS", 8)
            .unsigned("EPB_ACTIVE", 3, 1)
            .unsigned("EPB_STATE", 29, 2)
            .counted(),
        Layout::new(0x405, "DOORS_STATUS", 8)
            .unsigned("DOOR_OPEN_FL", 37, 1)
            .unsigned("DOOR_OPEN_FR", 38, 1)
            .unsigned("DOOR_OPEN_RL", 39, 1)
            .unsigned("DOOR_OPEN_RR", 40, 1)
            .counted(),
        Layout::new(0x37c, "CRUISE_PARAMS", 8)
            .scaled("CRUISE_SPEED_OFFSET", 31, 8, Signed, 0.1, (-12.8, 12.7))
            .counted(),
        Layout::new(0x324, "CRUISE", 8)
            .unsigned("HUD_SPEED_KPH", 7, 8)
            .unsigned("HUD_SPEED_MPH", 15, 8)
            .unsigned("TRIP_FUEL_CONSUMED", 23, 16)
            .unsigned("CRUISE_SPEED_PCM", 39, 8)
            .unsigned("BOH3", 55, 8)
            .counted(),
        Layout::new(0x326, "SCM_FEEDBACK", 8)
            .unsigned("CMBS_BUTTON", 22, 2)
            .unsigned("LEFT_BLINKER", 26, 1)
            .unsigned("RIGHT_BLINKER", 27, 1)
            .unsigned("MAIN_ON", 28, 1)
            .counted(),
        Layout::new(0x17c, "POWERTRAIN_DATA", 8)
            .unsigned("PEDAL_GAS", 7, 8)
            .unsigned("ENGINE_RPM", 23, 16)
            .unsigned("BRAKE_SWITCH", 32, 1)
            .unsigned("ACC_STATUS", 38, 1)
            .unsigned("GAS_PRESSED", 39, 1)
            .unsigned("BRAKE_PRESSED", 53, 1)
            .counted(),
        // Camera bus, and actuator commands from the control stack
        Layout::new(0xe4, "STEERING_CONTROL", 5)
            .scaled("STEER_TORQUE", 7, 16, Signed, 1.0, (-4096.0, 4096.0))
            .unsigned("STEER_TORQUE_REQUEST", 23, 1)
            .unsigned("SET_ME_X00", 22, 7)
            .unsigned("SET_ME_X00_2", 31, 8)
            .counted(),
        Layout::new(0x30c, "ACC_HUD", 8)
            .scaled("PCM_SPEED", 7, 16, Unsigned, KPH_SCALED, (0.0, 180.0))
            .unsigned("PCM_GAS", 23, 8)
            .unsigned("CRUISE_SPEED", 31, 8)
            .unsigned("HUD_LEAD", 38, 2)
            .unsigned("ENABLE_MINI_CAR", 39, 1)
            .counted(),
        Layout::new(0x1fa, "BRAKE_COMMAND", 8)
            .unsigned("COMPUTER_BRAKE", 7, 10)
            .unsigned("BRAKE_PUMP_REQUEST", 8, 1)
            .unsigned("COMPUTER_BRAKE_REQUEST", 16, 1)
            .unsigned("CRUISE_OVERRIDE", 20, 1)
            .unsigned("FCW", 27, 2)
            .unsigned("CHIME", 39, 3)
            .counted(),
        Layout::new(0x200, "GAS_COMMAND", 6)
            .unsigned("GAS_COMMAND", 7, 16)
            .unsigned("GAS_COMMAND2", 23, 16)
            .unsigned("ENABLE", 39, 1)
            .unsigned("COUNTER_PEDAL", 35, 4)
            .unsigned("CHECKSUM_PEDAL", 47, 8),
        // Radar bus
        Layout::new(0x400, "RADAR_DIAGNOSTIC", 8).unsigned("RADAR_STATE", 23, 8),
    ];

    for track in 0..RADAR_TRACKS {
        messages.push(
            Layout::new(RADAR_TRACK_BASE + track, &format!("TRACK_{}", track), 8)
                .scaled("LONG_DIST", 7, 12, Unsigned, 0.0625, (0.0, 255.5))
                .unsigned("NEW_TRACK", 11, 1)
                .scaled("LAT_DIST", 9, 10, Signed, 0.0625, (-32.0, 31.9375))
                .scaled("REL_SPEED", 31, 12, Signed, 0.03125, (-64.0, 63.96875)),
        );
    }

    SignalDatabase::from_messages(messages.into_iter().map(Layout::build))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Payload bit positions covered by a Motorola signal
    fn covered_bits(sig: &SignalDefinition) -> Vec<u16> {
        let mut bits = Vec::new();
        let mut pos = sig.start_bit;
        for _ in 0..sig.length {
            bits.push(pos);
            pos = if pos % 8 == 0 { pos + 15 } else { pos - 1 };
        }
        bits
    }

    #[test]
    fn test_profile_contents() {
        let db = honda_bench_database();
        assert_eq!(db.stats().num_messages, 23 + RADAR_TRACKS as usize);
        assert_eq!(db.get_message_by_name("STEERING_CONTROL").unwrap().address, 0xe4);
        assert_eq!(db.get_message_by_name("TRACK_15").unwrap().address, 0x31f);
    }

    #[test]
    fn test_counted_layout() {
        let db = honda_bench_database();
        let msg = db.get_message_by_name("SCM_BUTTONS").unwrap();
        assert_eq!(msg.signal("COUNTER").unwrap().start_bit, 29);
        assert_eq!(msg.signal("CHECKSUM").unwrap().start_bit, 27);

        let msg = db.get_message_by_name("GEARBOX").unwrap();
        assert_eq!(msg.signal("COUNTER").unwrap().start_bit, 61);
        assert_eq!(msg.signal("CHECKSUM").unwrap().start_bit, 59);
    }

    #[test]
    fn test_signals_fit_and_do_not_overlap() {
        let db = honda_bench_database();
        for address in db.get_all_addresses() {
            let msg = db.get_message(address).unwrap();
            let mut used = HashSet::new();
            for sig in &msg.signals {
                for bit in covered_bits(sig) {
                    assert!((bit as usize) < msg.size * 8, "{}.{} overflows", msg.name, sig.name);
                    assert!(used.insert(bit), "{}.{} overlaps at bit {}", msg.name, sig.name, bit);
                }
            }
        }
    }
}
