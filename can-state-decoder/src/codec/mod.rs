//! Bench frame codec
//!
//! Closes the bench test loop around the driver-assistance stack. The encode
//! path turns a simulated vehicle state into every frame the stack expects to
//! see for that instant, with rolling counters and checksums filled in. The
//! decode path reads the actuator commands the stack sends back.
//!
//! Both paths are driven by a [`CodecSchema`]: the built-in bench profile, or
//! any signal database loaded from a DBC with the same message names.

pub mod checksum;
pub mod profile;

use crate::message_codec::MessageCodec;
use crate::schema::{CAMERA_BUS, POWERTRAIN_BUS};
use crate::signals::database::{MessageDefinition, SignalDatabase};
use crate::types::{CanFrame, DecoderError, EncodedFrame, Result};
use serde::{Deserialize, Serialize};

pub use checksum::{crc8_pedal, honda_checksum};

/// Radar bus index
pub const RADAR_BUS: u8 = 1;

/// Bus the control stack sends actuator commands on
pub const COMMAND_BUS: u8 = POWERTRAIN_BUS;

/// Radar diagnostics go out on every n-th frame
pub const DIAGNOSTIC_CADENCE: u64 = 5;

/// Steering ratio between road-wheel and steering-wheel angle
const STEER_RATIO: f64 = 7.5;

/// Driver torque reading that keeps the stack from seeing hands off the wheel
const STEER_TORQUE_SENSOR_HELD: f64 = 1201.0;

const GEAR_DRIVE: f64 = 4.0;
const GEAR_SHIFTER_DRIVE: f64 = 8.0;

/// Radar state reported by a healthy radar
const RADAR_STATE_OK: f64 = 0x79 as f64;

/// Longitudinal distance of an empty radar track
const RADAR_TRACK_EMPTY: f64 = 255.5;

/// Signals filled in by the packer
const COUNTER_SIGNALS: [&str; 2] = ["COUNTER", "COUNTER_PEDAL"];
const CHECKSUM_SIGNAL: &str = "CHECKSUM";
const PEDAL_CHECKSUM_SIGNAL: &str = "CHECKSUM_PEDAL";

/// Powertrain messages of the encode path
const POWERTRAIN_MESSAGES: [&str; 18] = [
    "ENGINE_DATA",
    "WHEEL_SPEEDS",
    "SCM_BUTTONS",
    "GAS_SENSOR",
    "GEARBOX",
    "GAS_PEDAL_2",
    "SEATBELT_STATUS",
    "STEER_STATUS",
    "STEERING_SENSORS",
    "VSA_STATUS",
    "STANDSTILL",
    "STEER_MOTOR_TORQUE",
    "EPB_STATUS",
    "DOORS_STATUS",
    "CRUISE_PARAMS",
    "CRUISE",
    "SCM_FEEDBACK",
    "POWERTRAIN_DATA",
];

/// Camera messages of the encode path
const CAMERA_MESSAGES: [&str; 3] = ["STEERING_CONTROL", "ACC_HUD", "BRAKE_COMMAND"];

/// Actuator command channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Brake,
    Gas,
    SteerTorque,
}

/// Where one actuator command lives and how it scales
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandChannel {
    pub kind: CommandKind,
    pub message: &'static str,
    pub value_signal: &'static str,
    /// Companion bit that must be set for the value to count; without one the
    /// value counts whenever it is positive
    pub request_signal: Option<&'static str>,
    /// Physical units per raw count
    pub unit_factor: f64,
}

/// Command channels of the bench profile
pub const COMMAND_CHANNELS: [CommandChannel; 3] = [
    CommandChannel {
        kind: CommandKind::Brake,
        message: "BRAKE_COMMAND",
        value_signal: "COMPUTER_BRAKE",
        request_signal: Some("COMPUTER_BRAKE_REQUEST"),
        unit_factor: 0.003906248,
    },
    CommandChannel {
        kind: CommandKind::Gas,
        message: "GAS_COMMAND",
        value_signal: "GAS_COMMAND",
        request_signal: None,
        unit_factor: 1.0 / 256.0,
    },
    CommandChannel {
        kind: CommandKind::SteerTorque,
        message: "STEERING_CONTROL",
        value_signal: "STEER_TORQUE",
        request_signal: Some("STEER_TORQUE_REQUEST"),
        unit_factor: 1.0 / 4096.0,
    },
];

/// Simulated vehicle state at one instant
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulatedState {
    /// Vehicle speed in m/s
    pub speed: f64,
    /// Road-wheel angle in radians
    pub angle_rad: f64,
    #[serde(default)]
    pub cruise_button: u8,
    #[serde(default)]
    pub is_engaged: bool,
}

/// Actuator commands in physical units; zero means not requested
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub gas: f64,
    pub brake: f64,
    pub steer_torque: f64,
}

impl ActuatorCommand {
    fn set(&mut self, kind: CommandKind, value: f64) {
        match kind {
            CommandKind::Brake => self.brake = value,
            CommandKind::Gas => self.gas = value,
            CommandKind::SteerTorque => self.steer_torque = value,
        }
    }

    fn get(&self, kind: CommandKind) -> f64 {
        match kind {
            CommandKind::Brake => self.brake,
            CommandKind::Gas => self.gas,
            CommandKind::SteerTorque => self.steer_torque,
        }
    }
}

/// Message layouts of one simulated vehicle
#[derive(Debug, Clone)]
pub struct CodecSchema {
    db: SignalDatabase,
}

impl CodecSchema {
    /// Built-in bench profile
    pub fn honda_bench() -> Self {
        Self {
            db: profile::honda_bench_database(),
        }
    }

    /// Use layouts from another database, typically loaded from a DBC
    ///
    /// Fails if any message or command signal of the bench loop is missing.
    pub fn with_database(db: SignalDatabase) -> Result<Self> {
        let schema = Self { db };

        let radar_messages = std::iter::once("RADAR_DIAGNOSTIC".to_string())
            .chain((0..profile::RADAR_TRACKS).map(|i| format!("TRACK_{}", i)));
        let names: Vec<String> = POWERTRAIN_MESSAGES
            .iter()
            .chain(CAMERA_MESSAGES.iter())
            .map(|name| name.to_string())
            .chain(radar_messages)
            .collect();
        for name in &names {
            schema.message(name)?;
        }

        for channel in &COMMAND_CHANNELS {
            let def = schema.message(channel.message)?;
            for signal in std::iter::once(channel.value_signal).chain(channel.request_signal) {
                if def.signal(signal).is_none() {
                    return Err(DecoderError::InvalidConfiguration(format!(
                        "Command message '{}' has no signal '{}'",
                        channel.message, signal
                    )));
                }
            }
        }

        log::info!(
            "Codec schema loaded: {} messages",
            schema.db.stats().num_messages
        );
        Ok(schema)
    }

    pub fn database(&self) -> &SignalDatabase {
        &self.db
    }

    /// Message definition by name
    pub fn message(&self, name: &str) -> Result<&MessageDefinition> {
        self.db.get_message_by_name(name).ok_or_else(|| {
            DecoderError::InvalidConfiguration(format!("Message '{}' not in codec schema", name))
        })
    }

    /// Pack a message, filling in counters and checksums
    ///
    /// # Arguments
    /// * `name` - Message name
    /// * `values` - Physical signal values; unlisted signals are zero
    /// * `counter` - Rolling counter source, `None` to leave counters at zero
    pub fn pack(
        &self,
        name: &str,
        values: &[(&str, f64)],
        counter: Option<u64>,
    ) -> Result<Vec<u8>> {
        let def = self.message(name)?;
        let mut data = MessageCodec::encode_message(def, values)?;

        if let Some(counter) = counter {
            for signal in COUNTER_SIGNALS.iter().filter_map(|name| def.signal(name)) {
                let wrapped = 1u64
                    .checked_shl(signal.length as u32)
                    .map_or(counter, |modulus| counter % modulus);
                MessageCodec::insert_signal_value(&mut data, signal, wrapped as i64);
            }
        }

        if let Some(signal) = def.signal(CHECKSUM_SIGNAL) {
            MessageCodec::insert_signal_value(&mut data, signal, 0);
            let checksum = honda_checksum(def.address, &data);
            MessageCodec::insert_signal_value(&mut data, signal, checksum as i64);
        }

        if let Some(signal) = def.signal(PEDAL_CHECKSUM_SIGNAL) {
            let checksum = crc8_pedal(&data[..data.len().saturating_sub(1)]);
            MessageCodec::insert_signal_value(&mut data, signal, checksum as i64);
        }

        Ok(data)
    }

    /// Check a received payload against its layout and checksums
    pub fn verify(&self, def: &MessageDefinition, data: &[u8]) -> Result<()> {
        if data.len() != def.size {
            return Err(DecoderError::MalformedFrame {
                address: def.address,
                reason: format!("expected {} bytes, got {}", def.size, data.len()),
            });
        }

        if let Some(signal) = def.signal(CHECKSUM_SIGNAL) {
            let expected = honda_checksum(def.address, data);
            let actual = MessageCodec::extract_signal_value(data, signal).unwrap_or_default() as u8;
            if expected != actual {
                return Err(DecoderError::ChecksumMismatch {
                    address: def.address,
                    expected,
                    actual,
                });
            }
        }

        if let Some(signal) = def.signal(PEDAL_CHECKSUM_SIGNAL) {
            let expected = crc8_pedal(&data[..data.len().saturating_sub(1)]);
            let actual = MessageCodec::extract_signal_value(data, signal).unwrap_or_default() as u8;
            if expected != actual {
                return Err(DecoderError::ChecksumMismatch {
                    address: def.address,
                    expected,
                    actual,
                });
            }
        }

        Ok(())
    }
}

/// Encode path of the bench loop
#[derive(Debug, Clone)]
pub struct FrameCodec {
    schema: CodecSchema,
}

impl FrameCodec {
    pub fn new(schema: CodecSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &CodecSchema {
        &self.schema
    }

    /// All frames for one simulated instant
    ///
    /// Radar diagnostics and tracks are only included when `frame_index` is a
    /// multiple of [`DIAGNOSTIC_CADENCE`].
    pub fn encode(&self, state: &SimulatedState, frame_index: u64) -> Result<Vec<EncodedFrame>> {
        let speed = state.speed;
        let steer_angle = -state.angle_rad.to_degrees() * STEER_RATIO;
        let pt = POWERTRAIN_BUS;

        let mut frames = vec![
            self.frame(frame_index, "ENGINE_DATA", pt, &[("XMISSION_SPEED", speed)], true)?,
            self.frame(
                frame_index,
                "WHEEL_SPEEDS",
                pt,
                &[
                    ("WHEEL_SPEED_FL", speed),
                    ("WHEEL_SPEED_FR", speed),
                    ("WHEEL_SPEED_RL", speed),
                    ("WHEEL_SPEED_RR", speed),
                ],
                false,
            )?,
            self.frame(
                frame_index,
                "SCM_BUTTONS",
                pt,
                &[("CRUISE_BUTTONS", state.cruise_button as f64)],
                true,
            )?,
            self.frame(frame_index, "GAS_SENSOR", pt, &[], true)?,
            self.frame(
                frame_index,
                "GEARBOX",
                pt,
                &[("GEAR", GEAR_DRIVE), ("GEAR_SHIFTER", GEAR_SHIFTER_DRIVE)],
                true,
            )?,
            self.frame(frame_index, "GAS_PEDAL_2", pt, &[], true)?,
            self.frame(
                frame_index,
                "SEATBELT_STATUS",
                pt,
                &[("SEATBELT_DRIVER_LATCHED", 1.0)],
                true,
            )?,
            self.frame(
                frame_index,
                "STEER_STATUS",
                pt,
                &[("STEER_TORQUE_SENSOR", STEER_TORQUE_SENSOR_HELD)],
                true,
            )?,
            self.frame(frame_index, "STEERING_SENSORS", pt, &[("STEER_ANGLE", steer_angle)], true)?,
            self.frame(frame_index, "VSA_STATUS", pt, &[], true)?,
            self.frame(frame_index, "STANDSTILL", pt, &[], true)?,
            self.frame(frame_index, "STEER_MOTOR_TORQUE", pt, &[], true)?,
            self.frame(frame_index, "EPB_STATUS", pt, &[], true)?,
            self.frame(frame_index, "DOORS_STATUS", pt, &[], true)?,
            self.frame(frame_index, "CRUISE_PARAMS", pt, &[], true)?,
            self.frame(frame_index, "CRUISE", pt, &[("CRUISE_SPEED_PCM", speed)], true)?,
            self.frame(frame_index, "SCM_FEEDBACK", pt, &[("MAIN_ON", 1.0)], true)?,
            self.frame(
                frame_index,
                "POWERTRAIN_DATA",
                pt,
                &[("ACC_STATUS", if state.is_engaged { 1.0 } else { 0.0 })],
                true,
            )?,
        ];

        for name in CAMERA_MESSAGES {
            frames.push(self.frame(frame_index, name, CAMERA_BUS, &[], true)?);
        }

        if frame_index % DIAGNOSTIC_CADENCE == 0 {
            frames.push(self.frame(
                frame_index,
                "RADAR_DIAGNOSTIC",
                RADAR_BUS,
                &[("RADAR_STATE", RADAR_STATE_OK)],
                false,
            )?);
            for track in 0..profile::RADAR_TRACKS {
                frames.push(self.frame(
                    frame_index,
                    &format!("TRACK_{}", track),
                    RADAR_BUS,
                    &[("LONG_DIST", RADAR_TRACK_EMPTY)],
                    false,
                )?);
            }
        }

        log::trace!("Encoded {} frames for index {}", frames.len(), frame_index);
        Ok(frames)
    }

    /// Actuator command frames as the control stack would send them
    pub fn encode_commands(
        &self,
        command: &ActuatorCommand,
        frame_index: u64,
    ) -> Result<Vec<EncodedFrame>> {
        COMMAND_CHANNELS
            .iter()
            .map(|channel| {
                let value = command.get(channel.kind);
                let raw = value / channel.unit_factor;
                let requested = if value != 0.0 { 1.0 } else { 0.0 };

                let mut values = vec![(channel.value_signal, raw)];
                match channel.request_signal {
                    Some(request) => values.push((request, requested)),
                    None => {
                        // Interceptor takes both redundant channels plus an enable bit
                        values.push(("GAS_COMMAND2", raw));
                        values.push(("ENABLE", requested));
                    }
                }
                self.frame(frame_index, channel.message, COMMAND_BUS, &values, true)
            })
            .collect()
    }

    fn frame(
        &self,
        frame_index: u64,
        name: &str,
        bus: u8,
        values: &[(&str, f64)],
        counted: bool,
    ) -> Result<EncodedFrame> {
        let def = self.schema.message(name)?;
        let counter = counted.then_some(frame_index);
        Ok(EncodedFrame {
            address: def.address,
            bus,
            data: self.schema.pack(name, values, counter)?,
            frame_index,
        })
    }
}

/// Decode path of the bench loop
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    schema: CodecSchema,
    latest: ActuatorCommand,
}

impl CommandDecoder {
    pub fn new(schema: CodecSchema) -> Self {
        Self {
            schema,
            latest: ActuatorCommand::default(),
        }
    }

    /// Decode one frame without touching the latest commands
    ///
    /// # Returns
    /// * `Ok(None)` - The frame is not an actuator command, including frames
    ///   with a command address seen on another bus
    /// * `Ok(Some((kind, value)))` - Commanded value in physical units, zero
    ///   when not requested
    /// * `Err(_)` - The frame is a command but is corrupt
    pub fn decode_frame(&self, frame: &CanFrame) -> Result<Option<(CommandKind, f64)>> {
        if frame.bus != COMMAND_BUS {
            return Ok(None);
        }
        let Some(def) = self.schema.database().get_message(frame.address) else {
            return Ok(None);
        };
        let Some(channel) = COMMAND_CHANNELS
            .iter()
            .find(|channel| channel.message == def.name)
        else {
            return Ok(None);
        };

        self.schema.verify(def, &frame.data)?;

        let value_signal = def
            .signal(channel.value_signal)
            .ok_or(DecoderError::UnknownMessage(def.address))?;
        let raw = MessageCodec::decode_signal(&frame.data, value_signal).ok_or_else(|| {
            DecoderError::MalformedFrame {
                address: def.address,
                reason: format!("{} does not fit the payload", channel.value_signal),
            }
        })?;
        if !value_signal.in_range(raw) {
            return Err(DecoderError::MalformedFrame {
                address: def.address,
                reason: format!(
                    "{} = {} outside [{}, {}]",
                    channel.value_signal, raw, value_signal.min, value_signal.max
                ),
            });
        }

        let requested = match channel.request_signal {
            Some(request) => def
                .signal(request)
                .and_then(|signal| MessageCodec::decode_signal(&frame.data, signal))
                .is_some_and(|flag| flag != 0.0),
            None => raw > 0.0,
        };

        let value = if requested { raw * channel.unit_factor } else { 0.0 };
        Ok(Some((channel.kind, value)))
    }

    /// Feed one received frame
    ///
    /// Frames that are not commands are ignored. Corrupt command frames are
    /// rejected and leave the latest commands unchanged.
    pub fn update(&mut self, frame: &CanFrame) -> Result<()> {
        match self.decode_frame(frame) {
            Ok(Some((kind, value))) => {
                log::trace!("Command {:?} = {}", kind, value);
                self.latest.set(kind, value);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                log::warn!("Rejected command frame 0x{:X}: {}", frame.address, err);
                Err(err)
            }
        }
    }

    /// Latest accepted commands
    pub fn latest(&self) -> ActuatorCommand {
        self.latest
    }
}
