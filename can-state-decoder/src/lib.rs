//! CAN State Decoder Library
//!
//! Decodes a Toyota's CAN traffic into one normalized vehicle-state snapshot
//! per control cycle, and synthesizes bench CAN traffic for testing the
//! driver-assistance stack that consumes it.
//!
//! # Architecture
//!
//! - [`schema`] resolves a (variant, feature flags) pair into the messages and
//!   signals each bus parser must decode, with freshness requirements
//! - [`parser`] defines the bus parser boundary and a reference parser over a
//!   DBC-backed [`SignalDatabase`]
//! - [`calibration`] learns the offset between the coarse and fine steering
//!   angle sensors
//! - [`decoder`] combines both buses into a [`VehicleStateSnapshot`]
//! - [`codec`] packs simulated state into frames and reads actuator commands
//!   back, closing the bench loop
//!
//! The library does NOT:
//! - Talk to CAN hardware
//! - Publish snapshots or receive commands over a message bus
//! - Schedule decode cycles
//!
//! Those belong to the application layer (can-state-cli) or the host stack.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_state_decoder::{
//!     BusParser, CanParser, DecoderConfig, DecoderSession, VehicleStateDecoder, VehicleVariant,
//! };
//! use std::path::Path;
//!
//! let config = DecoderConfig::new(VehicleVariant::CorollaTss2);
//! let decoder = VehicleStateDecoder::new(config.clone()).unwrap();
//! let mut session = DecoderSession::new(&config);
//!
//! // Configure one parser per bus from the decoder's schema
//! let dbc_path = Path::new("toyota_nodsu_pt.dbc");
//! let db = can_state_decoder::signals::dbc::load_database(dbc_path).unwrap();
//! let pt = CanParser::configure(&db, &decoder.schema().powertrain).unwrap();
//! let cam = CanParser::configure(&db, &decoder.schema().camera).unwrap();
//!
//! // Each cycle, after feeding received frames to the parsers
//! let now_ns = 0;
//! let state = decoder.decode(&pt.latest(now_ns), &cam.latest(now_ns), &mut session);
//! println!("v_ego = {:.2} m/s", state.v_ego);
//! ```

// Public modules
pub mod calibration;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod params;
pub mod parser;
pub mod schema;
pub mod signals;
pub mod speed;
pub mod state;
pub mod types;
pub mod variant;

// Re-export main types for convenience
pub use calibration::{AngleCalibration, CalibrationPhase, CorrectedAngle, FirstOrderFilter};
pub use codec::{
    ActuatorCommand, CodecSchema, CommandDecoder, CommandKind, FrameCodec, SimulatedState,
};
pub use config::DecoderConfig;
pub use decoder::{DecoderSession, VehicleStateDecoder};
pub use params::{InMemoryParams, ParamStore};
pub use parser::{BusParser, CanParser, RawSignalFrame};
pub use schema::{build_schema, BusSchema, MessageRequirement, SignalPresence, SignalSchema};
pub use signals::{DatabaseStats, SignalDatabase};
pub use state::{
    AccelProfile, CruiseState, GearShifter, ShifterTable, VehicleStateSnapshot, WheelSpeeds,
};
pub use types::{CanFrame, DecoderError, EncodedFrame, Result};
pub use variant::{Feature, FeatureFlags, VehicleVariant};

// Internal modules (not exposed in public API)
mod message_codec;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
