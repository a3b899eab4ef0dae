//! Signal database and DBC parser
//!
//! This module contains the DBC loader and the signal database shared by the
//! reference bus parser and the frame codec.

pub mod database;
pub mod dbc;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalDefinition, ValueType,
};
