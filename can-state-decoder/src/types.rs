//! Core types shared across the decoder library
//!
//! This module defines the raw frame types that enter and leave the library and
//! the error type returned by every fallible operation.

use serde::{Deserialize, Serialize};

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Raw CAN frame as received from the transport
///
/// This is the input of the reference bus parser. Frames produced by the
/// bench codec convert into this type with [`EncodedFrame::into_can_frame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// Receive timestamp in nanoseconds (monotonic clock of the transport)
    pub timestamp_ns: u64,
    /// Bus index (0 = powertrain, 1 = radar, 2 = camera)
    pub bus: u8,
    /// CAN message ID (11-bit or 29-bit)
    pub address: u32,
    /// Frame data bytes (0-8 bytes for classic CAN)
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// A frame synthesized by the bench codec
///
/// Created fresh for every synthesized frame and handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFrame {
    /// CAN message ID
    pub address: u32,
    /// Bus index the frame is emitted on
    pub bus: u8,
    /// Packed payload bytes
    pub data: Vec<u8>,
    /// Frame index the payload was synthesized for (drives rolling counters)
    pub frame_index: u64,
}

impl EncodedFrame {
    /// Convert into a received frame stamped with `timestamp_ns`
    pub fn into_can_frame(self, timestamp_ns: u64) -> CanFrame {
        CanFrame {
            timestamp_ns,
            bus: self.bus,
            address: self.address,
            data: self.data,
        }
    }
}

/// Errors that can occur in the decoder library
///
/// Missing optional signals and stale messages are not errors: they resolve to
/// documented defaults inside the decoder and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Message not found: CAN ID 0x{0:X}")]
    UnknownMessage(u32),

    #[error("Checksum mismatch on 0x{address:X}: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        address: u32,
        expected: u8,
        actual: u8,
    },

    #[error("Malformed frame 0x{address:X}: {reason}")]
    MalformedFrame { address: u32, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_frame_conversion() {
        let encoded = EncodedFrame {
            address: 0x1fa,
            bus: 2,
            data: vec![0x01, 0x02, 0x03],
            frame_index: 42,
        };

        let frame = encoded.into_can_frame(1_000);
        assert_eq!(frame.address, 0x1fa);
        assert_eq!(frame.bus, 2);
        assert_eq!(frame.dlc(), 3);
        assert_eq!(frame.timestamp_ns, 1_000);
    }

    #[test]
    fn test_error_display() {
        let err = DecoderError::ChecksumMismatch {
            address: 0xe4,
            expected: 0x0a,
            actual: 0x03,
        };
        assert_eq!(
            format!("{}", err),
            "Checksum mismatch on 0xE4: expected 0x0A, got 0x03"
        );
        assert_eq!(
            format!("{}", DecoderError::UnknownMessage(0x200)),
            "Message not found: CAN ID 0x200"
        );
    }
}
