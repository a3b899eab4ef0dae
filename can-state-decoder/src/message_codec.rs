//! Message bit codec
//!
//! Extracts signal values from raw CAN payloads and packs signal values back
//! into payloads, based on signal definitions from the signal database.
//! Handles bit placement, endianness, sign extension and physical value
//! conversion.

use crate::signals::database::{ByteOrder, MessageDefinition, SignalDefinition, ValueType};
use crate::types::{DecoderError, Result};

/// Stateless signal extraction and packing
pub struct MessageCodec;

impl MessageCodec {
    /// Decode a single signal into its physical value
    pub fn decode_signal(data: &[u8], signal: &SignalDefinition) -> Option<f64> {
        Self::extract_signal_value(data, signal).map(|raw| Self::raw_to_physical(signal, raw))
    }

    /// Extract the raw (sign-extended) value of a signal
    pub fn extract_signal_value(data: &[u8], signal: &SignalDefinition) -> Option<i64> {
        let positions = Self::bit_positions(signal);
        if !Self::fits(&positions, data.len()) {
            log::warn!(
                "Signal '{}' does not fit in {} byte payload",
                signal.name,
                data.len()
            );
            return None;
        }

        let mut raw: u64 = 0;
        for (i, pos) in positions.iter().enumerate() {
            let bit = (data[pos / 8] >> (pos % 8)) & 0x01;
            raw |= (bit as u64) << i;
        }

        Some(match signal.value_type {
            ValueType::Unsigned => raw as i64,
            ValueType::Signed => Self::sign_extend(raw, signal.length as usize),
        })
    }

    /// Write a raw value into the signal's bits, clearing what was there
    ///
    /// The value is truncated to the signal length (two's complement for
    /// negative values). Returns false when the signal does not fit in `data`.
    pub fn insert_signal_value(data: &mut [u8], signal: &SignalDefinition, raw: i64) -> bool {
        let positions = Self::bit_positions(signal);
        if !Self::fits(&positions, data.len()) {
            return false;
        }

        let bits = raw as u64;
        for (i, pos) in positions.iter().enumerate() {
            let mask = 1u8 << (pos % 8);
            if (bits >> i) & 0x01 != 0 {
                data[pos / 8] |= mask;
            } else {
                data[pos / 8] &= !mask;
            }
        }
        true
    }

    /// Pack named physical values into a zeroed payload of the message's size
    ///
    /// Signals not listed keep a raw value of zero.
    pub fn encode_message(
        message_def: &MessageDefinition,
        values: &[(&str, f64)],
    ) -> Result<Vec<u8>> {
        let mut data = vec![0u8; message_def.size];
        for (name, value) in values {
            let signal = message_def.signal(name).ok_or_else(|| {
                DecoderError::InvalidSignalDefinition(format!(
                    "Message '{}' has no signal '{}'",
                    message_def.name, name
                ))
            })?;
            let raw = Self::physical_to_raw(signal, *value);
            if !Self::insert_signal_value(&mut data, signal, raw) {
                return Err(DecoderError::InvalidSignalDefinition(format!(
                    "Signal '{}' does not fit in {}-byte message '{}'",
                    signal.name, message_def.size, message_def.name
                )));
            }
        }
        Ok(data)
    }

    /// Convert a raw value to its physical value: `raw * factor + offset`
    pub fn raw_to_physical(signal: &SignalDefinition, raw: i64) -> f64 {
        signal.offset + signal.factor * (raw as f64)
    }

    /// Convert a physical value to the nearest representable raw value
    ///
    /// Values outside the bit range saturate at the range bounds.
    pub fn physical_to_raw(signal: &SignalDefinition, value: f64) -> i64 {
        let raw = ((value - signal.offset) / signal.factor).round();
        let length = signal.length as i32;
        let (lo, hi) = match signal.value_type {
            ValueType::Unsigned => (0.0, 2f64.powi(length) - 1.0),
            ValueType::Signed => (-(2f64.powi(length - 1)), 2f64.powi(length - 1) - 1.0),
        };
        raw.clamp(lo, hi) as i64
    }

    /// Payload bit positions of a signal, least significant bit first
    ///
    /// Bit position `p` addresses bit `p % 8` (0 = LSB) of byte `p / 8`.
    /// Intel signals start at their LSB and walk upward. Motorola signals
    /// start at their MSB and walk toward bit 0 of each byte before jumping to
    /// bit 7 of the next byte.
    fn bit_positions(signal: &SignalDefinition) -> Vec<usize> {
        let length = signal.length as usize;
        let start = signal.start_bit as usize;

        match signal.byte_order {
            ByteOrder::LittleEndian => (start..start + length).collect(),
            ByteOrder::BigEndian => {
                let mut positions = Vec::with_capacity(length);
                let mut pos = start;
                for _ in 0..length {
                    positions.push(pos);
                    if pos % 8 == 0 {
                        pos += 15;
                    } else {
                        pos -= 1;
                    }
                }
                positions.reverse();
                positions
            }
        }
    }

    fn fits(positions: &[usize], data_len: usize) -> bool {
        positions.iter().all(|pos| pos / 8 < data_len)
    }

    /// Sign-extend a value from N bits to 64 bits
    ///
    /// If the value's MSB is 1, fill the upper bits with 1s.
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}
