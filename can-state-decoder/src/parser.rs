//! Bus parser
//!
//! A bus parser turns raw frames from one bus into the latest value of every
//! signal its schema asks for, and tracks whether each message is still
//! arriving fast enough. The decoder only ever sees a [`RawSignalFrame`] copy,
//! so a parser may live on its own I/O thread and hand snapshots across.
//!
//! [`CanParser`] is the reference implementation backed by a
//! [`SignalDatabase`].

use crate::message_codec::MessageCodec;
use crate::schema::BusSchema;
use crate::signals::database::{MessageDefinition, SignalDatabase};
use crate::types::{CanFrame, DecoderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Nanoseconds per second
const NS_PER_S: f64 = 1e9;

/// A message is stale once this many nominal periods pass without an update
const STALE_PERIODS: f64 = 10.0;

/// Latest decoded values from one bus, as seen by the decoder in one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSignalFrame {
    /// Bus index the values came from
    pub bus: u8,
    /// Values keyed by message name, then signal name
    #[serde(default)]
    pub values: BTreeMap<String, BTreeMap<String, f64>>,
    /// Freshness per message name; messages without a check are absent
    #[serde(default)]
    pub fresh: BTreeMap<String, bool>,
    /// Transport-level health of the bus
    #[serde(default)]
    pub bus_valid: bool,
}

impl RawSignalFrame {
    /// Create an empty frame for `bus`, marked valid
    pub fn new(bus: u8) -> Self {
        Self {
            bus,
            values: BTreeMap::new(),
            fresh: BTreeMap::new(),
            bus_valid: true,
        }
    }

    /// Builder method: set one signal value
    pub fn with_value(mut self, message: &str, signal: &str, value: f64) -> Self {
        self.set(message, signal, value);
        self
    }

    /// Builder method: set the bus-valid flag
    pub fn with_bus_valid(mut self, valid: bool) -> Self {
        self.bus_valid = valid;
        self
    }

    /// Set one signal value
    pub fn set(&mut self, message: &str, signal: &str, value: f64) {
        self.values
            .entry(message.to_string())
            .or_default()
            .insert(signal.to_string(), value);
    }

    /// Latest value of a signal, `None` if the parser never reported it
    pub fn value(&self, message: &str, signal: &str) -> Option<f64> {
        self.values.get(message).and_then(|signals| signals.get(signal)).copied()
    }

    /// Whether a message updated within its required period
    ///
    /// Messages without a freshness check count as fresh.
    pub fn is_fresh(&self, message: &str) -> bool {
        self.fresh.get(message).copied().unwrap_or(true)
    }
}

/// Source of per-cycle signal snapshots for one bus
pub trait BusParser {
    /// Feed one received frame
    fn update(&mut self, frame: &CanFrame);

    /// Snapshot of the latest values, with freshness evaluated at `now_ns`
    fn latest(&self, now_ns: u64) -> RawSignalFrame;
}

/// Tracking state of one schema message
#[derive(Debug, Clone)]
struct TrackedMessage {
    definition: MessageDefinition,
    /// Signals to extract, in schema order
    signals: Vec<String>,
    /// Staleness threshold in nanoseconds, `None` when unchecked
    timeout_ns: Option<u64>,
    last_update_ns: Option<u64>,
    values: BTreeMap<String, f64>,
}

impl TrackedMessage {
    fn is_fresh(&self, now_ns: u64) -> bool {
        match (self.timeout_ns, self.last_update_ns) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(timeout), Some(last)) => now_ns.saturating_sub(last) <= timeout,
        }
    }
}

/// Reference bus parser over a signal database
#[derive(Debug, Clone)]
pub struct CanParser {
    bus: u8,
    /// Tracked messages by CAN ID
    messages: HashMap<u32, TrackedMessage>,
    transport_error: bool,
}

impl CanParser {
    /// Configure a parser for one bus schema
    ///
    /// # Arguments
    /// * `db` - Signal database holding the bit layouts
    /// * `schema` - Messages and signals to decode on this bus
    ///
    /// # Returns
    /// * `Result<Self>` - Err if the schema names a message or signal the
    ///   database does not define
    pub fn configure(db: &SignalDatabase, schema: &BusSchema) -> Result<Self> {
        let mut messages = HashMap::new();

        for (name, requirement) in &schema.messages {
            let definition = db.get_message_by_name(name).ok_or_else(|| {
                DecoderError::InvalidConfiguration(format!(
                    "Message '{}' required on bus {} is not in the signal database",
                    name, schema.bus
                ))
            })?;

            for signal in requirement.signals.keys() {
                if definition.signal(signal).is_none() {
                    return Err(DecoderError::InvalidConfiguration(format!(
                        "Message '{}' has no signal '{}'",
                        name, signal
                    )));
                }
            }

            let timeout_ns = requirement
                .frequency_hz
                .map(|freq| (STALE_PERIODS / freq * NS_PER_S) as u64);

            // Values start at zero until the first frame arrives
            let values = requirement
                .signals
                .keys()
                .map(|signal| (signal.clone(), 0.0))
                .collect();

            messages.insert(
                definition.address,
                TrackedMessage {
                    definition: definition.clone(),
                    signals: requirement.signals.keys().cloned().collect(),
                    timeout_ns,
                    last_update_ns: None,
                    values,
                },
            );
        }

        log::info!(
            "Configured parser for bus {}: {} messages, {} signals",
            schema.bus,
            messages.len(),
            schema.num_signals()
        );

        Ok(Self {
            bus: schema.bus,
            messages,
            transport_error: false,
        })
    }

    /// Report transport-level health from the bus driver
    pub fn set_transport_error(&mut self, error: bool) {
        if error != self.transport_error {
            log::debug!("Bus {} transport error: {}", self.bus, error);
        }
        self.transport_error = error;
    }

    /// Bus index this parser listens on
    pub fn bus(&self) -> u8 {
        self.bus
    }
}

impl BusParser for CanParser {
    fn update(&mut self, frame: &CanFrame) {
        if frame.bus != self.bus {
            return;
        }
        let Some(tracked) = self.messages.get_mut(&frame.address) else {
            return;
        };

        if frame.dlc() < tracked.definition.size {
            log::trace!(
                "Ignoring short frame 0x{:X}: {} of {} bytes",
                frame.address,
                frame.dlc(),
                tracked.definition.size
            );
            return;
        }

        for name in &tracked.signals {
            if let Some(signal) = tracked.definition.signal(name) {
                if let Some(value) = MessageCodec::decode_signal(&frame.data, signal) {
                    tracked.values.insert(name.clone(), value);
                }
            }
        }
        tracked.last_update_ns = Some(frame.timestamp_ns);
    }

    fn latest(&self, now_ns: u64) -> RawSignalFrame {
        let mut frame = RawSignalFrame::new(self.bus);
        let mut all_fresh = true;

        for tracked in self.messages.values() {
            let name = &tracked.definition.name;
            frame.values.insert(name.clone(), tracked.values.clone());

            if tracked.timeout_ns.is_some() {
                let fresh = tracked.is_fresh(now_ns);
                all_fresh &= fresh;
                frame.fresh.insert(name.clone(), fresh);
            }
        }

        frame.bus_valid = all_fresh && !self.transport_error;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SignalPresence;
    use crate::signals::database::{ByteOrder, SignalDefinition, ValueType};

    fn byte_signal(name: &str, start_bit: u16) -> SignalDefinition {
        SignalDefinition {
            name: name.to_string(),
            start_bit,
            length: 8,
            byte_order: ByteOrder::BigEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: None,
        }
    }

    fn database() -> SignalDatabase {
        SignalDatabase::from_messages(vec![
            MessageDefinition {
                address: 0x100,
                name: "FAST".to_string(),
                size: 2,
                sender: None,
                signals: vec![byte_signal("A", 7), byte_signal("B", 15)],
                source: "test".to_string(),
            },
            MessageDefinition {
                address: 0x200,
                name: "SLOW".to_string(),
                size: 1,
                sender: None,
                signals: vec![byte_signal("C", 7)],
                source: "test".to_string(),
            },
        ])
    }

    fn schema() -> BusSchema {
        let mut schema = BusSchema::new(0);
        schema
            .add_signal("A", "FAST", SignalPresence::Required)
            .add_signal("C", "SLOW", SignalPresence::Required)
            .check("FAST", 100.0)
            .check("SLOW", 0.0);
        schema
    }

    fn frame(address: u32, timestamp_ns: u64, data: Vec<u8>) -> CanFrame {
        CanFrame {
            timestamp_ns,
            bus: 0,
            address,
            data,
        }
    }

    #[test]
    fn test_values_start_at_zero_and_bus_invalid() {
        let parser = CanParser::configure(&database(), &schema()).unwrap();
        let latest = parser.latest(0);

        assert_eq!(latest.value("FAST", "A"), Some(0.0));
        assert_eq!(latest.value("FAST", "B"), None);
        assert!(!latest.is_fresh("FAST"));
        assert!(!latest.bus_valid);
    }

    #[test]
    fn test_update_and_freshness() {
        let mut parser = CanParser::configure(&database(), &schema()).unwrap();
        parser.update(&frame(0x100, 1_000_000, vec![42, 7]));
        parser.update(&frame(0x200, 1_000_000, vec![9]));

        let latest = parser.latest(1_000_000);
        assert_eq!(latest.value("FAST", "A"), Some(42.0));
        assert_eq!(latest.value("SLOW", "C"), Some(9.0));
        assert!(latest.is_fresh("FAST"));
        assert!(latest.bus_valid);

        // 100 Hz message goes stale after ten periods (100 ms)
        let latest = parser.latest(1_000_000 + 100_000_000);
        assert!(latest.is_fresh("FAST"));
        let latest = parser.latest(1_000_000 + 100_000_001);
        assert!(!latest.is_fresh("FAST"));
        assert!(!latest.bus_valid);
        // Stale messages keep their last value
        assert_eq!(latest.value("FAST", "A"), Some(42.0));
    }

    #[test]
    fn test_unchecked_message_never_stale() {
        let mut parser = CanParser::configure(&database(), &schema()).unwrap();
        parser.update(&frame(0x100, 0, vec![1, 2]));
        let latest = parser.latest(5_000_000);
        assert!(latest.is_fresh("SLOW"));
        assert!(!latest.fresh.contains_key("SLOW"));
        assert!(latest.bus_valid);
    }

    #[test]
    fn test_transport_error_invalidates_bus() {
        let mut parser = CanParser::configure(&database(), &schema()).unwrap();
        parser.update(&frame(0x100, 0, vec![1, 2]));
        parser.set_transport_error(true);
        assert!(!parser.latest(0).bus_valid);
    }

    #[test]
    fn test_ignores_other_bus_and_short_frames() {
        let mut parser = CanParser::configure(&database(), &schema()).unwrap();
        let mut other_bus = frame(0x100, 0, vec![5, 5]);
        other_bus.bus = 2;
        parser.update(&other_bus);
        parser.update(&frame(0x100, 0, vec![5]));
        parser.update(&frame(0x999, 0, vec![5, 5]));

        assert_eq!(parser.latest(0).value("FAST", "A"), Some(0.0));
    }

    #[test]
    fn test_configure_rejects_unknown_names() {
        let mut schema = schema();
        schema.add_signal("X", "MISSING", SignalPresence::Required);
        assert!(matches!(
            CanParser::configure(&database(), &schema),
            Err(DecoderError::InvalidConfiguration(_))
        ));

        let mut schema = BusSchema::new(0);
        schema.add_signal("NOPE", "FAST", SignalPresence::Required);
        assert!(CanParser::configure(&database(), &schema).is_err());
    }

    #[test]
    fn test_raw_signal_frame_builder() {
        let frame = RawSignalFrame::new(2)
            .with_value("PRE_COLLISION", "FORCE", -3.0)
            .with_bus_valid(false);
        assert_eq!(frame.value("PRE_COLLISION", "FORCE"), Some(-3.0));
        assert_eq!(frame.value("PRE_COLLISION", "PRECOLLISION_ACTIVE"), None);
        assert!(frame.is_fresh("PRE_COLLISION"));
        assert!(!frame.bus_valid);
    }
}
