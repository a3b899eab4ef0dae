//! Signal database
//!
//! Holds message and signal bit layouts, either loaded from DBC files or built
//! in code for the bench profile. The same database drives signal extraction in
//! the reference bus parser and frame packing in the codec.

use std::collections::HashMap;

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    /// CAN message ID
    pub address: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message
    pub signals: Vec<SignalDefinition>,
    /// Source of the definition (DBC filename or built-in profile name)
    pub source: String,
}

impl MessageDefinition {
    /// Look up a signal of this message by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (LSB for Intel, MSB for Motorola)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    /// Byte order
    pub byte_order: ByteOrder,
    /// Value type (signed/unsigned)
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value
    pub min: f64,
    /// Maximum physical value
    pub max: f64,
    /// Engineering unit (e.g., "km/h", "deg")
    pub unit: Option<String>,
}

impl SignalDefinition {
    /// Whether `value` lies inside the declared physical range
    ///
    /// A `[0|0]` range is how DBC files leave a signal unbounded.
    pub fn in_range(&self, value: f64) -> bool {
        if self.min == 0.0 && self.max == 0.0 {
            return true;
        }
        value >= self.min && value <= self.max
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// Message definitions indexed by address and by name
#[derive(Debug, Clone, Default)]
pub struct SignalDatabase {
    /// All message definitions by CAN ID
    messages: HashMap<u32, MessageDefinition>,

    /// Message name lookup
    /// Key: Message name, Value: CAN ID
    message_lookup: HashMap<String, u32>,
}

impl SignalDatabase {
    /// Create a new empty signal database
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a database from a list of message definitions
    pub fn from_messages(messages: impl IntoIterator<Item = MessageDefinition>) -> Self {
        let mut db = Self::new();
        for message in messages {
            db.add_message(message);
        }
        db
    }

    /// Add a message definition to the database
    ///
    /// A later definition for the same CAN ID replaces the earlier one.
    pub fn add_message(&mut self, message: MessageDefinition) {
        if let Some(previous) = self.messages.get(&message.address) {
            log::debug!(
                "Replacing message 0x{:X} ({} from {}) with {} from {}",
                message.address,
                previous.name,
                previous.source,
                message.name,
                message.source
            );
            self.message_lookup.remove(&previous.name);
        }

        self.message_lookup.insert(message.name.clone(), message.address);
        self.messages.insert(message.address, message);
    }

    /// Get a message definition by CAN ID
    pub fn get_message(&self, address: u32) -> Option<&MessageDefinition> {
        self.messages.get(&address)
    }

    /// Get a message definition by name
    pub fn get_message_by_name(&self, name: &str) -> Option<&MessageDefinition> {
        self.message_lookup
            .get(name)
            .and_then(|address| self.messages.get(address))
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|msg| msg.signals.len()).sum(),
        }
    }

    /// Get all CAN IDs in the database, sorted
    pub fn get_all_addresses(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheel_speed() -> SignalDefinition {
        SignalDefinition {
            name: "WHEEL_SPEED_FL".to_string(),
            start_bit: 7,
            length: 16,
            byte_order: ByteOrder::BigEndian,
            value_type: ValueType::Unsigned,
            factor: 0.01,
            offset: -67.67,
            min: 0.0,
            max: 250.0,
            unit: Some("kph".to_string()),
        }
    }

    fn wheel_speeds(address: u32, name: &str) -> MessageDefinition {
        MessageDefinition {
            address,
            name: name.to_string(),
            size: 8,
            sender: Some("ABS".to_string()),
            signals: vec![wheel_speed()],
            source: "toyota_nodsu_pt.dbc".to_string(),
        }
    }

    #[test]
    fn test_empty_database() {
        let db = SignalDatabase::new();
        let stats = db.stats();
        assert_eq!(stats.num_messages, 0);
        assert_eq!(stats.num_signals, 0);
    }

    #[test]
    fn test_add_message() {
        let mut db = SignalDatabase::new();
        db.add_message(wheel_speeds(0xAA, "WHEEL_SPEEDS"));

        let stats = db.stats();
        assert_eq!(stats.num_messages, 1);
        assert_eq!(stats.num_signals, 1);

        let msg = db.get_message(0xAA).unwrap();
        assert_eq!(msg.name, "WHEEL_SPEEDS");
        assert_eq!(msg.signals[0].name, "WHEEL_SPEED_FL");
        assert_eq!(db.get_message_by_name("WHEEL_SPEEDS").unwrap().address, 0xAA);
    }

    #[test]
    fn test_replace_message() {
        let mut db = SignalDatabase::new();
        db.add_message(wheel_speeds(0xAA, "WHEEL_SPEEDS"));
        db.add_message(wheel_speeds(0xAA, "WHEEL_SPEEDS_2"));

        assert_eq!(db.stats().num_messages, 1);
        assert!(db.get_message_by_name("WHEEL_SPEEDS").is_none());
        assert!(db.get_message_by_name("WHEEL_SPEEDS_2").is_some());
    }

    #[test]
    fn test_signal_range() {
        let sig = wheel_speed();
        assert!(sig.in_range(88.0));
        assert!(!sig.in_range(300.0));

        let unbounded = SignalDefinition { min: 0.0, max: 0.0, ..wheel_speed() };
        assert!(unbounded.in_range(-5.0));
    }
}
