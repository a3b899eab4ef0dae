//! DBC file parser
//!
//! Parses Vector DBC files and converts them into our internal signal database format.

use crate::signals::database::{
    ByteOrder, MessageDefinition, SignalDatabase, SignalDefinition, ValueType,
};
use crate::types::{DecoderError, Result};
use std::path::Path;

/// Extended-frame marker bit used by DBC message IDs
const DBC_EXTENDED_ID_FLAG: u32 = 0x8000_0000;

/// Parse a DBC file and return message definitions
pub fn parse_dbc_file(path: &Path) -> Result<Vec<MessageDefinition>> {
    log::info!("Parsing DBC file: {:?}", path);

    // Read the DBC file as bytes first (handle non-UTF8 encodings)
    let bytes = std::fs::read(path).map_err(|e| {
        DecoderError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    let dbc_content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(err) => {
            // Latin-1 maps every byte to the code point of the same value
            log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
            err.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    let source_filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.dbc")
        .to_string();

    let messages = parse_dbc_str(&dbc_content, &source_filename)?;

    log::info!("Parsed {} messages from {:?}", messages.len(), path);

    Ok(messages)
}

/// Parse DBC text and return message definitions
pub fn parse_dbc_str(content: &str, source: &str) -> Result<Vec<MessageDefinition>> {
    let dbc = can_dbc::DBC::from_slice(content.as_bytes()).map_err(|e| {
        DecoderError::DbcParseError(format!("Failed to parse DBC {}: {:?}", source, e))
    })?;

    dbc.messages()
        .iter()
        .map(|dbc_msg| convert_message(dbc_msg, source))
        .collect()
}

/// Load a DBC file straight into a signal database
pub fn load_database(path: &Path) -> Result<SignalDatabase> {
    Ok(SignalDatabase::from_messages(parse_dbc_file(path)?))
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc_msg: &can_dbc::Message, source: &str) -> Result<MessageDefinition> {
    let signals = dbc_msg
        .signals()
        .iter()
        .map(convert_signal)
        .collect::<Result<Vec<_>>>()?;

    let size = *dbc_msg.message_size() as usize;
    if let Some(sig) = signals
        .iter()
        .find(|sig| (sig.start_bit as usize) >= size * 8)
    {
        return Err(DecoderError::InvalidSignalDefinition(format!(
            "Signal '{}' starts at bit {} outside {}-byte message '{}'",
            sig.name,
            sig.start_bit,
            size,
            dbc_msg.message_name()
        )));
    }

    Ok(MessageDefinition {
        address: dbc_msg.message_id().0 & !DBC_EXTENDED_ID_FLAG,
        name: dbc_msg.message_name().to_string(),
        size,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
        source: source.to_string(),
    })
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(dbc_sig: &can_dbc::Signal) -> Result<SignalDefinition> {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let length = *dbc_sig.signal_size();
    if length == 0 || length > 64 {
        return Err(DecoderError::InvalidSignalDefinition(format!(
            "Signal '{}' has unsupported length {}",
            dbc_sig.name(),
            length
        )));
    }

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        start_bit: *dbc_sig.start_bit() as u16,
        length: length as u16,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        min: *dbc_sig.min(),
        max: *dbc_sig.max(),
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const STEERING_DBC: &str = r#"
VERSION ""

NS_ :
    CM_
    BA_DEF_
    BA_
    VAL_

BS_:

BU_: EON EPS

BO_ 228 STEERING_CONTROL: 5 EON
 SG_ STEER_TORQUE : 7|16@0- (1,0) [-4096|4096] "" EPS
 SG_ STEER_TORQUE_REQUEST : 23|1@0+ (1,0) [0|1] "" EPS
 SG_ COUNTER : 37|2@0+ (1,0) [0|3] "" EPS
 SG_ CHECKSUM : 35|4@0+ (1,0) [0|15] "" EPS

BO_ 512 GAS_COMMAND: 6 EON
 SG_ GAS_COMMAND : 7|16@0+ (1,0) [0|0] "" INTERCEPTOR
 SG_ ENABLE : 39|1@0+ (1,0) [0|1] "" INTERCEPTOR
"#;

    #[test]
    fn test_parse_dbc_str() {
        let messages = parse_dbc_str(STEERING_DBC, "steering.dbc").unwrap();
        assert_eq!(messages.len(), 2);

        let msg = messages.iter().find(|m| m.address == 228).unwrap();
        assert_eq!(msg.name, "STEERING_CONTROL");
        assert_eq!(msg.size, 5);
        assert_eq!(msg.sender, Some("EON".to_string()));
        assert_eq!(msg.source, "steering.dbc");

        let torque = msg.signal("STEER_TORQUE").unwrap();
        assert_eq!(torque.start_bit, 7);
        assert_eq!(torque.length, 16);
        assert_eq!(torque.byte_order, ByteOrder::BigEndian);
        assert_eq!(torque.value_type, ValueType::Signed);
        assert_eq!(torque.min, -4096.0);
    }

    #[test]
    fn test_load_database_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(STEERING_DBC.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let db = load_database(temp_file.path()).unwrap();
        assert_eq!(db.stats().num_messages, 2);
        assert_eq!(db.stats().num_signals, 6);
        assert_eq!(db.get_message_by_name("GAS_COMMAND").unwrap().address, 512);
    }

    #[test]
    fn test_missing_file() {
        let result = parse_dbc_file(Path::new("/nonexistent/car.dbc"));
        assert!(matches!(result, Err(DecoderError::DbcParseError(_))));
    }
}
