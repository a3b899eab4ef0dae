//! Frame checksums
//!
//! Two families are in use on the bench profile: the Honda nibble checksum
//! carried in the low nibble of a message's last byte, and the CRC-8 used by
//! the pedal interceptor messages.

use crc::{Algorithm, Crc};

/// CAN IDs above this are 29-bit extended identifiers
const MAX_STANDARD_ID: u32 = 0x7FF;

/// CRC-8 with the DVB-S2 polynomial, seeded with 0xFF and never inverted
const PEDAL_CRC_ALGORITHM: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0xd5,
    init: 0xff,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0x7c,
    residue: 0x00,
};

const PEDAL_CRC: Crc<u8> = Crc::<u8>::new(&PEDAL_CRC_ALGORITHM);

/// Honda nibble checksum
///
/// Sums every nibble of the address and the payload, skipping the low nibble
/// of the last byte where the checksum itself lives.
pub fn honda_checksum(address: u32, data: &[u8]) -> u8 {
    let mut sum: i32 = 0;

    let mut addr = address;
    while addr != 0 {
        sum += (addr & 0xF) as i32;
        addr >>= 4;
    }

    let last = data.len().saturating_sub(1);
    for (i, &byte) in data.iter().enumerate() {
        let byte = if i == last { byte >> 4 } else { byte };
        sum += (byte & 0xF) as i32 + (byte >> 4) as i32;
    }

    let mut checksum = 8 - sum;
    if address > MAX_STANDARD_ID {
        checksum += 3;
    }
    (checksum & 0xF) as u8
}

/// CRC-8 of the pedal interceptor messages, computed from the last byte back
pub fn crc8_pedal(data: &[u8]) -> u8 {
    let mut digest = PEDAL_CRC.digest();
    for byte in data.iter().rev() {
        digest.update(std::slice::from_ref(byte));
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_honda_checksum() {
        assert_eq!(honda_checksum(0xE4, &[0; 5]), 6);
        assert_eq!(honda_checksum(0x1FA, &[0x12, 0x34, 0, 0, 0, 0, 0, 0x20]), 2);
    }

    #[test]
    fn test_honda_checksum_ignores_own_nibble() {
        let mut data = [0x12, 0x34, 0, 0, 0, 0, 0, 0x20];
        let checksum = honda_checksum(0x1FA, &data);
        data[7] |= checksum;
        assert_eq!(honda_checksum(0x1FA, &data), checksum);
    }

    #[test]
    fn test_honda_checksum_extended_id() {
        assert_eq!(honda_checksum(0x18DA_F110, &[0]), 10);
    }

    #[test]
    fn test_crc8_pedal() {
        assert_eq!(crc8_pedal(&[]), 0xFF);
        assert_eq!(crc8_pedal(&[0x00]), 0xF9);
        assert_eq!(crc8_pedal(&[0x01, 0x02]), 0xBB);
        assert_eq!(crc8_pedal(&[0, 0, 0, 0, 5]), 0xB8);
    }

    #[test]
    fn test_crc8_pedal_reads_back_to_front() {
        assert_eq!(PEDAL_CRC.checksum(b"123456789"), 0x7c);
        assert_eq!(crc8_pedal(b"987654321"), 0x7c);
        assert_eq!(crc8_pedal(&[0x02, 0x01]), PEDAL_CRC.checksum(&[0x01, 0x02]));
    }
}
