//! Single Intel HEX records.
//!
//! Each record is one text line:
//!
//! ```text
//! :LLAAAATT[DD...]CC
//! ```
//!
//! - `LL`: payload length
//! - `AAAA`: 16-bit big-endian load offset
//! - `TT`: record type
//! - `DD`: payload bytes
//! - `CC`: two's complement of the byte-wise sum of everything before it
//!
//! Hex digits are emitted uppercase and accepted in either case.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fmt;

/// Start code that prefixes every record line
pub const START_CODE: char = ':';

/// Largest payload a single record can carry
pub const MAX_RECORD_DATA: usize = u8::MAX as usize;

/// Intel HEX record types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Payload bytes at `upper address + offset`
    Data = 0x00,
    /// End of file
    EndOfFile = 0x01,
    /// Upper address bits `value << 4`
    ExtendedSegmentAddress = 0x02,
    /// CS:IP start address (carries no loadable data)
    StartSegmentAddress = 0x03,
    /// Upper address bits `value << 16`
    ExtendedLinearAddress = 0x04,
    /// 32-bit start address (carries no loadable data)
    StartLinearAddress = 0x05,
}

impl TryFrom<u8> for RecordType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(RecordType::Data),
            0x01 => Ok(RecordType::EndOfFile),
            0x02 => Ok(RecordType::ExtendedSegmentAddress),
            0x03 => Ok(RecordType::StartSegmentAddress),
            0x04 => Ok(RecordType::ExtendedLinearAddress),
            0x05 => Ok(RecordType::StartLinearAddress),
            _ => Err(Error::invalid_record(
                7,
                format!("unknown record type: {:02X}", value),
            )),
        }
    }
}

/// One addressed, checksummed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record type
    pub record_type: RecordType,
    /// 16-bit load offset
    pub address: u16,
    /// Payload bytes, at most [`MAX_RECORD_DATA`]. Records built by hand
    /// with a longer payload serialise to invalid lines.
    pub data: Bytes,
}

impl Record {
    /// Creates a data record.
    ///
    /// Fails if the payload does not fit the one-byte length field.
    pub fn data(address: u16, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_RECORD_DATA {
            return Err(Error::invalid_record(
                1,
                format!(
                    "payload of {} bytes exceeds {} byte record limit",
                    data.len(),
                    MAX_RECORD_DATA
                ),
            ));
        }
        Ok(Self {
            record_type: RecordType::Data,
            address,
            data,
        })
    }

    /// Creates an extended linear address record selecting the given 64 KiB page
    pub fn extended_linear_address(page: u16) -> Self {
        Self {
            record_type: RecordType::ExtendedLinearAddress,
            address: 0,
            data: Bytes::copy_from_slice(&page.to_be_bytes()),
        }
    }

    /// Creates an end-of-file record
    pub fn end_of_file() -> Self {
        Self {
            record_type: RecordType::EndOfFile,
            address: 0,
            data: Bytes::new(),
        }
    }

    /// Computes the checksum byte for this record
    pub fn checksum(&self) -> u8 {
        let [addr_hi, addr_lo] = self.address.to_be_bytes();
        let sum = self
            .data
            .iter()
            .fold(self.data.len() as u8, |acc, &b| acc.wrapping_add(b))
            .wrapping_add(addr_hi)
            .wrapping_add(addr_lo)
            .wrapping_add(self.record_type as u8);
        (!sum).wrapping_add(1)
    }

    /// Returns the base address this record selects, if it is an address record.
    ///
    /// Extended linear records yield `value << 16`, extended segment records
    /// yield `value << 4`. Malformed address payloads yield `None`.
    pub fn upper_address(&self) -> Option<u32> {
        let shift = match self.record_type {
            RecordType::ExtendedLinearAddress => 16,
            RecordType::ExtendedSegmentAddress => 4,
            _ => return None,
        };
        let value: [u8; 2] = self.data[..].try_into().ok()?;
        Some(u32::from(u16::from_be_bytes(value)) << shift)
    }

    /// Returns true if the payload is entirely erased flash (`0xFF`)
    pub fn is_erased(&self) -> bool {
        !self.data.is_empty() && self.data.iter().all(|&b| b == 0xFF)
    }

    /// Parses a single record line.
    ///
    /// Leading/trailing whitespace (including a `\r` left over from CRLF
    /// files) is ignored. The checksum must match.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let digits = line
            .strip_prefix(START_CODE)
            .ok_or_else(|| Error::invalid_record(0, "missing start code ':'"))?;

        let raw = decode_hex(digits.as_bytes())?;
        if raw.len() < 5 {
            return Err(Error::invalid_record(
                1,
                format!("record too short ({} bytes)", raw.len()),
            ));
        }

        let length = raw[0] as usize;
        if raw.len() != length + 5 {
            return Err(Error::invalid_record(
                1,
                format!(
                    "length field says {} payload bytes, line has {}",
                    length,
                    raw.len() - 5
                ),
            ));
        }

        let record = Self {
            record_type: RecordType::try_from(raw[3])?,
            address: u16::from_be_bytes([raw[1], raw[2]]),
            data: Bytes::copy_from_slice(&raw[4..4 + length]),
        };

        let expected = record.checksum();
        let actual = raw[4 + length];
        if actual != expected {
            return Err(Error::invalid_record(
                1 + (4 + length) * 2,
                format!("checksum mismatch: expected {:02X}, found {:02X}", expected, actual),
            ));
        }

        Ok(record)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:02X}{:04X}{:02X}",
            START_CODE,
            self.data.len(),
            self.address,
            self.record_type as u8
        )?;
        for byte in &self.data {
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "{:02X}", self.checksum())
    }
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Decode pairs of hex digits into bytes.
///
/// Column numbers in errors are 1-based positions in the full line
/// (counting the start code).
fn decode_hex(digits: &[u8]) -> Result<Vec<u8>> {
    if digits.len() % 2 != 0 {
        return Err(Error::invalid_record(
            digits.len(),
            "odd number of hex digits",
        ));
    }

    digits
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| match (hex_nibble(pair[0]), hex_nibble(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(Error::invalid_record(1 + i * 2, "invalid hex digit")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_linear_address_line() {
        let record = Record::extended_linear_address(0x0003);
        assert_eq!(record.to_string(), ":020000040003F7");
        assert_eq!(record.upper_address(), Some(0x0003_0000));
    }

    #[test]
    fn test_end_of_file_line() {
        assert_eq!(Record::end_of_file().to_string(), ":00000001FF");
    }

    #[test]
    fn test_data_record_checksum() {
        // 0x10 + 0xDF + 0xE0 + 16 * 0xFF = 0x11BF -> 0x41
        let record = Record::data(0xDFE0, vec![0xFF; 16]).unwrap();
        assert_eq!(
            record.to_string(),
            ":10DFE000FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF41"
        );
        assert!(record.is_erased());
    }

    #[test]
    fn test_data_record_payload_limit() {
        let record = Record::data(0x0000, vec![0x00; MAX_RECORD_DATA]).unwrap();
        assert!(record.to_string().starts_with(":FF000000"));

        let err = Record::data(0x0000, vec![0x00; MAX_RECORD_DATA + 1]).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { column: 1, .. }));
        assert!(err.to_string().contains("256 bytes"));
    }

    #[test]
    fn test_parse_data_record() {
        let record = Record::parse(":10E50000FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF1B").unwrap();
        assert_eq!(record.record_type, RecordType::Data);
        assert_eq!(record.address, 0xE500);
        assert_eq!(record.data.len(), 16);
    }

    #[test]
    fn test_parse_accepts_lowercase_and_crlf() {
        let record = Record::parse(":04000005000153edb6\r").unwrap();
        assert_eq!(record.record_type, RecordType::StartLinearAddress);
        assert_eq!(&record.data[..], &[0x00, 0x01, 0x53, 0xED]);
        assert_eq!(record.upper_address(), None);
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let err = Record::parse(":10E000004D50FFFFFFFFFFFFFFFFFFFFFFFFFFFFFF").unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(Record::parse("invalid input").is_err());
        assert!(Record::parse(":").is_err());
        assert!(Record::parse(":0").is_err());
        assert!(Record::parse(":0200000400").is_err());
        assert!(Record::parse(":02000004000ZF7").is_err());
        assert!(Record::parse(":02000006000000F8").is_err());
        assert!(Record::parse(":020000040003é").is_err());
    }

    #[test]
    fn test_record_type_conversion() {
        assert_eq!(RecordType::try_from(0).unwrap(), RecordType::Data);
        assert_eq!(RecordType::try_from(1).unwrap(), RecordType::EndOfFile);
        assert_eq!(
            RecordType::try_from(4).unwrap(),
            RecordType::ExtendedLinearAddress
        );
        assert!(RecordType::try_from(6).is_err());
    }
}
