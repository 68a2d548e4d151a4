//! Intel HEX codec for MicroPython scripts.
//!
//! A script is stored in flash at [`SCRIPT_ADDR`] behind a small header:
//!
//! ```text
//! 'M' 'P' <len lo> <len hi> <script bytes...> <zero padding>
//! ```
//!
//! The padded payload is split into 16-byte data records, preceded by an
//! extended linear address record selecting page `0x0003`.
//!
//! ## Decoding
//!
//! [`decode`] is fail-soft: malformed records, a missing header, a short
//! region or invalid UTF-8 all produce an empty string. Callers treat "empty"
//! as "no script here".

mod record;

use crate::error::Result;
use crate::guard::check_script_size;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use tracing::{debug, trace};

pub use record::{Record, RecordType, MAX_RECORD_DATA, START_CODE};

/// Absolute flash address of the script header
pub const SCRIPT_ADDR: u32 = 0x0003_E000;

/// Extended linear address page holding the script
pub const SCRIPT_PAGE: u16 = (SCRIPT_ADDR >> 16) as u16;

/// 16-bit offset of the script header within [`SCRIPT_PAGE`]
pub const SCRIPT_OFFSET: u16 = (SCRIPT_ADDR & 0xFFFF) as u16;

/// Size of the flash region reserved for the script (header included)
pub const SCRIPT_REGION_SIZE: u32 = 0x2000;

/// Magic tag at the start of an embedded script
pub const SCRIPT_MAGIC: &[u8; 2] = b"MP";

/// Header length: magic plus little-endian u16 length
pub const HEADER_LEN: usize = 4;

/// Payload bytes per data record
pub const CHUNK_SIZE: usize = 16;

/// Encode a script into Intel HEX text.
///
/// Returns an empty string for an empty script. Scripts of
/// [`MAX_SCRIPT_SIZE`](crate::guard::MAX_SCRIPT_SIZE) bytes or more are
/// rejected before any work is done.
pub fn encode(script: &[u8]) -> Result<String> {
    check_script_size(script)?;
    if script.is_empty() {
        return Ok(String::new());
    }

    let payload = script_payload(script);
    let mut lines = Vec::with_capacity(payload.len() / CHUNK_SIZE + 1);
    lines.push(Record::extended_linear_address(SCRIPT_PAGE).to_string());

    for start in (0..payload.len()).step_by(CHUNK_SIZE) {
        let end = (start + CHUNK_SIZE).min(payload.len());
        // start < SCRIPT_REGION_SIZE, so the offset never leaves the page
        let address = SCRIPT_OFFSET + start as u16;
        lines.push(Record::data(address, payload.slice(start..end))?.to_string());
    }

    debug!(
        "Encoded {} byte script into {} records",
        script.len(),
        lines.len()
    );
    Ok(lines.join("\n"))
}

/// Decode Intel HEX text back into the script it carries.
///
/// Returns an empty string if the input holds no valid script.
pub fn decode(text: &str) -> String {
    try_decode(text).unwrap_or_default()
}

/// Parse every non-blank line of an image as a record
pub fn parse_image(text: &str) -> Result<Vec<Record>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(Record::parse)
        .collect()
}

/// Build the header-prefixed, zero-padded payload for a script
fn script_payload(script: &[u8]) -> Bytes {
    let unpadded = HEADER_LEN + script.len();
    // Always at least one byte of padding, as the firmware expects
    let padding = CHUNK_SIZE - unpadded % CHUNK_SIZE;

    let mut payload = BytesMut::with_capacity(unpadded + padding);
    payload.put_slice(SCRIPT_MAGIC);
    payload.put_u16_le(script.len() as u16);
    payload.put_slice(script);
    payload.put_bytes(0, padding);
    payload.freeze()
}

fn try_decode(text: &str) -> Option<String> {
    let records = match parse_image(text) {
        Ok(records) => records,
        Err(e) => {
            trace!("Not a valid hex image: {}", e);
            return None;
        }
    };

    let region = script_region(&records)?;
    let script = unpack_script(&region)?;

    match String::from_utf8(script.to_vec()) {
        Ok(script) => Some(script),
        Err(e) => {
            debug!("Embedded script is not valid UTF-8: {}", e);
            None
        }
    }
}

/// Collect the contiguous run of data starting at [`SCRIPT_ADDR`].
///
/// Data records outside the script window are ignored. Within the window
/// records are ordered by address and the first record seen for an address
/// wins; the run stops at the first gap.
fn script_region(records: &[Record]) -> Option<Vec<u8>> {
    let window = SCRIPT_ADDR..SCRIPT_ADDR + SCRIPT_REGION_SIZE;
    let mut base: u32 = 0;
    let mut chunks: BTreeMap<u32, &Bytes> = BTreeMap::new();

    for record in records {
        match record.record_type {
            RecordType::ExtendedLinearAddress | RecordType::ExtendedSegmentAddress => {
                base = record.upper_address()?;
            }
            RecordType::Data => {
                let address = base.wrapping_add(u32::from(record.address));
                if window.contains(&address) {
                    chunks.entry(address).or_insert(&record.data);
                }
            }
            _ => {}
        }
    }

    let mut region = Vec::new();
    let mut next = SCRIPT_ADDR;
    for (&address, data) in &chunks {
        if address != next {
            trace!("Gap in script region at {:#07X}", next);
            break;
        }
        region.extend_from_slice(data);
        next += data.len() as u32;
    }

    if region.is_empty() {
        trace!("No data at script address {:#07X}", SCRIPT_ADDR);
        return None;
    }
    Some(region)
}

/// Strip the `MP<len>` header and return exactly the declared script bytes
fn unpack_script(region: &[u8]) -> Option<&[u8]> {
    if region.len() < HEADER_LEN || &region[..2] != SCRIPT_MAGIC {
        debug!("Script region does not start with the MP header");
        return None;
    }

    let declared = usize::from(u16::from_le_bytes([region[2], region[3]]));
    let body = &region[HEADER_LEN..];
    if body.len() < declared {
        debug!(
            "Script header declares {} bytes but only {} are present",
            declared,
            body.len()
        );
        return None;
    }
    Some(&body[..declared])
}
