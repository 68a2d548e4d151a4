//! Embedding scripts into firmware images and extracting them again.
//!
//! The combined image is the firmware with the script records inserted
//! before the firmware's last [`TRAILING_RECORDS`] lines (the start address
//! and end-of-file records).
//!
//! Extraction locates the sentinel record (`MP` at 0xE000 in page 0x0003),
//! reads forward just far enough to cover the declared script length and
//! hands that window to [`hex::decode`](crate::hex::decode).

use crate::error::{Error, Result};
use crate::hex::{self, Record, RecordType, HEADER_LEN, SCRIPT_ADDR, SCRIPT_MAGIC, SCRIPT_PAGE};
use tracing::{debug, trace};

/// Number of firmware lines kept after the embedded script
pub const TRAILING_RECORDS: usize = 2;

/// Embed an encoded script into a firmware image.
///
/// An empty script returns the firmware unchanged. The result always ends
/// with a newline when a script is embedded.
pub fn embed(firmware: &str, script_hex: &str) -> Result<String> {
    if firmware.trim().is_empty() {
        return Err(Error::MissingRuntime);
    }
    if script_hex.trim().is_empty() {
        return Ok(firmware.to_owned());
    }

    let firmware_lines: Vec<&str> = firmware.split_whitespace().collect();
    let script_lines: Vec<&str> = script_hex.split_whitespace().collect();
    let split_at = firmware_lines.len().saturating_sub(TRAILING_RECORDS);

    let mut combined = Vec::with_capacity(firmware_lines.len() + script_lines.len());
    combined.extend_from_slice(&firmware_lines[..split_at]);
    combined.extend_from_slice(&script_lines);
    combined.extend_from_slice(&firmware_lines[split_at..]);

    debug!(
        "Embedded {} script records before line {} of {}",
        script_lines.len(),
        split_at,
        firmware_lines.len()
    );

    let mut image = combined.join("\n");
    image.push('\n');
    Ok(image)
}

/// Extract the script embedded in a combined image.
///
/// Records are read in file order from the sentinel until the header's
/// declared length is covered. Anything after that point is never read.
/// Returns an empty string if no script is embedded or the embedded region
/// is corrupt.
pub fn extract(combined: &str) -> String {
    let lines: Vec<&str> = combined
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let Some(start) = find_sentinel(&lines) else {
        debug!("No embedded script found");
        return String::new();
    };

    let mut window = vec![Record::extended_linear_address(SCRIPT_PAGE).to_string()];
    let mut payload: Vec<u8> = Vec::new();

    for (idx, line) in lines.iter().enumerate().skip(start) {
        let Some(record) = script_record(line) else {
            trace!("Script window ends at line {}", idx + 1);
            break;
        };
        payload.extend_from_slice(&record.data);
        window.push((*line).to_owned());

        if region_end(&payload).is_some_and(|end| payload.len() >= end) {
            trace!("Script window spans lines {}..={}", start + 1, idx + 1);
            break;
        }
    }

    hex::decode(&window.join("\n"))
}

/// Total region length (header included) once the header has been read
fn region_end(payload: &[u8]) -> Option<usize> {
    let declared = payload.get(2..HEADER_LEN)?;
    Some(HEADER_LEN + usize::from(u16::from_le_bytes([declared[0], declared[1]])))
}

/// Find the line index of the `MP` header record at [`SCRIPT_ADDR`].
///
/// Lines that are not records are foreign content and are skipped.
fn find_sentinel(lines: &[&str]) -> Option<usize> {
    let mut base: u32 = 0;

    for (idx, line) in lines.iter().enumerate() {
        let record = match Record::parse(line) {
            Ok(record) => record,
            Err(e) => {
                trace!("Skipping line {}: {}", idx + 1, e);
                continue;
            }
        };

        match record.record_type {
            RecordType::ExtendedLinearAddress | RecordType::ExtendedSegmentAddress => {
                base = record.upper_address().unwrap_or(base);
            }
            RecordType::Data => {
                let address = base.wrapping_add(u32::from(record.address));
                if address == SCRIPT_ADDR && record.data.starts_with(SCRIPT_MAGIC) {
                    trace!("Found script header on line {}", idx + 1);
                    return Some(idx);
                }
            }
            _ => {}
        }
    }

    None
}

/// A line belongs to the script window if it is a data record that is not
/// erased flash
fn script_record(line: &str) -> Option<Record> {
    Record::parse(line)
        .ok()
        .filter(|record| record.record_type == RecordType::Data && !record.is_erased())
}
