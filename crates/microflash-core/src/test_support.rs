//! Shared fixtures for unit tests.

use crate::hex::Record;

pub(crate) const TEST_SCRIPT: &[u8] = b"from microbit import *\n\ndisplay.scroll('Hello, World!')\n";

/// A small stand-in for the MicroPython runtime image.
///
/// Two pages of data followed by the start linear address and end-of-file
/// records that real firmware ends with.
pub(crate) fn runtime() -> String {
    let mut lines = vec![Record::extended_linear_address(0x0000).to_string()];
    for row in 0..8u16 {
        let data: Vec<u8> = (0..16u16).map(|b| (row * 16 + b) as u8).collect();
        lines.push(Record::data(row * 16, data).unwrap().to_string());
    }
    lines.push(Record::extended_linear_address(0x0001).to_string());
    lines.push(Record::data(0x8000, vec![0xC0; 16]).unwrap().to_string());
    lines.push(":04000005000153EDB6".to_string());
    lines.push(Record::end_of_file().to_string());

    let mut image = lines.join("\n");
    image.push('\n');
    image
}
