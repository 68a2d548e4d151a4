//! Precondition checks run before any encoding or saving work.
//!
//! Each check is independent and reports exactly which precondition failed.

use crate::error::{Error, Result};
use std::path::Path;

/// Exclusive upper bound on script size in bytes.
///
/// The flash region reserved for the script is 8 KiB; the four-byte
/// `MP<len>` header and at least one padding byte must also fit.
pub const MAX_SCRIPT_SIZE: usize = 8188;

/// Extension required for images written to a device
pub const HEX_EXTENSION: &str = "hex";

/// Extension required for script sources
pub const SCRIPT_EXTENSION: &str = "py";

/// Rejects scripts at or above [`MAX_SCRIPT_SIZE`]
pub fn check_script_size(script: &[u8]) -> Result<()> {
    if script.len() >= MAX_SCRIPT_SIZE {
        return Err(Error::script_too_large(script.len()));
    }
    Ok(())
}

/// Rejects an empty image destined for a device or file
pub fn check_image(image: &str) -> Result<()> {
    if image.is_empty() {
        return Err(Error::EmptyImage);
    }
    Ok(())
}

/// Rejects destinations that are not `.hex` files
pub fn check_hex_path(path: &Path) -> Result<()> {
    if has_extension(path, HEX_EXTENSION) {
        Ok(())
    } else {
        Err(Error::not_a_hex_path(path))
    }
}

/// Rejects script sources that are not `.py` files
pub fn check_script_path(path: &Path) -> Result<()> {
    if has_extension(path, SCRIPT_EXTENSION) {
        Ok(())
    } else {
        Err(Error::not_a_script_path(path))
    }
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == expected)
        .unwrap_or(false)
}
