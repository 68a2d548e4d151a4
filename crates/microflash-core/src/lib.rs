//! # microflash-core
//!
//! A library for embedding MicroPython scripts into BBC micro:bit firmware
//! images and extracting them again.
//!
//! This crate provides the core functionality for:
//! - Encoding a script into checksummed Intel HEX records
//! - Splicing those records into a MicroPython runtime image
//! - Locating and decoding a script embedded in a combined image
//!
//! ## Architecture
//!
//! - [`guard`]: Precondition checks (size ceiling, image and path shape)
//! - [`hex`]: Record codec
//! - [`splice`]: Embedding and extraction
//! - [`flash`]: The end-to-end pipeline and file output
//! - [`device`]: Finding a mounted micro:bit
//! - [`watch`]: Re-running the pipeline when a script changes
//! - [`minify`]: Optional source minification
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use microflash_core::{encode, embed, extract};
//! use std::fs;
//!
//! let runtime = fs::read_to_string("firmware.hex")?;
//! let script = b"from microbit import *\ndisplay.scroll('Hi')\n";
//!
//! let combined = embed(&runtime, &encode(script)?)?;
//! assert_eq!(extract(&combined).as_bytes(), script);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Minifier`]: Plug in a source minifier
//! - [`DeviceFinder`]: Customize device discovery
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod device;
pub mod error;
pub mod flash;
pub mod guard;
pub mod hex;
pub mod minify;
pub mod splice;
pub mod watch;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience
pub use device::{find_microbit, DeviceFinder, Platform};
pub use error::{Error, Result};
pub use flash::{save_image, FlashConfig, FlashOutcome, Flasher, ScriptSource};
pub use guard::MAX_SCRIPT_SIZE;
pub use hex::{decode, encode, Record, RecordType};
pub use minify::{LineMinifier, Minifier};
pub use splice::{embed, extract};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
