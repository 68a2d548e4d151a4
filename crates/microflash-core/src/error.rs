//! Error types for the microflash-core library.
//!
//! Every fatal precondition gets its own variant so callers can tell exactly
//! which input was rejected. Corrupt or foreign hex input is *not* an error:
//! the decode and extract paths absorb it and return an empty script.

use std::path::PathBuf;
use thiserror::Error;

use crate::guard::MAX_SCRIPT_SIZE;

/// Result type alias for microflash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all microflash operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Script exceeds the space reserved for it in flash
    #[error("Python script must be less than {max} bytes (got {size}).")]
    ScriptTooLarge {
        /// Size of the rejected script in bytes
        size: usize,
        /// Exclusive ceiling
        max: usize,
    },

    /// No MicroPython runtime image was supplied
    #[error("MicroPython runtime hex required.")]
    MissingRuntime,

    /// Attempted to flash or save an empty image
    #[error("Cannot flash an empty .hex file.")]
    EmptyImage,

    /// No script path was given where one is required
    #[error("a path to a Python script is required")]
    MissingScript,

    /// Destination does not point at a `.hex` file
    #[error("The path to flash must be for a .hex file (got '{path}').")]
    NotAHexPath {
        /// The rejected path
        path: PathBuf,
    },

    /// Script source does not point at a `.py` file
    #[error("Python files must end in \".py\" (got '{path}').")]
    NotAScriptPath {
        /// The rejected path
        path: PathBuf,
    },

    /// Minification was requested but no minifier is configured
    #[error("No minifier is available")]
    MinifierUnavailable,

    /// Device discovery was attempted on an unknown host
    #[error("OS \"{name}\" not supported.")]
    UnsupportedPlatform {
        /// Host OS identifier
        name: String,
    },

    /// No target was given and none could be discovered
    #[error("Unable to find micro:bit. Is it plugged in?")]
    DeviceNotFound,

    /// A line is not a well-formed record
    #[error("invalid hex record at column {column}: {details}")]
    InvalidRecord {
        /// Column in the line where the problem was found
        column: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An external helper command could not be run
    #[error("failed to run '{command}': {source}")]
    CommandFailed {
        /// Command name
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An external helper command ran but reported failure
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandExited {
        /// Command name
        command: String,
        /// Exit status as reported by the OS
        status: String,
        /// Captured standard error
        stderr: String,
    },
}

impl Error {
    /// Creates a new script size error with the fixed ceiling
    pub fn script_too_large(size: usize) -> Self {
        Self::ScriptTooLarge {
            size,
            max: MAX_SCRIPT_SIZE,
        }
    }

    /// Creates a new `.hex` path error
    pub fn not_a_hex_path(path: impl Into<PathBuf>) -> Self {
        Self::NotAHexPath { path: path.into() }
    }

    /// Creates a new `.py` path error
    pub fn not_a_script_path(path: impl Into<PathBuf>) -> Self {
        Self::NotAScriptPath { path: path.into() }
    }

    /// Creates a new unsupported platform error
    pub fn unsupported_platform(name: impl Into<String>) -> Self {
        Self::UnsupportedPlatform { name: name.into() }
    }

    /// Creates a new invalid record error
    pub fn invalid_record(column: usize, details: impl Into<String>) -> Self {
        Self::InvalidRecord {
            column,
            details: details.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new command failure error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Creates a new failed exit status error
    pub fn command_exited(
        command: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandExited {
            command: command.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the error was raised by a precondition check before
    /// any encoding work started
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ScriptTooLarge { .. }
                | Self::MissingRuntime
                | Self::EmptyImage
                | Self::MissingScript
                | Self::NotAHexPath { .. }
                | Self::NotAScriptPath { .. }
                | Self::MinifierUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::script_too_large(8193);
        assert!(err.to_string().contains("8188"));
        assert!(err.to_string().contains("8193"));

        let err = Error::unsupported_platform("foo");
        assert_eq!(err.to_string(), "OS \"foo\" not supported.");
    }

    #[test]
    fn test_is_precondition() {
        assert!(Error::MissingRuntime.is_precondition());
        assert!(Error::not_a_hex_path("foo.txt").is_precondition());
        assert!(!Error::DeviceNotFound.is_precondition());
        assert!(!Error::unsupported_platform("foo").is_precondition());
    }
}
