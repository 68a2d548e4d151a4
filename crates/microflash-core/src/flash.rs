//! The flash pipeline: script → hex → combined image → device.
//!
//! [`Flasher`] ties the guard, codec and splicer together with the
//! collaborators that touch the outside world (device discovery and file
//! output). The runtime image and the optional minifier are explicit
//! configuration rather than process-wide state.

use crate::device::{self, DeviceFinder};
use crate::error::{Error, Result};
use crate::guard::{check_hex_path, check_image, check_script_path, HEX_EXTENSION};
use crate::hex;
use crate::minify::Minifier;
use crate::splice;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name written to a device unless the script name is kept
pub const DEFAULT_HEX_NAME: &str = "micropython.hex";

/// Where the script to flash comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// A `.py` file on disk
    Path(PathBuf),
    /// Script bytes already in memory
    Bytes(Vec<u8>),
}

/// Configuration for the flash pipeline
#[derive(Debug, Clone, Default)]
pub struct FlashConfig {
    /// Minify the script before encoding
    pub minify: bool,
    /// Name the output after the script instead of [`DEFAULT_HEX_NAME`]
    pub keep_name: bool,
    /// Minifier used when `minify` is set
    pub minifier: Option<Arc<dyn Minifier>>,
}

impl FlashConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the script is minified
    pub fn minify(mut self, minify: bool) -> Self {
        self.minify = minify;
        self
    }

    /// Sets whether the output file is named after the script
    pub fn keep_name(mut self, keep_name: bool) -> Self {
        self.keep_name = keep_name;
        self
    }

    /// Sets the minifier capability
    pub fn minifier(mut self, minifier: impl Minifier + 'static) -> Self {
        self.minifier = Some(Arc::new(minifier));
        self
    }
}

/// Result of a successful flash
#[derive(Debug, Clone)]
pub struct FlashOutcome {
    /// The combined image that was written
    pub image: String,
    /// Every file written, one per target
    pub written: Vec<PathBuf>,
}

/// Builds combined images and writes them to devices
#[derive(Debug)]
pub struct Flasher {
    runtime: String,
    config: FlashConfig,
    finder: Option<Box<dyn DeviceFinder>>,
}

impl Flasher {
    /// Creates a flasher for the given runtime image with default configuration
    pub fn new(runtime: impl Into<String>) -> Self {
        Self::with_config(runtime, FlashConfig::default())
    }

    /// Creates a flasher with custom configuration
    pub fn with_config(runtime: impl Into<String>, config: FlashConfig) -> Self {
        Self {
            runtime: runtime.into(),
            config,
            finder: None,
        }
    }

    /// Overrides device discovery (defaults to the host platform's finder)
    pub fn with_finder(mut self, finder: impl DeviceFinder + 'static) -> Self {
        self.finder = Some(Box::new(finder));
        self
    }

    /// Returns the configuration
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// Normalises line endings and applies minification if requested
    pub fn prepare_script(&self, script: &[u8]) -> Result<Vec<u8>> {
        let minifier = match (self.config.minify, &self.config.minifier) {
            (false, _) => None,
            (true, Some(minifier)) => Some(minifier),
            (true, None) => return Err(Error::MinifierUnavailable),
        };

        let script = normalize_line_endings(script);
        let Some(minifier) = minifier else {
            return Ok(script);
        };

        let source = match String::from_utf8(script) {
            Ok(source) => source,
            Err(e) => {
                warn!("Script is not valid UTF-8, minifying a lossy copy");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        let minified = minifier.minify(&source)?;
        debug!(
            "Minified with {}: {} -> {} bytes",
            minifier.name(),
            source.len(),
            minified.len()
        );
        Ok(minified.into_bytes())
    }

    /// Builds the combined image for an optional script.
    ///
    /// Without a script the runtime is returned unchanged.
    pub fn build_image(&self, script: Option<&[u8]>) -> Result<String> {
        let script_hex = match script {
            Some(script) => hex::encode(&self.prepare_script(script)?)?,
            None => String::new(),
        };
        splice::embed(&self.runtime, &script_hex)
    }

    /// Builds the image and writes it to every target directory.
    ///
    /// With no targets the device is discovered; if none is found the call
    /// fails with [`Error::DeviceNotFound`].
    pub fn flash(
        &self,
        script: Option<&ScriptSource>,
        targets: &[PathBuf],
    ) -> Result<FlashOutcome> {
        let (bytes, stem) = match script {
            Some(ScriptSource::Path(path)) => {
                check_script_path(path)?;
                let bytes = fs::read(path).map_err(|e| Error::file_read(path, e))?;
                let stem = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned());
                (Some(bytes), stem)
            }
            Some(ScriptSource::Bytes(bytes)) => (Some(bytes.clone()), None),
            None => (None, None),
        };

        let image = self.build_image(bytes.as_deref())?;

        let targets = if targets.is_empty() {
            vec![self.discover()?.ok_or(Error::DeviceNotFound)?]
        } else {
            targets.to_vec()
        };

        let file_name = match (&stem, self.config.keep_name) {
            (Some(stem), true) => format!("{}.{}", stem, HEX_EXTENSION),
            _ => DEFAULT_HEX_NAME.to_string(),
        };

        let mut written = Vec::with_capacity(targets.len());
        for target in &targets {
            let hex_path = target.join(&file_name);
            info!("Flashing to {}", hex_path.display());
            save_image(&image, &hex_path)?;
            written.push(hex_path);
        }

        Ok(FlashOutcome { image, written })
    }

    fn discover(&self) -> Result<Option<PathBuf>> {
        match &self.finder {
            Some(finder) => finder.find(),
            None => device::find_microbit(),
        }
    }
}

/// Converts `\r\n` and lone `\r` line endings to `\n`
pub fn normalize_line_endings(script: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(script.len());
    let mut bytes = script.iter().peekable();
    while let Some(&b) = bytes.next() {
        if b == b'\r' {
            if bytes.peek() == Some(&&b'\n') {
                bytes.next();
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}

/// Writes an image to a `.hex` file
pub fn save_image(image: &str, path: &Path) -> Result<()> {
    check_image(image)?;
    check_hex_path(path)?;
    fs::write(path, image.as_bytes()).map_err(|e| Error::file_write(path, e))
}

/// Reads a runtime image from disk
pub fn load_runtime(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::file_read(path, e))
}

/// Reads a combined image from disk and extracts its script
pub fn extract_file(path: &Path) -> Result<String> {
    let image = fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
    Ok(splice::extract(&image))
}
