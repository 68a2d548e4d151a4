//! Optional source minification.
//!
//! Minification is a capability handed to the flash pipeline through
//! [`FlashConfig`](crate::flash::FlashConfig). Requesting it without a
//! configured [`Minifier`] is an error, never a silent no-op.

use crate::error::Result;
use std::fmt::Debug;

/// Shrinks script source before it is encoded
pub trait Minifier: Send + Sync + Debug {
    /// Short identifier shown in logs
    fn name(&self) -> &str;

    /// Returns the minified source
    fn minify(&self, source: &str) -> Result<String>;
}

/// Line-based minifier.
///
/// Drops blank lines and full-line `#` comments and trims trailing
/// whitespace. Lines inside triple-quoted strings are left untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineMinifier;

impl Minifier for LineMinifier {
    fn name(&self) -> &str {
        "line"
    }

    fn minify(&self, source: &str) -> Result<String> {
        let mut output: Vec<&str> = Vec::new();
        let mut open: Option<&'static [u8]> = None;

        for line in source.lines() {
            if open.is_some() {
                open = scan_triple_quotes(line.as_bytes(), open);
                output.push(line);
                continue;
            }

            let stripped = line.trim_start();
            if stripped.is_empty() || stripped.starts_with('#') {
                continue;
            }

            open = scan_triple_quotes(line.as_bytes(), None);
            if open.is_some() {
                // Trailing whitespace belongs to the string literal
                output.push(line);
            } else {
                output.push(line.trim_end());
            }
        }

        let mut minified = output.join("\n");
        if !minified.is_empty() {
            minified.push('\n');
        }
        Ok(minified)
    }
}

const DOUBLE_TRIPLE: &[u8] = b"\"\"\"";
const SINGLE_TRIPLE: &[u8] = b"'''";

/// Returns the triple-quote delimiter still open at the end of `line`
fn scan_triple_quotes(line: &[u8], mut open: Option<&'static [u8]>) -> Option<&'static [u8]> {
    let mut i = 0;
    while i < line.len() {
        let rest = &line[i..];
        match open {
            Some(delim) if rest.starts_with(delim) => {
                open = None;
                i += delim.len();
            }
            Some(_) => i += 1,
            None if rest.starts_with(DOUBLE_TRIPLE) => {
                open = Some(DOUBLE_TRIPLE);
                i += DOUBLE_TRIPLE.len();
            }
            None if rest.starts_with(SINGLE_TRIPLE) => {
                open = Some(SINGLE_TRIPLE);
                i += SINGLE_TRIPLE.len();
            }
            None if rest[0] == b'#' => break,
            None => i += 1,
        }
    }
    open
}
