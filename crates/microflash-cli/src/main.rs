//! microflash - Flash MicroPython scripts onto a BBC micro:bit
//!
//! This tool encodes a Python script as Intel HEX, embeds it in a
//! MicroPython runtime image and copies the result onto a mounted
//! micro:bit. It can also pull a script back out of a `.hex` file.

use anyhow::{bail, Context, Result};
use clap::Parser;
use microflash_core::flash::{extract_file, load_runtime};
use microflash_core::watch::{watch_file, DEFAULT_POLL_INTERVAL};
use microflash_core::{Error, FlashConfig, FlashOutcome, Flasher, LineMinifier, ScriptSource};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Flash Python onto the BBC micro:bit
///
/// If no script is given the unmodified runtime is flashed. If no target is
/// given the micro:bit is found automatically.
#[derive(Parser, Debug)]
#[command(name = "microflash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Python script to flash
    source: Option<PathBuf>,

    /// Mount points of micro:bit devices to flash
    targets: Vec<PathBuf>,

    /// Use the referenced MicroPython runtime .hex
    #[arg(short, long, env = "MICROFLASH_RUNTIME")]
    runtime: Option<PathBuf>,

    /// Watch the source file for changes and reflash
    #[arg(short, long)]
    watch: bool,

    /// Extract the Python script from a .hex file, printing it or writing it to OUTPUT
    #[arg(short, long, num_args = 1..=2, value_names = ["HEX", "OUTPUT"])]
    extract: Option<Vec<PathBuf>>,

    /// Minify the source before flashing
    #[arg(short, long)]
    minify: bool,

    /// Name the .hex after the script instead of micropython.hex
    #[arg(long)]
    keepname: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    if let Some(ref args) = cli.extract {
        run_extract(args).with_context(|| describe_failure("extracting", &cli))
    } else if cli.watch {
        run_watch(&cli).with_context(|| describe_failure("watching", &cli))
    } else {
        run_flash(&cli).with_context(|| describe_failure("flashing", &cli))
    }
}

/// Describe a failed operation with the script, targets and runtime involved
fn describe_failure(operation: &str, cli: &Cli) -> String {
    let source = match (&cli.extract, &cli.source) {
        (Some(args), _) => args.first().map(|p| p.display().to_string()),
        (None, Some(source)) => Some(source.display().to_string()),
        (None, None) => None,
    };
    let mut message = format!(
        "Error {} {}",
        operation,
        source.as_deref().unwrap_or("runtime")
    );

    if cli.extract.is_none() {
        if cli.targets.is_empty() {
            message.push_str(" to microbit");
        } else {
            let targets: Vec<String> = cli
                .targets
                .iter()
                .map(|t| t.display().to_string())
                .collect();
            message.push_str(&format!(" to {:?}", targets));
        }
        if let Some(ref runtime) = cli.runtime {
            message.push_str(&format!(" with runtime {}", runtime.display()));
        }
    }
    message
}

/// Build the flasher from CLI options
fn build_flasher(cli: &Cli) -> Result<Flasher> {
    let runtime = match cli.runtime {
        Some(ref path) => load_runtime(path)?,
        None => bail!(Error::MissingRuntime),
    };
    debug!("Loaded runtime: {} bytes", runtime.len());

    let config = FlashConfig::new()
        .minify(cli.minify)
        .keep_name(cli.keepname)
        .minifier(LineMinifier);
    Ok(Flasher::with_config(runtime, config))
}

/// Flash once
fn run_flash(cli: &Cli) -> Result<()> {
    let flasher = build_flasher(cli)?;
    flash_once(cli, &flasher)?;
    Ok(())
}

fn flash_once(cli: &Cli, flasher: &Flasher) -> microflash_core::Result<()> {
    let script = cli.source.clone().map(ScriptSource::Path);
    let outcome = flasher.flash(script.as_ref(), &cli.targets)?;
    report(cli, &outcome);
    Ok(())
}

/// Print where the image went
fn report(cli: &Cli, outcome: &FlashOutcome) {
    let digest = content_hash(&outcome.image);
    for path in &outcome.written {
        match (&cli.source, cli.keepname) {
            (Some(source), true) => {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!("Hexifying {} as: {}", name, path.display());
            }
            _ => println!("Flashing Python to: {}", path.display()),
        }
        info!("Wrote {} ({} bytes, {})", path.display(), outcome.image.len(), digest);
    }
}

/// Re-flash every time the source changes
fn run_watch(cli: &Cli) -> Result<()> {
    let Some(ref source) = cli.source else {
        bail!(Error::MissingScript);
    };
    let flasher = build_flasher(cli)?;
    // Ctrl-C terminates the process; nothing else sets this
    let cancel = AtomicBool::new(false);

    watch_file(source, DEFAULT_POLL_INTERVAL, &cancel, || flash_once(cli, &flasher))?;
    Ok(())
}

/// Extract the embedded script from a .hex file
fn run_extract(args: &[PathBuf]) -> Result<()> {
    let Some(hex_path) = args.first() else {
        bail!("--extract requires a .hex file");
    };

    let script = extract_file(hex_path)?;
    if script.is_empty() {
        info!("No Python script found in {}", hex_path.display());
    }

    match args.get(1) {
        Some(output) => write_script(output, &script)?,
        None => print!("{}", script),
    }
    Ok(())
}

fn write_script(output: &Path, script: &str) -> Result<()> {
    fs::write(output, script)
        .with_context(|| format!("Failed to write file: {}", output.display()))?;
    info!("Wrote script to {}", output.display());
    Ok(())
}

/// Short content hash of an image (first 8 chars of blake3)
fn content_hash(content: &str) -> String {
    let hash = blake3::hash(content.as_bytes());
    hash.to_hex()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    const EMBEDDED: &str = "\
:020000040003F7
:10E000004D500D007072696E7428276869212729A8
:10E010000A000000000000000000000000000000F6
:00000001FF
";

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("microflash").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_args() {
        let cli = parse(&[]);
        assert!(cli.source.is_none());
        assert!(cli.targets.is_empty());
        assert!(!cli.watch && !cli.minify && !cli.keepname);
    }

    #[test]
    fn test_source_and_targets() {
        let cli = parse(&["foo.py", "/media/foo/bar", "/media/foo/baz"]);
        assert_eq!(cli.source, Some(PathBuf::from("foo.py")));
        assert_eq!(
            cli.targets,
            vec![PathBuf::from("/media/foo/bar"), PathBuf::from("/media/foo/baz")]
        );
    }

    #[test]
    fn test_named_args() {
        let cli = parse(&["-r", "baz.hex", "--minify", "--keepname", "foo.py"]);
        assert_eq!(cli.runtime, Some(PathBuf::from("baz.hex")));
        assert!(cli.minify);
        assert!(cli.keepname);
    }

    #[test]
    fn test_extract_args() {
        let cli = parse(&["-e", "hex.hex", "foo.py"]);
        assert_eq!(
            cli.extract,
            Some(vec![PathBuf::from("hex.hex"), PathBuf::from("foo.py")])
        );

        let cli = parse(&["--extract", "hex.hex"]);
        assert_eq!(cli.extract, Some(vec![PathBuf::from("hex.hex")]));
    }

    #[test]
    fn test_describe_failure() {
        let cli = parse(&["test.py"]);
        assert_eq!(describe_failure("flashing", &cli), "Error flashing test.py to microbit");

        let cli = parse(&["-r", "foo.hex", "test.py", "D:\\"]);
        assert_eq!(
            describe_failure("flashing", &cli),
            "Error flashing test.py to [\"D:\\\\\"] with runtime foo.hex"
        );

        let cli = parse(&["-e", "test.hex"]);
        assert_eq!(describe_failure("extracting", &cli), "Error extracting test.hex");
    }

    #[test]
    fn test_run_extract_to_file() {
        let dir = TempDir::new().unwrap();
        let hex_path = dir.path().join("in.hex");
        let out_path = dir.path().join("out.py");
        fs::write(&hex_path, EMBEDDED).unwrap();

        run_extract(&[hex_path, out_path.clone()]).unwrap();
        assert_eq!(fs::read_to_string(&out_path).unwrap(), "print('hi!')\n");
    }

    #[test]
    fn test_run_extract_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(run_extract(&[dir.path().join("missing.hex")]).is_err());
    }

    #[test]
    fn test_flash_requires_runtime() {
        let cli = parse(&["foo.py"]);
        if std::env::var_os("MICROFLASH_RUNTIME").is_none() {
            let err = run_flash(&cli).unwrap_err();
            assert!(err.to_string().contains("runtime hex required"));
        }
    }

    #[test]
    fn test_content_hash() {
        let hash1 = content_hash("hello");
        let hash2 = content_hash("hello");
        let hash3 = content_hash("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }
}
