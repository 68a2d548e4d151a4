//! hexify - Turn MicroPython scripts into flashable .hex files
//!
//! Writes `<script>.hex` for every script given, either next to the script
//! or into a shared output directory. Never looks for a micro:bit.

use anyhow::{bail, Context, Result};
use clap::Parser;
use microflash_core::flash::load_runtime;
use microflash_core::{Error, FlashConfig, Flasher, LineMinifier, ScriptSource};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Create .hex files from MicroPython scripts on the local filesystem
///
/// Accepts multiple scripts and optionally one output directory. Each
/// output file is named after its script.
#[derive(Parser, Debug)]
#[command(name = "hexify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Python scripts to hexify
    sources: Vec<PathBuf>,

    /// Use the referenced MicroPython runtime .hex
    #[arg(short, long, env = "MICROFLASH_RUNTIME")]
    runtime: Option<PathBuf>,

    /// Directory to write the .hex files to (default: next to each script)
    #[arg(short, long)]
    outdir: Option<PathBuf>,

    /// Minify the source before hexifying
    #[arg(short, long)]
    minify: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

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

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let Some(ref runtime_path) = cli.runtime else {
        bail!(Error::MissingRuntime);
    };
    let runtime = load_runtime(runtime_path)?;
    debug!("Loaded runtime: {} bytes", runtime.len());

    let config = FlashConfig::new()
        .minify(cli.minify)
        .keep_name(true)
        .minifier(LineMinifier);
    let flasher = Flasher::with_config(runtime, config);

    for source in &cli.sources {
        let outdir = output_dir(source, cli.outdir.as_deref());
        let script = ScriptSource::Path(source.clone());
        let outcome = flasher
            .flash(Some(&script), std::slice::from_ref(&outdir))
            .with_context(|| {
                format!(
                    "Error hexifying {} into {}",
                    source.display(),
                    outdir.display()
                )
            })?;

        for path in &outcome.written {
            info!("Hexified {} as {}", source.display(), path.display());
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Directory a script's .hex lands in
fn output_dir(source: &Path, outdir: Option<&Path>) -> PathBuf {
    match outdir {
        Some(outdir) => outdir.to_path_buf(),
        None => match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use microflash_core::flash::extract_file;
    use std::fs;
    use tempfile::TempDir;

    const RUNTIME: &str = "\
:020000040000FA
:10000000000102030405060708090A0B0C0D0E0F78
:04000005000153EDB6
:00000001FF
";

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("hexify").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_one_arg() {
        let cli = parse(&["tests/example.py"]);
        assert_eq!(cli.sources, vec![PathBuf::from("tests/example.py")]);
        assert!(!cli.minify);
        assert_eq!(
            output_dir(&cli.sources[0], cli.outdir.as_deref()),
            PathBuf::from("tests")
        );
    }

    #[test]
    fn test_runtime_and_minify_args() {
        let cli = parse(&["tests/example.py", "-r", "tests/fake.hex", "-m"]);
        assert_eq!(cli.runtime, Some(PathBuf::from("tests/fake.hex")));
        assert!(cli.minify);
    }

    #[test]
    fn test_outdir_arg() {
        let cli = parse(&["tests/example.py", "-o", "/tmp"]);
        assert_eq!(
            output_dir(&cli.sources[0], cli.outdir.as_deref()),
            PathBuf::from("/tmp")
        );
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        assert_eq!(output_dir(Path::new("example.py"), None), PathBuf::from("."));
    }

    #[test]
    fn test_run_writes_hex_next_to_each_script() {
        let dir = TempDir::new().unwrap();
        let runtime = dir.path().join("runtime.hex");
        fs::write(&runtime, RUNTIME).unwrap();

        let first = dir.path().join("a");
        let second = dir.path().join("b");
        fs::create_dir(&first).unwrap();
        fs::create_dir(&second).unwrap();
        fs::write(first.join("one.py"), "print(1)\n").unwrap();
        fs::write(second.join("two.py"), "print(2)\n").unwrap();

        let cli = Cli {
            sources: vec![first.join("one.py"), second.join("two.py")],
            runtime: Some(runtime),
            outdir: None,
            minify: false,
            verbose: 0,
        };
        run(&cli).unwrap();

        assert_eq!(extract_file(&first.join("one.hex")).unwrap(), "print(1)\n");
        assert_eq!(extract_file(&second.join("two.hex")).unwrap(), "print(2)\n");
    }

    #[test]
    fn test_run_into_outdir() {
        let dir = TempDir::new().unwrap();
        let runtime = dir.path().join("runtime.hex");
        let outdir = dir.path().join("out");
        fs::write(&runtime, RUNTIME).unwrap();
        fs::create_dir(&outdir).unwrap();
        fs::write(dir.path().join("example.py"), "# hi\nprint(1)\n").unwrap();

        let cli = Cli {
            sources: vec![dir.path().join("example.py")],
            runtime: Some(runtime),
            outdir: Some(outdir.clone()),
            minify: true,
            verbose: 0,
        };
        run(&cli).unwrap();

        assert_eq!(extract_file(&outdir.join("example.hex")).unwrap(), "print(1)\n");
        assert!(!dir.path().join("example.hex").exists());
    }

    #[test]
    fn test_run_requires_runtime() {
        let cli = Cli {
            sources: vec![PathBuf::from("example.py")],
            runtime: None,
            outdir: None,
            minify: false,
            verbose: 0,
        };
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("runtime hex required"));
    }
}
