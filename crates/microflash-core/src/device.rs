//! Discovery of a mounted BBC micro:bit.
//!
//! The host platform is classified once into a [`Platform`]; each supported
//! platform has its own [`DeviceFinder`]:
//!
//! - POSIX hosts parse the output of `mount` for a volume named `MICROBIT`.
//! - Windows hosts probe drive roots for the `MICROBIT.HTM` file the
//!   micro:bit interface firmware exposes.

use crate::error::{Error, Result};
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, trace, warn};

/// Volume label of a mounted micro:bit
pub const VOLUME_NAME: &str = "MICROBIT";

/// File present in the root of a mounted micro:bit
pub const MARKER_FILE: &str = "MICROBIT.HTM";

/// Host platform families with a discovery strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    /// Linux, macOS and other Unix-likes
    Posix,
    /// Windows
    Windows,
    /// Anything else, by name
    Unsupported(String),
}

impl Platform {
    /// Classifies the running host
    pub fn current() -> Self {
        let family = std::env::consts::FAMILY;
        if family.is_empty() {
            Self::Unsupported(std::env::consts::OS.to_string())
        } else {
            Self::from_family(family)
        }
    }

    /// Classifies a platform family name (`unix`/`posix`, `windows`/`nt`)
    pub fn from_family(family: &str) -> Self {
        match family {
            "unix" | "posix" => Self::Posix,
            "windows" | "nt" => Self::Windows,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// Returns the discovery strategy for this platform
    pub fn finder(&self) -> Result<Box<dyn DeviceFinder>> {
        match self {
            Self::Posix => Ok(Box::new(MountTableFinder::default())),
            Self::Windows => Ok(Box::new(DriveLetterFinder::default())),
            Self::Unsupported(name) => Err(Error::unsupported_platform(name.clone())),
        }
    }
}

/// Strategy for locating a mounted device
pub trait DeviceFinder: Send + Sync + Debug {
    /// Returns the mount point of the first device found, if any
    fn find(&self) -> Result<Option<PathBuf>>;
}

/// Finds the device in the system mount table
#[derive(Debug, Clone)]
pub struct MountTableFinder {
    program: String,
}

impl Default for MountTableFinder {
    fn default() -> Self {
        Self::with_program("mount")
    }
}

impl MountTableFinder {
    /// Creates a finder that lists mounts with `program` instead of `mount`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Searches `mount` output for a volume whose mount point ends in
    /// [`VOLUME_NAME`]
    pub fn find_in(mount_output: &str) -> Option<PathBuf> {
        mount_output
            .lines()
            .filter_map(|line| line.split_whitespace().nth(2))
            .find(|volume| volume.ends_with(VOLUME_NAME))
            .map(PathBuf::from)
    }
}

impl DeviceFinder for MountTableFinder {
    fn find(&self) -> Result<Option<PathBuf>> {
        let output = Command::new(&self.program)
            .output()
            .map_err(|e| Error::command_failed(&self.program, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} failed ({}): {}", self.program, output.status, stderr.trim());
            return Err(Error::command_exited(
                &self.program,
                output.status.to_string(),
                stderr.trim(),
            ));
        }
        let table = String::from_utf8_lossy(&output.stdout);
        trace!("mount listed {} volumes", table.lines().count());

        let found = Self::find_in(&table);
        debug!("Mount table lookup: {:?}", found);
        Ok(found)
    }
}

/// Finds the device by probing drive roots
#[derive(Debug, Clone)]
pub struct DriveLetterFinder {
    roots: Vec<PathBuf>,
}

impl Default for DriveLetterFinder {
    fn default() -> Self {
        Self::new((b'A'..=b'Z').map(|letter| PathBuf::from(format!("{}:\\", letter as char))))
    }
}

impl DriveLetterFinder {
    /// Creates a finder probing the given roots in order
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }
}

impl DeviceFinder for DriveLetterFinder {
    fn find(&self) -> Result<Option<PathBuf>> {
        let found = self
            .roots
            .iter()
            .find(|root| root.join(MARKER_FILE).is_file())
            .cloned();
        debug!("Drive probe: {:?}", found);
        Ok(found)
    }
}

/// Locates a mounted micro:bit on the running host
pub fn find_microbit() -> Result<Option<PathBuf>> {
    Platform::current().finder()?.find()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MOUNT_EXISTS: &str = "\
sysfs on /sys type sysfs (rw,nosuid,nodev,noexec,relatime)
/dev/sda1 on / type ext4 (rw,relatime,errors=remount-ro,data=ordered)
/dev/sdb on /media/ntoll/MICROBIT type vfat (rw,nosuid,nodev,relatime,uid=1000)
";

    const MOUNT_MISSING: &str = "\
sysfs on /sys type sysfs (rw,nosuid,nodev,noexec,relatime)
/dev/sda1 on / type ext4 (rw,relatime,errors=remount-ro,data=ordered)
";

    #[test]
    fn test_mount_table_exists() {
        assert_eq!(
            MountTableFinder::find_in(MOUNT_EXISTS),
            Some(PathBuf::from("/media/ntoll/MICROBIT"))
        );
    }

    #[test]
    fn test_mount_table_missing() {
        assert_eq!(MountTableFinder::find_in(MOUNT_MISSING), None);
        assert_eq!(MountTableFinder::find_in(""), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_mount_command_failure() {
        let err = MountTableFinder::with_program("false").find().unwrap_err();
        assert!(matches!(err, Error::CommandExited { ref command, .. } if command == "false"));

        assert_eq!(MountTableFinder::with_program("true").find().unwrap(), None);
    }

    #[test]
    fn test_mount_command_missing() {
        let err = MountTableFinder::with_program("microflash-no-such-command")
            .find()
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[test]
    fn test_drive_probe() {
        let network = TempDir::new().unwrap();
        let removable = TempDir::new().unwrap();
        fs::write(removable.path().join(MARKER_FILE), "<html/>").unwrap();

        let finder = DriveLetterFinder::new(vec![
            network.path().to_path_buf(),
            removable.path().to_path_buf(),
        ]);
        assert_eq!(finder.find().unwrap(), Some(removable.path().to_path_buf()));
    }

    #[test]
    fn test_drive_probe_missing() {
        let empty = TempDir::new().unwrap();
        let finder = DriveLetterFinder::new(vec![empty.path().to_path_buf()]);
        assert_eq!(finder.find().unwrap(), None);
    }

    #[test]
    fn test_default_drive_roots() {
        let finder = DriveLetterFinder::default();
        assert_eq!(finder.roots.len(), 26);
        assert_eq!(finder.roots[0], PathBuf::from("A:\\"));
    }

    #[test]
    fn test_platform_classification() {
        assert_eq!(Platform::from_family("unix"), Platform::Posix);
        assert_eq!(Platform::from_family("nt"), Platform::Windows);
        assert_eq!(
            Platform::from_family("foo"),
            Platform::Unsupported("foo".to_string())
        );
    }

    #[test]
    fn test_unknown_os() {
        let err = Platform::from_family("foo").finder().unwrap_err();
        assert_eq!(err.to_string(), "OS \"foo\" not supported.");
    }
}
