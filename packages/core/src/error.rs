//! Unified error types for the disk-manager-core library.
//!
//! Uses SNAFU so each failure carries the device, mount point or pool it was
//! about, together with the diagnostic text reported by the system tool.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Failed to launch a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// A query command exited with a status this library does not interpret.
    #[snafu(display("command '{command}' exited with code {code}: {stderr}"))]
    CommandExit {
        command: String,
        code: i32,
        stderr: String,
    },

    /// System tool output could not be parsed at all.
    #[snafu(display("failed to parse {command} output: {message}"))]
    MalformedOutput { command: String, message: String },

    /// A device path does not resolve to a disk known to the system.
    #[snafu(display("device not found: '{device}'"))]
    DeviceNotFound { device: String },

    /// A disk identifier is not among the enumerated disks.
    #[snafu(display("disk not found: '{disk}'"))]
    DiskNotFound { disk: String },

    /// The device belongs to a ZFS pool and must be handled via pool import.
    #[snafu(display(
        "{device} is a ZFS member{} and cannot be mounted directly",
        pool.as_deref().map(|p| format!(" of pool '{p}'")).unwrap_or_default()
    ))]
    ZfsMember {
        device: String,
        pool: Option<String>,
    },

    /// The device is already mounted.
    #[snafu(display("{device} is already mounted at {}", mount_point.display()))]
    AlreadyMounted {
        device: String,
        mount_point: PathBuf,
    },

    /// The mount target cannot be used.
    #[snafu(display("invalid mount point {}: {reason}", path.display()))]
    InvalidMountPoint { path: PathBuf, reason: String },

    /// Invalid filesystem type.
    #[snafu(display("invalid filesystem type: {fs}"))]
    InvalidFilesystem { fs: String },

    /// Mount operation failed.
    #[snafu(display("failed to mount {device}: {message}"))]
    MountFailed { device: String, message: String },

    /// Nothing is mounted at the given path.
    #[snafu(display("nothing is mounted at {}", path.display()))]
    NotMounted { path: PathBuf },

    /// The volume has open references.
    #[snafu(display("{} is busy: {message}", path.display()))]
    Busy { path: PathBuf, message: String },

    /// Unmount operation failed.
    #[snafu(display("failed to unmount {}: {message}", path.display()))]
    UnmountFailed { path: PathBuf, message: String },

    /// The named pool is not imported.
    #[snafu(display("ZFS pool not found: '{pool}'"))]
    PoolNotFound { pool: String },

    /// Mount table cannot be read.
    #[snafu(display("failed to read mount table at {}", path.display()))]
    MountTableRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Raw device signature read failed.
    #[snafu(display("failed to read device {}", path.display()))]
    DeviceRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// User cancelled authentication dialog.
    #[snafu(display("authentication cancelled by user"))]
    AuthenticationCancelled,
}

impl Error {
    /// Returns true for errors meaning "the queried thing does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound { .. }
                | Error::DiskNotFound { .. }
                | Error::PoolNotFound { .. }
                | Error::NotMounted { .. }
        )
    }

    /// Returns true for transient failures a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for mount table read errors.
    fn mount_table_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for raw device read errors.
    fn device_read_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn mount_table_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountTableReadSnafu { path: path.into() })
    }

    fn device_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(DeviceReadSnafu { path: path.into() })
    }
}
