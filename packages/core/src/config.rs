//! Configuration for the disk manager.
//!
//! Holds the locations of the system tools and of the kernel mount table,
//! plus the privilege escalation used for mount and unmount.

use std::path::PathBuf;

use tracing::warn;

use crate::executor::PrivilegeEscalation;

/// Default location of the kernel mount table.
pub const MOUNTS_PATH: &str = "/proc/self/mounts";

const ENV_PREFIX: &str = "DISK_MANAGER_";

/// Program names (or absolute paths) of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub lsblk: String,
    pub blkid: String,
    pub mount: String,
    pub umount: String,
    pub zpool: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            lsblk: "lsblk".to_string(),
            blkid: "blkid".to_string(),
            mount: "mount".to_string(),
            umount: "umount".to_string(),
            zpool: "zpool".to_string(),
        }
    }
}

/// Configuration for a [`DiskManager`](crate::DiskManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskManagerConfig {
    pub tools: ToolPaths,
    /// Mount table to read. Defaults to [`MOUNTS_PATH`].
    pub mounts_path: PathBuf,
    /// Escalation applied to `mount` and `umount`.
    pub escalation: PrivilegeEscalation,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            mounts_path: PathBuf::from(MOUNTS_PATH),
            escalation: PrivilegeEscalation::None,
        }
    }
}

impl DiskManagerConfig {
    /// Creates a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from `DISK_MANAGER_*` environment variables.
    ///
    /// Recognized: `DISK_MANAGER_MOUNTS_PATH`, `DISK_MANAGER_ESCALATION`
    /// (`none`, `sudo`, `pkexec`) and `DISK_MANAGER_LSBLK`, `_BLKID`,
    /// `_MOUNT`, `_UMOUNT`, `_ZPOOL` tool overrides.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        let mut config = Self::default();
        if let Some(path) = var("MOUNTS_PATH") {
            config.mounts_path = PathBuf::from(path);
        }
        if let Some(value) = var("ESCALATION") {
            match value.parse() {
                Ok(escalation) => config.escalation = escalation,
                Err(message) => warn!("ignoring {ENV_PREFIX}ESCALATION: {message}"),
            }
        }

        let tools = &mut config.tools;
        for (name, slot) in [
            ("LSBLK", &mut tools.lsblk),
            ("BLKID", &mut tools.blkid),
            ("MOUNT", &mut tools.mount),
            ("UMOUNT", &mut tools.umount),
            ("ZPOOL", &mut tools.zpool),
        ] {
            if let Some(value) = var(name) {
                *slot = value;
            }
        }

        config
    }

    /// Sets the mount table path.
    pub fn with_mounts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_path = path.into();
        self
    }

    /// Sets the privilege escalation for mount and unmount.
    pub fn with_escalation(mut self, escalation: PrivilegeEscalation) -> Self {
        self.escalation = escalation;
        self
    }

    /// Replaces the tool locations.
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }
}
