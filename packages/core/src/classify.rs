//! Filesystem classification.
//!
//! A device is classified from its on-disk signatures without mounting it.
//! The `blkid` probe is authoritative; when it reports several signatures the
//! raw [`signature`](crate::signature) scan breaks the tie, and when the
//! device cannot be read the udev-cached type from lsblk is used.

use std::fmt;
use std::fs::File;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::disk::DiskInfo;
use crate::error::{IoResultExt, Result};
use crate::probe::{ProbeOutcome, ZFS_MEMBER};
use crate::signature;

/// Filesystem found on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum FilesystemKind {
    /// No recognized signature.
    Unknown,
    /// Member of a ZFS pool; handled by pool import, never by mount.
    ZfsMember,
    /// Any other filesystem or container type (e.g. "ext4", "vfat", "swap").
    Conventional(String),
}

impl FilesystemKind {
    /// Maps a blkid/lsblk type string to a kind.
    pub fn from_type(fs_type: &str) -> Self {
        match fs_type.trim() {
            "" => FilesystemKind::Unknown,
            ZFS_MEMBER => FilesystemKind::ZfsMember,
            other => FilesystemKind::Conventional(other.to_string()),
        }
    }

    pub fn is_zfs_member(&self) -> bool {
        matches!(self, FilesystemKind::ZfsMember)
    }

    /// Concrete type name, `None` for unknown.
    pub fn name(&self) -> Option<&str> {
        match self {
            FilesystemKind::Unknown => None,
            FilesystemKind::ZfsMember => Some(ZFS_MEMBER),
            FilesystemKind::Conventional(name) => Some(name),
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("unknown"))
    }
}

/// Classifies a device from its probe result.
///
/// `raw_scan` is only consulted for ambivalent probes; it returns the
/// highest-precedence raw signature, or `None` if it could not decide.
pub fn classify(
    probe: &ProbeOutcome,
    disk: &DiskInfo,
    raw_scan: impl FnOnce() -> Option<&'static str>,
) -> FilesystemKind {
    let kind = match probe {
        ProbeOutcome::Signature(_) => probe
            .fs_type()
            .map(FilesystemKind::from_type)
            .unwrap_or(FilesystemKind::Unknown),
        ProbeOutcome::NoSignature => FilesystemKind::Unknown,
        ProbeOutcome::Ambivalent => match raw_scan() {
            Some(fs) => FilesystemKind::from_type(fs),
            None => udev_kind(disk),
        },
        ProbeOutcome::Unreadable(message) => {
            warn!(device = %disk.path.display(), %message, "probe failed, using udev data");
            udev_kind(disk)
        }
    };
    debug!(device = %disk.path.display(), %kind, "classified");
    kind
}

fn udev_kind(disk: &DiskInfo) -> FilesystemKind {
    disk.fstype
        .as_deref()
        .map(FilesystemKind::from_type)
        .unwrap_or(FilesystemKind::Unknown)
}

/// Opens the device node and returns its highest-precedence signature.
pub fn scan_device(path: &Path) -> Result<Option<&'static str>> {
    let mut file = File::open(path).device_read_context(path)?;
    signature::best_match(&mut file).device_read_context(path)
}
