//! Mount operations module.
//!
//! Reads the kernel mount table, validates mount targets, and runs `mount`
//! and `umount`, turning their diagnostics into typed errors. ZFS and
//! device-existence preconditions are checked by the
//! [`DiskManager`](crate::DiskManager) before anything here is called.

use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::unistd::{AccessFlags, access};
use serde::Serialize;
use tracing::{debug, info};

use crate::disk::DiskIdentifier;
use crate::error::{Error, IoResultExt, Result};
use crate::executor::{CommandRunner, ExecutionContext};

/// One block-device entry of the mount table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedVolume {
    pub disk: DiskIdentifier,
    /// Device path as listed in the mount table (e.g., "/dev/sdb1").
    pub device: String,
    pub mount_point: PathBuf,
    pub fstype: String,
}

/// How to detach a mounted filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmountMode {
    #[default]
    Normal,
    /// `umount -f`: force, even if the filesystem is unreachable.
    Force,
    /// `umount -l`: detach now, clean up references later.
    Lazy,
}

/// Parses mount table content, keeping block-device sources only.
///
/// Mount points are kept as raw bytes: the kernel does not require them to
/// be UTF-8, and one such entry must not hide the others.
pub fn parse_mount_table(content: impl AsRef<[u8]>) -> Vec<MountedVolume> {
    content
        .as_ref()
        .split(|&b| b == b'\n')
        .filter_map(|line| {
            let mut parts = line
                .split(|b| b.is_ascii_whitespace())
                .filter(|field| !field.is_empty());
            let device = unescape_mount_field(parts.next()?);
            let mount_point = unescape_mount_field(parts.next()?);
            let fstype = parts
                .next()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .unwrap_or_default();

            if !device.starts_with(b"/dev/") {
                return None;
            }
            let device = String::from_utf8_lossy(&device).into_owned();
            Some(MountedVolume {
                disk: DiskIdentifier::from_device_path(&device),
                device,
                mount_point: PathBuf::from(OsStr::from_bytes(&mount_point)),
                fstype,
            })
        })
        .collect()
}

/// Reads and parses the mount table at `path`.
pub fn read_mount_table(path: &Path) -> Result<Vec<MountedVolume>> {
    let content = fs::read(path).mount_table_context(path)?;
    Ok(parse_mount_table(content))
}

/// Decodes octal escapes (`\040` for space) in a mount table field.
fn unescape_mount_field(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] == b'\\' {
            if let Some(byte) = input.get(i + 1..i + 4).and_then(octal_byte) {
                result.push(byte);
                i += 4;
                continue;
            }
        }
        result.push(input[i]);
        i += 1;
    }

    result
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    digits.iter().try_fold(0u8, |acc, &d| match d {
        b'0'..=b'7' => acc.checked_mul(8)?.checked_add(d - b'0'),
        _ => None,
    })
}

/// Resolves a mount point to the form the kernel lists it in.
pub fn normalize_mount_point(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Checks that `path` can receive a mount.
///
/// `check_access` verifies that the calling user may traverse the
/// directory; it is skipped when the mount itself runs escalated.
pub fn validate_mount_point(
    path: &Path,
    table: &[MountedVolume],
    check_access: bool,
) -> Result<PathBuf> {
    let invalid = |reason: &str| Error::InvalidMountPoint {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if path.as_os_str().is_empty() || !path.is_absolute() {
        return Err(invalid("mount point must be an absolute path"));
    }
    let metadata = fs::metadata(path).map_err(|e| invalid(&e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory"));
    }
    if check_access {
        access(path, AccessFlags::X_OK).map_err(|e| invalid(&e.desc().to_string()))?;
    }

    let target = normalize_mount_point(path);
    if let Some(existing) = table.iter().find(|v| v.mount_point == target) {
        return Err(invalid(&format!("{} is already mounted there", existing.device)));
    }
    Ok(target)
}

/// Validates the filesystem argument; `None` means "let mount detect it".
pub fn validate_filesystem(filesystem: &str) -> Result<Option<&str>> {
    let fs = filesystem.trim();
    if fs.is_empty() || fs.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    let valid = fs
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));
    if !valid {
        return Err(Error::InvalidFilesystem { fs: fs.to_string() });
    }
    Ok(Some(fs))
}

/// Returns true if `filesystem` names ZFS, which is never mounted here.
pub fn is_zfs_filesystem(filesystem: &str) -> bool {
    matches!(
        filesystem.trim().to_ascii_lowercase().as_str(),
        "zfs" | "zfs_member"
    )
}

/// Mounts `device` at `mount_point` with the `mount` tool.
pub fn mount_device<R: CommandRunner>(
    ctx: &ExecutionContext<R>,
    tool: &str,
    device: &str,
    mount_point: &Path,
    fstype: Option<&str>,
) -> Result<()> {
    let target = path_arg(mount_point)?;
    let mut args = Vec::with_capacity(4);
    if let Some(fstype) = fstype {
        args.extend(["-t", fstype]);
    }
    args.extend([device, target]);

    info!(device, mount_point = %mount_point.display(), ?fstype, "mounting volume");
    let output = ctx.run_privileged(tool, &args)?;
    if output.success() {
        return Ok(());
    }

    let stderr = output.stderr_lossy();
    debug!(device, %stderr, "mount failed");
    Err(classify_mount_failure(device, mount_point, stderr))
}

/// Unmounts whatever is mounted at `mount_point`.
pub fn unmount<R: CommandRunner>(
    ctx: &ExecutionContext<R>,
    tool: &str,
    mount_point: &Path,
    mode: UnmountMode,
) -> Result<()> {
    let target = path_arg(mount_point)?;
    let args: Vec<&str> = match mode {
        UnmountMode::Normal => vec![target],
        UnmountMode::Force => vec!["-f", target],
        UnmountMode::Lazy => vec!["-l", target],
    };

    info!(mount_point = %mount_point.display(), ?mode, "unmounting volume");
    let output = ctx.run_privileged(tool, &args)?;
    if output.success() {
        return Ok(());
    }

    Err(classify_unmount_failure(mount_point, output.stderr_lossy()))
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| Error::InvalidMountPoint {
        path: path.to_path_buf(),
        reason: "path is not valid UTF-8".to_string(),
    })
}

/// Maps `mount` diagnostics onto error variants.
fn classify_mount_failure(device: &str, mount_point: &Path, stderr: String) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("already mounted") {
        return Error::AlreadyMounted {
            device: device.to_string(),
            mount_point: mount_point.to_path_buf(),
        };
    }
    if lower.contains("mount point does not exist") || lower.contains("not a directory") {
        return Error::InvalidMountPoint {
            path: mount_point.to_path_buf(),
            reason: stderr,
        };
    }
    Error::MountFailed {
        device: device.to_string(),
        message: stderr,
    }
}

/// Maps `umount` diagnostics onto error variants.
fn classify_unmount_failure(mount_point: &Path, stderr: String) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("busy") {
        return Error::Busy {
            path: mount_point.to_path_buf(),
            message: stderr,
        };
    }
    if lower.contains("not mounted") {
        return Error::NotMounted {
            path: mount_point.to_path_buf(),
        };
    }
    Error::UnmountFailed {
        path: mount_point.to_path_buf(),
        message: stderr,
    }
}
