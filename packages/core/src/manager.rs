//! The disk manager facade.
//!
//! [`DiskManager`] is the entry point callers use. It holds only its
//! configuration and an execution context; every query re-reads live system
//! state, and nothing is cached between calls.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::classify::{self, FilesystemKind};
use crate::config::DiskManagerConfig;
use crate::disk::{self, DiskIdentifier, DiskInfo};
use crate::error::{Error, Result};
use crate::executor::{CommandRunner, ExecutionContext, PrivilegeEscalation, SystemRunner};
use crate::label;
use crate::mount::{self, MountedVolume, UnmountMode};
use crate::probe::{self, ProbeOutcome};
use crate::zfs::{self, ZfsPoolSummary};

/// Disk enumeration, classification and mount control.
///
/// # Example
///
/// ```no_run
/// use disk_manager_core::DiskManager;
///
/// let manager = DiskManager::new();
/// for name in manager.disk_names().unwrap() {
///     let info = manager.disk_info(name.as_str()).unwrap();
///     println!("{name}: {} bytes, mounted at {:?}", info.size, info.mount_point);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DiskManager<R = SystemRunner> {
    config: DiskManagerConfig,
    ctx: ExecutionContext<R>,
}

impl DiskManager<SystemRunner> {
    /// Creates a manager with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DiskManagerConfig::default())
    }

    /// Creates a manager configured from `DISK_MANAGER_*` variables.
    pub fn from_env() -> Self {
        Self::with_config(DiskManagerConfig::from_env())
    }

    pub fn with_config(config: DiskManagerConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl Default for DiskManager<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> DiskManager<R> {
    /// Creates a manager that runs every command through `runner`.
    pub fn with_runner(config: DiskManagerConfig, runner: R) -> Self {
        let ctx = ExecutionContext::new(runner).with_escalation(config.escalation);
        Self { config, ctx }
    }

    pub fn config(&self) -> &DiskManagerConfig {
        &self.config
    }

    /// Sanitizes a volume name. See [`label::sanitize_volume_name`].
    pub fn sanitize_volume_name(name: &str) -> String {
        label::sanitize_volume_name(name)
    }

    // --- Enumeration ---

    /// Lists all block devices, in the order the system reports them.
    pub fn disk_names(&self) -> Result<Vec<DiskIdentifier>> {
        Ok(self.enumerate()?.into_iter().map(|d| d.name).collect())
    }

    /// Returns metadata for every block device.
    pub fn all_disk_info(&self) -> Result<BTreeMap<DiskIdentifier, DiskInfo>> {
        Ok(self
            .list_disks()?
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect())
    }

    /// Returns metadata for one disk, by name ("sda1") or path ("/dev/sda1").
    pub fn disk_info(&self, name: &str) -> Result<DiskInfo> {
        let wanted = canonical_device(name);
        if wanted.is_empty() {
            return Err(Error::DiskNotFound {
                disk: name.to_string(),
            });
        }
        self.list_disks()?
            .into_iter()
            .find(|d| d.matches(&wanted))
            .ok_or_else(|| Error::DiskNotFound {
                disk: name.to_string(),
            })
    }

    /// Runs lsblk; mount points are left as lsblk reports them.
    fn enumerate(&self) -> Result<Vec<DiskInfo>> {
        let tool = &self.config.tools.lsblk;
        let output = self.ctx.run(tool, &disk::lsblk_args())?.check(tool)?;
        let disks = disk::parse_lsblk_output(&output.stdout)?;
        debug!(count = disks.len(), "enumerated disks");
        Ok(disks)
    }

    /// Enumerates disks with mount points taken from the mount table.
    fn list_disks(&self) -> Result<Vec<DiskInfo>> {
        let mut disks = self.enumerate()?;
        let table = self.mounted_volumes()?;
        for disk in &mut disks {
            disk.mount_point = table
                .iter()
                .find(|v| disk.matches(&v.device))
                .map(|v| v.mount_point.clone());
        }
        Ok(disks)
    }

    /// Resolves a device path to its enumerated disk.
    ///
    /// Only lsblk is consulted, so classification keeps working when the
    /// mount table cannot be read.
    fn resolve(&self, device: &str) -> Result<DiskInfo> {
        let wanted = canonical_device(device);
        let not_found = || Error::DeviceNotFound {
            device: device.to_string(),
        };
        if wanted.is_empty() {
            return Err(not_found());
        }
        self.enumerate()?
            .into_iter()
            .find(|d| d.matches(&wanted))
            .ok_or_else(not_found)
    }

    // --- Classification ---

    fn probe(&self, disk: &DiskInfo) -> Result<ProbeOutcome> {
        let path = disk.path.to_string_lossy();
        let output = self
            .ctx
            .run(&self.config.tools.blkid, &probe::blkid_args(&path))?;
        ProbeOutcome::from_output(&output)
    }

    fn classify_disk(&self, disk: &DiskInfo) -> Result<(FilesystemKind, ProbeOutcome)> {
        let probe = self.probe(disk)?;
        let kind = classify::classify(&probe, disk, || {
            match classify::scan_device(&disk.path) {
                Ok(fs) => fs,
                Err(e) => {
                    warn!(device = %disk.path.display(), error = %e, "raw signature scan failed");
                    None
                }
            }
        });
        Ok((kind, probe))
    }

    /// Returns true if the device is a member of a ZFS pool.
    pub fn is_zfs_device(&self, device: &str) -> Result<bool> {
        Ok(self.detect_filesystem(device)?.is_zfs_member())
    }

    /// Detects the filesystem on a device without mounting it.
    pub fn detect_filesystem(&self, device: &str) -> Result<FilesystemKind> {
        let disk = self.resolve(device)?;
        Ok(self.classify_disk(&disk)?.0)
    }

    /// Returns the sanitized volume label, or an empty string if none.
    pub fn volume_label(&self, device: &str) -> Result<String> {
        let disk = self.resolve(device)?;
        let probe = self.probe(&disk)?;
        Ok(label::resolve_label(&probe, &disk))
    }

    // --- Mount control ---

    /// Returns a fresh snapshot of mounted block devices.
    pub fn mounted_volumes(&self) -> Result<Vec<MountedVolume>> {
        mount::read_mount_table(&self.config.mounts_path)
    }

    /// Returns true if the device appears in the mount table.
    ///
    /// Empty or unknown paths are simply not mounted.
    pub fn is_mounted(&self, device: &str) -> bool {
        let wanted = canonical_device(device);
        if wanted.is_empty() {
            return false;
        }
        let id = DiskIdentifier::from_device_path(&wanted);
        match self.mounted_volumes() {
            Ok(table) => table.iter().any(|v| v.disk == id),
            Err(e) => {
                warn!(error = %e, "cannot read mount table");
                false
            }
        }
    }

    /// Mounts a non-ZFS volume.
    ///
    /// `filesystem` may be empty or "auto" to let `mount` detect the type.
    /// ZFS member devices, and a `filesystem` naming zfs, are refused with
    /// [`Error::ZfsMember`]. Remaining checks run in order: already
    /// mounted, mount point, filesystem string.
    pub fn mount_volume(
        &self,
        device: &str,
        mount_point: impl AsRef<Path>,
        filesystem: &str,
    ) -> Result<()> {
        let mount_point = mount_point.as_ref();
        let disk = self.resolve(device)?;

        let (kind, probe) = self.classify_disk(&disk)?;
        if kind.is_zfs_member() || mount::is_zfs_filesystem(filesystem) {
            return Err(Error::ZfsMember {
                device: device.to_string(),
                pool: kind
                    .is_zfs_member()
                    .then(|| pool_name(&probe, &disk))
                    .flatten(),
            });
        }

        // One snapshot serves both the device and the target checks.
        let table = self.mounted_volumes()?;
        if let Some(existing) = table.iter().find(|v| disk.matches(&v.device)) {
            return Err(Error::AlreadyMounted {
                device: device.to_string(),
                mount_point: existing.mount_point.clone(),
            });
        }

        let check_access = self.ctx.escalation() == PrivilegeEscalation::None;
        let target = mount::validate_mount_point(mount_point, &table, check_access)?;
        let fstype = mount::validate_filesystem(filesystem)?;

        mount::mount_device(
            &self.ctx,
            &self.config.tools.mount,
            &disk.path.to_string_lossy(),
            &target,
            fstype,
        )
    }

    /// Unmounts the volume mounted at `mount_point`.
    pub fn unmount_volume(&self, mount_point: impl AsRef<Path>) -> Result<()> {
        self.unmount_volume_with(mount_point, UnmountMode::Normal)
    }

    /// Unmounts with an explicit mode, e.g. forced after a [`Error::Busy`].
    pub fn unmount_volume_with(
        &self,
        mount_point: impl AsRef<Path>,
        mode: UnmountMode,
    ) -> Result<()> {
        let mount_point = mount_point.as_ref();
        let not_mounted = || Error::NotMounted {
            path: mount_point.to_path_buf(),
        };
        if mount_point.as_os_str().is_empty() {
            return Err(not_mounted());
        }

        let target = mount::normalize_mount_point(mount_point);
        let table = self.mounted_volumes()?;
        if !table.iter().any(|v| v.mount_point == target) {
            return Err(not_mounted());
        }

        mount::unmount(&self.ctx, &self.config.tools.umount, &target, mode)
    }

    // --- ZFS ---

    /// Returns the pool a device belongs to, `None` for non-ZFS devices.
    pub fn zfs_pool_name(&self, device: &str) -> Result<Option<String>> {
        let disk = self.resolve(device)?;
        let (kind, probe) = self.classify_disk(&disk)?;
        if !kind.is_zfs_member() {
            return Ok(None);
        }

        let pool = pool_name(&probe, &disk);
        if pool.is_none() {
            warn!(device, "ZFS member without a pool name");
        }
        Ok(pool)
    }

    /// Returns point-in-time metrics for an imported pool.
    pub fn zfs_pool_summary(&self, pool: &str) -> Result<ZfsPoolSummary> {
        let pool = pool.trim();
        if !zfs::is_valid_pool_name(pool) {
            return Err(Error::PoolNotFound {
                pool: pool.to_string(),
            });
        }
        let output = self
            .ctx
            .run(&self.config.tools.zpool, &zfs::summary_args(pool))?;
        zfs::summary_from_output(pool, &output)
    }

    /// Lists the names of all imported pools.
    pub fn zfs_pools(&self) -> Result<Vec<String>> {
        let tool = &self.config.tools.zpool;
        let output = self.ctx.run(tool, &zfs::pool_names_args())?.check(tool)?;
        Ok(zfs::parse_pool_names(&output.stdout_lossy()))
    }
}

/// Pool name of a ZFS member: the on-disk label, else the udev one.
fn pool_name(probe: &ProbeOutcome, disk: &DiskInfo) -> Option<String> {
    probe
        .label()
        .map(str::to_string)
        .or_else(|| disk.label.clone())
}

/// Trims a device argument and resolves udev symlinks under `/dev/disk/`.
fn canonical_device(device: &str) -> String {
    let device = device.trim();
    if device.starts_with("/dev/disk/") {
        if let Ok(path) = fs::canonicalize(device) {
            return path.to_string_lossy().into_owned();
        }
    }
    device.to_string()
}
