//! disk-manager-core: disk introspection and mount control for Linux hosts.
//!
//! This library enumerates block devices, classifies their filesystems
//! (treating ZFS pool members specially), mounts and unmounts conventional
//! volumes, and summarizes imported ZFS pools. It wraps `lsblk`, `blkid`,
//! `mount`, `umount` and `zpool`, and reads the kernel mount table.
//!
//! # Modules
//!
//! - [`manager`]: The [`DiskManager`] facade, the entry point for callers
//! - [`disk`]: Disk records and `lsblk` JSON parsing
//! - [`probe`]: `blkid -p` signature probing
//! - [`classify`]: Filesystem classification
//! - [`signature`]: Raw on-disk signature scanning
//! - [`label`]: Volume label resolution and sanitization
//! - [`mount`]: Mount table parsing and mount/unmount operations
//! - [`zfs`]: ZFS pool summaries
//! - [`executor`]: Command execution and privilege escalation
//! - [`config`]: Tool locations and other settings
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use disk_manager_core::{DiskManager, FilesystemKind};
//!
//! let manager = DiskManager::new();
//!
//! for (name, info) in manager.all_disk_info().unwrap() {
//!     let kind = manager.detect_filesystem(name.as_str()).unwrap();
//!     if kind == FilesystemKind::ZfsMember {
//!         let pool = manager.zfs_pool_name(name.as_str()).unwrap();
//!         println!("{name}: member of {pool:?}");
//!     } else {
//!         println!("{name}: {kind}, {} bytes", info.size);
//!     }
//! }
//!
//! // This would mount a volume (requires root):
//! // manager.mount_volume("/dev/sdb1", "/mnt/usb", "exfat").unwrap();
//! ```

pub mod classify;
pub mod config;
pub mod disk;
pub mod error;
pub mod executor;
pub mod label;
pub mod manager;
pub mod mount;
pub mod probe;
pub mod signature;
pub mod zfs;

// Re-export commonly used types
pub use classify::FilesystemKind;
pub use config::DiskManagerConfig;
pub use disk::{DiskIdentifier, DiskInfo};
pub use error::{Error, Result};
pub use executor::{CommandOutput, CommandRunner, PrivilegeEscalation};
pub use label::sanitize_volume_name;
pub use manager::DiskManager;
pub use mount::{MountedVolume, UnmountMode};
pub use zfs::{PoolHealth, ZfsPoolSummary};
