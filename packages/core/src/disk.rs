//! Disk enumeration model and `lsblk` output parsing.
//!
//! [`parse_lsblk_output`] is a pure function from the raw bytes printed by
//! `lsblk --json --bytes` to typed [`DiskInfo`] records; spawning the tool is
//! left to the [`DiskManager`](crate::DiskManager).

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::label::sanitize_volume_name;

/// Columns requested from lsblk.
///
/// PATH is left out because util-linux releases before 2.33 reject it; the
/// device node is derived from NAME and TYPE instead.
pub const LSBLK_COLUMNS: &str =
    "NAME,TYPE,SIZE,TRAN,RM,ROTA,RO,MODEL,SERIAL,FSTYPE,LABEL,UUID,PARTUUID,MOUNTPOINT";

/// Arguments for a full `lsblk` enumeration.
pub fn lsblk_args() -> [&'static str; 4] {
    ["--json", "--bytes", "--output", LSBLK_COLUMNS]
}

/// Name of a block device as reported by the kernel (e.g. "sda1", "nvme0n1").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiskIdentifier(String);

impl DiskIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derives the identifier from a device path.
    ///
    /// `/dev/mapper/<name>` and `/dev/<name>` both yield `<name>`; a bare
    /// name is returned unchanged.
    pub fn from_device_path(path: &str) -> Self {
        let path = path.trim();
        let name = path
            .strip_prefix("/dev/mapper/")
            .or_else(|| path.strip_prefix("/dev/"))
            .unwrap_or(path);
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiskIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DiskIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DiskIdentifier {
    fn from(name: &str) -> Self {
        Self::from_device_path(name)
    }
}

/// Block device type as reported in lsblk's TYPE column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskKind {
    Disk,
    Part,
    Loop,
    Rom,
    Crypt,
    Lvm,
    Raid,
    Other(String),
}

impl From<&str> for DiskKind {
    fn from(value: &str) -> Self {
        match value {
            "disk" => DiskKind::Disk,
            "part" => DiskKind::Part,
            "loop" => DiskKind::Loop,
            "rom" => DiskKind::Rom,
            "crypt" => DiskKind::Crypt,
            "lvm" => DiskKind::Lvm,
            raid if raid.starts_with("raid") => DiskKind::Raid,
            other => DiskKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DiskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiskKind::Disk => "disk",
            DiskKind::Part => "part",
            DiskKind::Loop => "loop",
            DiskKind::Rom => "rom",
            DiskKind::Crypt => "crypt",
            DiskKind::Lvm => "lvm",
            DiskKind::Raid => "raid",
            DiskKind::Other(other) => other,
        };
        f.write_str(name)
    }
}

/// Metadata for one block device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskInfo {
    /// Device name (e.g., "nvme0n1p2", "sda1").
    pub name: DiskIdentifier,
    /// Full device path (e.g., "/dev/nvme0n1p2").
    pub path: PathBuf,
    pub kind: DiskKind,
    /// Size in bytes.
    pub size: u64,
    /// Transport protocol (e.g., "usb", "nvme", "sata").
    pub protocol: Option<String>,
    pub removable: bool,
    pub rotational: bool,
    pub read_only: bool,
    pub model: Option<String>,
    pub serial: Option<String>,
    /// Filesystem type as cached by udev (e.g., "ext4", "zfs_member").
    pub fstype: Option<String>,
    /// Sanitized volume label.
    pub label: Option<String>,
    pub uuid: Option<String>,
    pub partuuid: Option<String>,
    /// Parent device for partitions and mapped devices.
    pub parent: Option<DiskIdentifier>,
    /// Current mount point, if mounted.
    pub mount_point: Option<PathBuf>,
}

impl DiskInfo {
    /// Returns true if `device` names this disk, either by identifier or path.
    pub fn matches(&self, device: &str) -> bool {
        Path::new(device) == self.path || DiskIdentifier::from_device_path(device) == self.name
    }

    pub fn is_mounted(&self) -> bool {
        self.mount_point.is_some()
    }

    /// Renders the record as attribute name to value, omitting absent values.
    pub fn attributes(&self) -> BTreeMap<&'static str, String> {
        let mut attrs = BTreeMap::new();
        attrs.insert("name", self.name.to_string());
        attrs.insert("device_node", self.path.display().to_string());
        attrs.insert("kind", self.kind.to_string());
        attrs.insert("size", self.size.to_string());
        attrs.insert("removable", self.removable.to_string());
        attrs.insert("rotational", self.rotational.to_string());
        attrs.insert("read_only", self.read_only.to_string());

        let optional = [
            ("protocol", &self.protocol),
            ("model", &self.model),
            ("serial", &self.serial),
            ("filesystem", &self.fstype),
            ("volume_label", &self.label),
            ("uuid", &self.uuid),
            ("partuuid", &self.partuuid),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                attrs.insert(key, value.clone());
            }
        }
        if let Some(parent) = &self.parent {
            attrs.insert("parent", parent.to_string());
        }
        if let Some(mount_point) = &self.mount_point {
            attrs.insert("mount_point", mount_point.display().to_string());
        }
        attrs
    }
}

/// Raw JSON structure from lsblk output.
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(rename = "type", default)]
    device_type: Option<String>,
    #[serde(default)]
    size: Option<Flexible>,
    #[serde(default)]
    tran: Option<String>,
    #[serde(default)]
    rm: Option<Flexible>,
    #[serde(default)]
    rota: Option<Flexible>,
    #[serde(default)]
    ro: Option<Flexible>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    partuuid: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    children: Option<Vec<LsblkDevice>>,
}

/// lsblk prints numbers and flags as JSON values in util-linux >= 2.33 and
/// as strings before that.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flexible {
    Bool(bool),
    Number(u64),
    Text(String),
}

impl Flexible {
    fn as_u64(&self) -> Option<u64> {
        match self {
            Flexible::Bool(b) => Some(u64::from(*b)),
            Flexible::Number(n) => Some(*n),
            Flexible::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            Flexible::Bool(b) => *b,
            Flexible::Number(n) => *n != 0,
            Flexible::Text(s) => matches!(s.trim(), "1" | "true"),
        }
    }
}

/// Parses `lsblk --json --bytes` output into disk records.
///
/// Devices are flattened depth-first in the order lsblk reports them, each
/// disk followed by its partitions. A device with several parents (RAID
/// arrays, LVM volumes spanning disks) is listed by lsblk under each of
/// them; only its first occurrence is kept.
pub fn parse_lsblk_output(raw: &[u8]) -> Result<Vec<DiskInfo>> {
    let output: LsblkOutput =
        serde_json::from_slice(raw).map_err(|e| Error::MalformedOutput {
            command: "lsblk".to_string(),
            message: e.to_string(),
        })?;

    let mut disks = Vec::new();
    let mut seen = HashSet::new();
    collect_devices(&output.blockdevices, None, &mut seen, &mut disks);
    Ok(disks)
}

/// Recursively collect devices from lsblk output, including children.
fn collect_devices(
    lsblk_devices: &[LsblkDevice],
    parent: Option<&DiskIdentifier>,
    seen: &mut HashSet<DiskIdentifier>,
    disks: &mut Vec<DiskInfo>,
) {
    for dev in lsblk_devices {
        let info = to_disk_info(dev, parent);
        let name = info.name.clone();
        if !seen.insert(name.clone()) {
            continue;
        }
        disks.push(info);

        if let Some(children) = &dev.children {
            collect_devices(children, Some(&name), seen, disks);
        }
    }
}

fn to_disk_info(dev: &LsblkDevice, parent: Option<&DiskIdentifier>) -> DiskInfo {
    let kind = DiskKind::from(dev.device_type.as_deref().unwrap_or(""));
    let path = dev
        .path
        .clone()
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| device_node(&dev.name, &kind));

    DiskInfo {
        name: DiskIdentifier::new(dev.name.clone()),
        path,
        kind,
        size: dev.size.as_ref().and_then(Flexible::as_u64).unwrap_or(0),
        protocol: non_empty(&dev.tran),
        removable: dev.rm.as_ref().is_some_and(Flexible::as_bool),
        rotational: dev.rota.as_ref().is_some_and(Flexible::as_bool),
        read_only: dev.ro.as_ref().is_some_and(Flexible::as_bool),
        model: non_empty(&dev.model).map(|m| m.trim().to_string()),
        serial: non_empty(&dev.serial),
        fstype: non_empty(&dev.fstype),
        label: non_empty(&dev.label)
            .map(|l| sanitize_volume_name(&l))
            .filter(|l| !l.is_empty()),
        uuid: non_empty(&dev.uuid),
        partuuid: non_empty(&dev.partuuid),
        parent: parent.cloned(),
        mount_point: non_empty(&dev.mountpoint).map(PathBuf::from),
    }
}

/// Device node for a kernel name; device-mapper targets live under
/// `/dev/mapper`.
fn device_node(name: &str, kind: &DiskKind) -> PathBuf {
    match kind {
        DiskKind::Crypt | DiskKind::Lvm => Path::new("/dev/mapper").join(name),
        _ => Path::new("/dev").join(name),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LSBLK_JSON: &str = r#"{
        "blockdevices": [
            {
                "name": "nvme0n1", "path": "/dev/nvme0n1", "type": "disk",
                "size": 500107862016, "tran": "nvme", "rm": false, "rota": false,
                "ro": false, "model": "Samsung SSD 970 EVO Plus 500GB   ",
                "serial": "S4EVNX0N123456", "fstype": null, "label": null,
                "uuid": null, "partuuid": null, "mountpoint": null,
                "children": [
                    {
                        "name": "nvme0n1p1", "path": "/dev/nvme0n1p1", "type": "part",
                        "size": 536870912, "tran": null, "rm": false, "rota": false,
                        "ro": false, "fstype": "vfat", "label": "EFI",
                        "uuid": "1234-5678", "partuuid": "abcd-efgh",
                        "mountpoint": "/boot/efi"
                    },
                    {
                        "name": "nvme0n1p2", "path": "/dev/nvme0n1p2", "type": "part",
                        "size": 499570991104, "rm": false, "rota": false, "ro": false,
                        "fstype": "zfs_member", "label": "tank",
                        "uuid": "7421863389231142424", "mountpoint": null
                    }
                ]
            },
            {
                "name": "sda", "path": "/dev/sda", "type": "disk",
                "size": 128849018880, "tran": "usb", "rm": true, "rota": true, "ro": false,
                "children": [
                    {
                        "name": "sda1", "path": "/dev/sda1", "type": "part",
                        "size": 128849018880, "rm": true, "rota": true, "ro": false,
                        "fstype": "exfat", "label": "My/Photos\tDrive", "uuid": "DEAD-BEEF"
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_lsblk_json() {
        let disks = parse_lsblk_output(SAMPLE_LSBLK_JSON.as_bytes()).unwrap();

        let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["nvme0n1", "nvme0n1p1", "nvme0n1p2", "sda", "sda1"]);

        let nvme = &disks[0];
        assert_eq!(nvme.kind, DiskKind::Disk);
        assert_eq!(nvme.protocol.as_deref(), Some("nvme"));
        assert_eq!(nvme.model.as_deref(), Some("Samsung SSD 970 EVO Plus 500GB"));
        assert!(!nvme.removable);
        assert!(nvme.parent.is_none());

        let efi = &disks[1];
        assert_eq!(efi.kind, DiskKind::Part);
        assert_eq!(efi.parent, Some(DiskIdentifier::new("nvme0n1")));
        assert_eq!(efi.mount_point, Some(PathBuf::from("/boot/efi")));
        assert_eq!(efi.fstype.as_deref(), Some("vfat"));

        let usb = &disks[4];
        assert!(usb.removable);
        assert!(usb.rotational);
        assert_eq!(usb.label.as_deref(), Some("My_Photos Drive"));
        assert!(usb.partuuid.is_none());
        assert!(usb.mount_point.is_none());
    }

    #[test]
    fn test_parse_legacy_string_encoding() {
        let raw = r#"{"blockdevices": [
            {"name": "sdb", "type": "disk", "size": "8053063680", "rm": "1", "rota": "0", "ro": "0"}
        ]}"#;
        let disks = parse_lsblk_output(raw.as_bytes()).unwrap();

        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].size, 8_053_063_680);
        assert!(disks[0].removable);
        assert!(!disks[0].rotational);
        assert_eq!(disks[0].path, PathBuf::from("/dev/sdb"));
    }

    #[test]
    fn test_device_node_derived_from_name() {
        let raw = r#"{"blockdevices": [
            {"name": "sda", "type": "disk", "children": [
                {"name": "sda2", "type": "part", "children": [
                    {"name": "luks-3f2a", "type": "crypt", "children": [
                        {"name": "vg0-root", "type": "lvm"}
                    ]}
                ]}
            ]}
        ]}"#;
        let disks = parse_lsblk_output(raw.as_bytes()).unwrap();

        let paths: Vec<&Path> = disks.iter().map(|d| d.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("/dev/sda"),
                Path::new("/dev/sda2"),
                Path::new("/dev/mapper/luks-3f2a"),
                Path::new("/dev/mapper/vg0-root"),
            ]
        );
        assert!(disks[3].matches("/dev/mapper/vg0-root"));
    }

    #[test]
    fn test_raid_member_listed_once() {
        let raw = r#"{"blockdevices": [
            {"name": "sda", "type": "disk", "children": [
                {"name": "sda1", "type": "part", "fstype": "linux_raid_member", "children": [
                    {"name": "md0", "type": "raid1", "size": 1000, "fstype": "ext4"}
                ]}
            ]},
            {"name": "sdb", "type": "disk", "children": [
                {"name": "sdb1", "type": "part", "fstype": "linux_raid_member", "children": [
                    {"name": "md0", "type": "raid1", "size": 1000, "fstype": "ext4"}
                ]}
            ]}
        ]}"#;
        let disks = parse_lsblk_output(raw.as_bytes()).unwrap();

        let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda", "sda1", "md0", "sdb", "sdb1"]);

        let md0 = &disks[2];
        assert_eq!(md0.kind, DiskKind::Raid);
        assert_eq!(md0.parent, Some(DiskIdentifier::new("sda1")));
    }

    #[test]
    fn test_parse_truncated_output() {
        let raw = &SAMPLE_LSBLK_JSON.as_bytes()[..120];
        let err = parse_lsblk_output(raw).unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }));

        let err = parse_lsblk_output(br#"{"devices": []}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }));
    }

    #[test]
    fn test_parse_empty_device_list() {
        let disks = parse_lsblk_output(br#"{"blockdevices": []}"#).unwrap();
        assert!(disks.is_empty());
    }

    #[test]
    fn test_identifier_from_path() {
        assert_eq!(DiskIdentifier::from_device_path("/dev/sda1").as_str(), "sda1");
        assert_eq!(
            DiskIdentifier::from_device_path("/dev/mapper/vg-root").as_str(),
            "vg-root"
        );
        assert_eq!(DiskIdentifier::from_device_path("loop3").as_str(), "loop3");
    }

    #[test]
    fn test_attributes_omit_absent_values() {
        let disks = parse_lsblk_output(SAMPLE_LSBLK_JSON.as_bytes()).unwrap();
        let attrs = disks[1].attributes();

        assert_eq!(attrs.get("device_node").map(String::as_str), Some("/dev/nvme0n1p1"));
        assert_eq!(attrs.get("mount_point").map(String::as_str), Some("/boot/efi"));
        assert_eq!(attrs.get("volume_label").map(String::as_str), Some("EFI"));
        assert!(!attrs.contains_key("protocol"));
        assert!(!attrs.contains_key("serial"));
    }

    #[test]
    fn test_matches_by_name_or_path() {
        let disks = parse_lsblk_output(SAMPLE_LSBLK_JSON.as_bytes()).unwrap();
        let sda1 = &disks[4];
        assert!(sda1.matches("sda1"));
        assert!(sda1.matches("/dev/sda1"));
        assert!(!sda1.matches("/dev/sda"));
    }
}
