//! Low-level signature probing with `blkid -p`.
//!
//! `blkid -p -o export` reads the superblocks on the device itself instead of
//! the udev cache, and prints `KEY=value` lines. The exit status tells apart
//! "no signature", "several signatures" and "could not read the device".

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::CommandOutput;

/// blkid type reported for members of a ZFS pool.
pub const ZFS_MEMBER: &str = "zfs_member";

/// Result of probing one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A single signature was found; holds the exported attributes.
    Signature(BTreeMap<String, String>),
    /// The device carries no known signature.
    NoSignature,
    /// More than one signature was found.
    Ambivalent,
    /// The device could not be read (usually insufficient permissions).
    Unreadable(String),
}

impl ProbeOutcome {
    /// Interprets a finished `blkid -p -o export` invocation.
    pub fn from_output(output: &CommandOutput) -> Result<Self> {
        let stderr = output.stderr_lossy();
        let outcome = match output.code {
            Some(0) => ProbeOutcome::Signature(parse_export(&output.stdout)?),
            Some(2) if stderr.is_empty() => ProbeOutcome::NoSignature,
            Some(8) => ProbeOutcome::Ambivalent,
            _ => ProbeOutcome::Unreadable(stderr),
        };
        debug!(?outcome, "blkid probe");
        Ok(outcome)
    }

    /// Returns the value of an exported attribute, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            ProbeOutcome::Signature(attrs) => attrs.get(key).map(String::as_str),
            _ => None,
        }
    }

    /// Filesystem or container type, e.g. "ext4" or "zfs_member".
    pub fn fs_type(&self) -> Option<&str> {
        self.get("TYPE").filter(|t| !t.is_empty())
    }

    pub fn label(&self) -> Option<&str> {
        self.get("LABEL").filter(|l| !l.is_empty())
    }
}

/// Arguments for probing `device`.
pub fn blkid_args(device: &str) -> [&str; 4] {
    ["-p", "-o", "export", device]
}

/// Parses `blkid -o export` output into a key/value map.
///
/// Blank lines are skipped. Any other line without `=` means the output is
/// not in export format.
pub fn parse_export(raw: &[u8]) -> Result<BTreeMap<String, String>> {
    let text = String::from_utf8_lossy(raw);
    let mut attrs = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| Error::MalformedOutput {
            command: "blkid".to_string(),
            message: format!("expected KEY=value, got '{line}'"),
        })?;
        if key.is_empty() {
            return Err(Error::MalformedOutput {
                command: "blkid".to_string(),
                message: format!("empty key in '{line}'"),
            });
        }
        attrs.insert(key.to_string(), unescape_export_value(value));
    }

    Ok(attrs)
}

/// Removes the backslash escaping blkid applies to export values.
fn unescape_export_value(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
                continue;
            }
        }
        result.push(c);
    }

    result
}
