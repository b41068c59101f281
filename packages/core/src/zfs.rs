//! ZFS pool inspection via `zpool`.
//!
//! Pool membership of a device is answered by the classifier; this module
//! turns `zpool list` output into typed summaries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::executor::CommandOutput;

/// Properties requested from `zpool list`, in column order.
pub const SUMMARY_PROPERTIES: &str = "name,size,alloc,free,cap,frag,dedup,health,altroot";

/// Arguments for a scripted, exact-value summary of `pool`.
pub fn summary_args(pool: &str) -> [&str; 6] {
    ["list", "-H", "-p", "-o", SUMMARY_PROPERTIES, pool]
}

/// Returns true if `name` is a legal pool name: a leading letter followed
/// by alphanumerics or `_ . : -`.
///
/// Anything else would either fail in zpool or be read as an option.
pub fn is_valid_pool_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

/// Arguments listing the names of all imported pools.
pub fn pool_names_args() -> [&'static str; 4] {
    ["list", "-H", "-o", "name"]
}

/// Pool health as reported by `zpool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PoolHealth {
    Online,
    Degraded,
    Faulted,
    Offline,
    Unavail,
    Removed,
    Suspended,
    Other(String),
}

impl FromStr for PoolHealth {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "ONLINE" => PoolHealth::Online,
            "DEGRADED" => PoolHealth::Degraded,
            "FAULTED" => PoolHealth::Faulted,
            "OFFLINE" => PoolHealth::Offline,
            "UNAVAIL" => PoolHealth::Unavail,
            "REMOVED" => PoolHealth::Removed,
            "SUSPENDED" => PoolHealth::Suspended,
            other => PoolHealth::Other(other.to_string()),
        })
    }
}

impl fmt::Display for PoolHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolHealth::Online => "ONLINE",
            PoolHealth::Degraded => "DEGRADED",
            PoolHealth::Faulted => "FAULTED",
            PoolHealth::Offline => "OFFLINE",
            PoolHealth::Unavail => "UNAVAIL",
            PoolHealth::Removed => "REMOVED",
            PoolHealth::Suspended => "SUSPENDED",
            PoolHealth::Other(other) => other,
        };
        f.write_str(s)
    }
}

/// Point-in-time pool metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZfsPoolSummary {
    pub name: String,
    /// Total size in bytes.
    pub size: u64,
    /// Allocated bytes.
    pub allocated: u64,
    /// Free bytes.
    pub free: u64,
    /// Percentage of capacity used.
    pub capacity_percent: u8,
    /// Free-space fragmentation, `None` when the pool does not report it.
    pub fragmentation_percent: Option<u8>,
    pub dedup_ratio: f64,
    pub health: PoolHealth,
    pub altroot: Option<String>,
}

impl ZfsPoolSummary {
    /// Renders the summary as metric name to value.
    pub fn metrics(&self) -> BTreeMap<String, String> {
        let mut metrics = BTreeMap::new();
        metrics.insert("name".to_string(), self.name.clone());
        metrics.insert("size".to_string(), self.size.to_string());
        metrics.insert("allocated".to_string(), self.allocated.to_string());
        metrics.insert("free".to_string(), self.free.to_string());
        metrics.insert("capacity".to_string(), self.capacity_percent.to_string());
        metrics.insert("dedup_ratio".to_string(), format!("{:.2}", self.dedup_ratio));
        metrics.insert("health".to_string(), self.health.to_string());
        if let Some(frag) = self.fragmentation_percent {
            metrics.insert("fragmentation".to_string(), frag.to_string());
        }
        if let Some(altroot) = &self.altroot {
            metrics.insert("altroot".to_string(), altroot.clone());
        }
        metrics
    }
}

/// Interprets the result of `zpool list ... <pool>`.
///
/// zpool reports "cannot open 'x': no such pool" for pools that are not
/// imported; any other failure keeps its diagnostic.
pub fn summary_from_output(pool: &str, output: &CommandOutput) -> Result<ZfsPoolSummary> {
    if !output.success() {
        let stderr = output.stderr_lossy();
        if stderr.contains("no such pool") {
            return Err(Error::PoolNotFound {
                pool: pool.to_string(),
            });
        }
        return Err(Error::CommandExit {
            command: "zpool list".to_string(),
            code: output.code.unwrap_or(-1),
            stderr,
        });
    }
    parse_pool_summary(&output.stdout_lossy())
}

/// Parses one tab-separated line of `zpool list -H -p` output.
pub fn parse_pool_summary(output: &str) -> Result<ZfsPoolSummary> {
    let line = output
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| malformed("empty output".to_string()))?;

    let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
    if cols.len() != 9 {
        return Err(malformed(format!("expected 9 columns, got {}", cols.len())));
    }

    Ok(ZfsPoolSummary {
        name: cols[0].to_string(),
        size: number(cols[1], "size")?,
        allocated: number(cols[2], "alloc")?,
        free: number(cols[3], "free")?,
        capacity_percent: number(cols[4], "cap")?,
        fragmentation_percent: optional(cols[5])
            .map(|v| number(v, "frag"))
            .transpose()?,
        dedup_ratio: cols[6]
            .trim_end_matches('x')
            .parse()
            .map_err(|_| malformed(format!("invalid dedup ratio '{}'", cols[6])))?,
        health: cols[7].parse().unwrap_or(PoolHealth::Other(cols[7].to_string())),
        altroot: optional(cols[8]).map(str::to_string),
    })
}

/// Parses `zpool list -H -o name` output.
///
/// Older zpool releases print "no pools available" instead of nothing.
pub fn parse_pool_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "no pools available")
        .map(str::to_string)
        .collect()
}

fn optional(value: &str) -> Option<&str> {
    match value {
        "" | "-" => None,
        v => Some(v),
    }
}

fn number<T: FromStr>(value: &str, column: &str) -> Result<T> {
    value
        .trim_end_matches('%')
        .parse()
        .map_err(|_| malformed(format!("invalid {column} value '{value}'")))
}

fn malformed(message: String) -> Error {
    Error::MalformedOutput {
        command: "zpool list".to_string(),
        message,
    }
}
