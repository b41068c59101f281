//! Volume label resolution and sanitization.

use crate::disk::DiskInfo;
use crate::probe::ProbeOutcome;

/// Longest label that still fits in a single path component.
const MAX_NAME_BYTES: usize = 255;

/// Sanitize a volume name for display and for use as a path component.
///
/// Control characters are treated as whitespace, path separators become
/// underscores, whitespace runs collapse to one space, and leading dots and
/// surrounding whitespace are trimmed. Applying it twice gives the same
/// result as applying it once.
pub fn sanitize_volume_name(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    let mut pending_space = false;

    for c in name.chars() {
        if c.is_whitespace() || c.is_control() {
            pending_space = true;
            continue;
        }
        if pending_space {
            collapsed.push(' ');
            pending_space = false;
        }
        collapsed.push(match c {
            '/' | '\\' => '_',
            other => other,
        });
    }

    let trimmed = collapsed.trim_start_matches(|c: char| c == '.' || c == ' ');
    truncate_at_char_boundary(trimmed, MAX_NAME_BYTES)
        .trim_end()
        .to_string()
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Picks the label for a device: the on-disk label from the probe, falling
/// back to the udev-cached one. Empty when the device has no label.
pub fn resolve_label(probe: &ProbeOutcome, disk: &DiskInfo) -> String {
    probe
        .label()
        .map(sanitize_volume_name)
        .filter(|label| !label.is_empty())
        .or_else(|| disk.label.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::parse_lsblk_output;
    use std::collections::BTreeMap;

    #[test]
    fn test_sanitize_volume_name() {
        assert_eq!(sanitize_volume_name("My Games"), "My Games");
        assert_eq!(sanitize_volume_name("Game/Data"), "Game_Data");
        assert_eq!(sanitize_volume_name("C:\\Backup"), "C:_Backup");
        assert_eq!(sanitize_volume_name("  two \t\n  words  "), "two words");
        assert_eq!(sanitize_volume_name("bell\u{7}ring"), "bell ring");
        assert_eq!(sanitize_volume_name("../etc"), "_etc");
        assert_eq!(sanitize_volume_name(". .hidden"), "hidden");
        assert_eq!(sanitize_volume_name(""), "");
        assert_eq!(sanitize_volume_name("\u{0}\u{1f}"), "");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let sanitized = sanitize_volume_name(&long);
        assert!(sanitized.len() <= MAX_NAME_BYTES);
        assert_eq!(sanitized.chars().count(), 127);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            "",
            " ",
            "...",
            ". . x",
            "a/b\\c",
            "tab\there",
            "\u{3000}wide\u{3000}\u{3000}space",
            "line\r\nbreak",
            "trailing dot.",
            "NUL\u{0}inside",
            "\u{85}next-line",
        ];
        let long = format!("{} x", "a".repeat(254));

        for input in inputs.iter().copied().chain([long.as_str()]) {
            let once = sanitize_volume_name(input);
            assert_eq!(sanitize_volume_name(&once), once, "input: {input:?}");
            assert!(!once.contains('/'));
            assert!(!once.chars().any(char::is_control));
        }
    }

    #[test]
    fn test_resolve_label_prefers_probe() {
        let disks = parse_lsblk_output(
            br#"{"blockdevices": [{"name": "sdb1", "type": "part", "label": "Cached"}]}"#,
        )
        .unwrap();

        let mut attrs = BTreeMap::new();
        attrs.insert("LABEL".to_string(), "On/Disk".to_string());
        let probe = ProbeOutcome::Signature(attrs);
        assert_eq!(resolve_label(&probe, &disks[0]), "On_Disk");

        assert_eq!(resolve_label(&ProbeOutcome::Ambivalent, &disks[0]), "Cached");
    }

    #[test]
    fn test_resolve_label_empty_when_absent() {
        let disks =
            parse_lsblk_output(br#"{"blockdevices": [{"name": "sdc", "type": "disk"}]}"#)
                .unwrap();
        assert_eq!(resolve_label(&ProbeOutcome::NoSignature, &disks[0]), "");
    }
}
