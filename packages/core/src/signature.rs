//! On-disk signature scanning.
//!
//! Used when `blkid` reports several signatures on one device. [`scan`]
//! returns every match in precedence order, so the first entry is the
//! classification: ZFS labels first, then long magics at fixed superblock
//! offsets, FAT boot-sector heuristics last.

use std::io::{self, Read, Seek, SeekFrom};

use crate::probe::ZFS_MEMBER;

/// ZFS uberblock magic ("oo-ba-bloc").
const UBERBLOCK_MAGIC: u64 = 0x00ba_b10c;
/// Uberblock ring inside vdev label 0.
const UBERBLOCK_RING_OFFSET: u64 = 128 * 1024;
const UBERBLOCK_RING_SIZE: usize = 128 * 1024;
const UBERBLOCK_SLOT_SIZE: usize = 1024;

const EXT_SUPERBLOCK_OFFSET: u64 = 1024;
const EXT_MAGIC: u16 = 0xEF53;
const EXT3_FEATURE_COMPAT_HAS_JOURNAL: u32 = 0x0004;
const EXT4_FEATURE_INCOMPAT_EXTENTS: u32 = 0x0040;
const EXT4_FEATURE_INCOMPAT_64BIT: u32 = 0x0080;
const EXT4_FEATURE_INCOMPAT_FLEX_BG: u32 = 0x0200;

struct Magic {
    fs: &'static str,
    offset: u64,
    bytes: &'static [u8],
}

/// Fixed-offset magics, most specific first.
const MAGICS: &[Magic] = &[
    Magic { fs: "btrfs", offset: 65536 + 64, bytes: b"_BHRfS_M" },
    Magic { fs: "xfs", offset: 0, bytes: b"XFSB" },
];

/// Magics checked after ext, which needs feature decoding.
const LATE_MAGICS: &[Magic] = &[
    Magic { fs: "iso9660", offset: 32769, bytes: b"CD001" },
    Magic { fs: "ntfs", offset: 3, bytes: b"NTFS    " },
    Magic { fs: "exfat", offset: 3, bytes: b"EXFAT   " },
    Magic { fs: "hfsplus", offset: 1024, bytes: b"H+" },
    Magic { fs: "hfsplus", offset: 1024, bytes: b"HX" },
    Magic { fs: "apfs", offset: 32, bytes: b"NXSB" },
    Magic { fs: "swap", offset: 4086, bytes: b"SWAPSPACE2" },
    Magic { fs: "swap", offset: 4086, bytes: b"SWAP-SPACE" },
];

/// Returns every recognized signature on the device, in precedence order.
pub fn scan<R: Read + Seek>(reader: &mut R) -> io::Result<Vec<&'static str>> {
    let mut found = Vec::new();
    let mut push = |fs: &'static str| {
        if !found.contains(&fs) {
            found.push(fs);
        }
    };

    if has_uberblock(reader)? {
        push(ZFS_MEMBER);
    }
    for magic in MAGICS {
        if matches_magic(reader, magic)? {
            push(magic.fs);
        }
    }
    if let Some(ext) = ext_variant(reader)? {
        push(ext);
    }
    for magic in LATE_MAGICS {
        if matches_magic(reader, magic)? {
            push(magic.fs);
        }
    }
    if is_fat(reader)? {
        push("vfat");
    }

    Ok(found)
}

/// Returns the highest-precedence signature, if any.
pub fn best_match<R: Read + Seek>(reader: &mut R) -> io::Result<Option<&'static str>> {
    Ok(scan(reader)?.into_iter().next())
}

/// Reads `len` bytes at `offset`, or `None` if the device is too small.
fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, len: usize) -> io::Result<Option<Vec<u8>>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

fn matches_magic<R: Read + Seek>(reader: &mut R, magic: &Magic) -> io::Result<bool> {
    Ok(read_at(reader, magic.offset, magic.bytes.len())?
        .is_some_and(|buf| buf == magic.bytes))
}

fn has_uberblock<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let Some(ring) = read_at(reader, UBERBLOCK_RING_OFFSET, UBERBLOCK_RING_SIZE)? else {
        return Ok(false);
    };

    Ok(ring.chunks_exact(UBERBLOCK_SLOT_SIZE).any(|slot| {
        let mut word = [0u8; 8];
        word.copy_from_slice(&slot[..8]);
        u64::from_le_bytes(word) == UBERBLOCK_MAGIC || u64::from_be_bytes(word) == UBERBLOCK_MAGIC
    }))
}

fn ext_variant<R: Read + Seek>(reader: &mut R) -> io::Result<Option<&'static str>> {
    let Some(sb) = read_at(reader, EXT_SUPERBLOCK_OFFSET, 1024)? else {
        return Ok(None);
    };

    let le_u32 = |at: usize| u32::from_le_bytes([sb[at], sb[at + 1], sb[at + 2], sb[at + 3]]);
    if u16::from_le_bytes([sb[0x38], sb[0x39]]) != EXT_MAGIC {
        return Ok(None);
    }

    let compat = le_u32(0x5C);
    let incompat = le_u32(0x60);
    let ext4_flags =
        EXT4_FEATURE_INCOMPAT_EXTENTS | EXT4_FEATURE_INCOMPAT_64BIT | EXT4_FEATURE_INCOMPAT_FLEX_BG;

    let variant = if incompat & ext4_flags != 0 {
        "ext4"
    } else if compat & EXT3_FEATURE_COMPAT_HAS_JOURNAL != 0 {
        "ext3"
    } else {
        "ext2"
    };
    Ok(Some(variant))
}

fn is_fat<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let Some(boot) = read_at(reader, 0, 512)? else {
        return Ok(false);
    };
    if boot[510..512] != [0x55, 0xAA] {
        return Ok(false);
    }
    Ok(&boot[82..90] == b"FAT32   " || &boot[54..59] == b"FAT12" || &boot[54..59] == b"FAT16")
}
