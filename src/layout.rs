//! The on-disk package layout.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`], [`write`], and [`load`] modules.
//!
//! A package looks like this, with every integer stored little-endian:
//!
//! ```text
//! [header
//!   4 bytes magic "pack"
//!   4 bytes version
//!   8 bytes flags
//!   8 bytes toc offset
//!   8 bytes name table offset
//!   8 bytes name table size
//! ]
//! [entry contents, each starting on an 8-byte boundary]
//! [name table
//!   arbitrary length names, each followed by \0
//! ]
//! [table of contents (aligned at 8 bytes)
//!   4 bytes toc magic "toc0"
//!   4 bytes padding
//!   8 bytes number of toc entries
//! ]
//! [toc entries
//!   8 bytes content offset
//!   8 bytes content size
//!   8 bytes name offset
//!   8 bytes flags
//! ]
//! ```
//!
//! All offsets are relative to the first byte of the header.
//!
//! [`read`]: ../read/index.html
//! [`write`]: ../write/index.html
//! [`load`]: ../load/index.html

use std::io::{self, Write};

use crate::result::*;

// Magic numbers denoting the two fixed sections of a package

/// Package header magic number
pub const HEADER_MAGIC: [u8; 4] = *b"pack";
/// Table of contents magic number
pub const TOC_MAGIC: [u8; 4] = *b"toc0";

/// The only format version written (and, with `check-version`, read).
pub const PACK_VERSION: u32 = 1;
/// Package-level flags. None are defined yet.
pub const PACK_NO_FLAGS: u64 = 0;

/// Every entry's contents, and the table of contents, start on a multiple of this.
pub const ALIGNMENT: u64 = 8;

pub const HEADER_SIZE: usize = 40;
pub const TOC_HEADER_SIZE: usize = 16;
pub const TOC_ENTRY_SIZE: usize = 32;

// Where the writer patches in offsets it only knows once it's done.
pub const TOC_OFFSET_FIELD: u64 = 16;
pub const NAMES_OFFSET_FIELD: u64 = 24;
pub const NAMES_SIZE_FIELD: u64 = 32;

// Straight from the Rust docs:

/// Reads a little-endian u64 from the front of the provided slice, shrinking it.
fn read_u64(input: &mut &[u8]) -> u64 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u64>());
    *input = rest;
    u64::from_le_bytes(int_bytes.try_into().expect("less than eight bytes for u64"))
}

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Package header
///
/// Always at the very start of the package,
/// and tells us where to find the name table and table of contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub flags: u64,
    pub toc_offset: u64,
    pub names_offset: u64,
    pub names_size: u64,
}

impl Header {
    /// A header for a fresh package, with the offsets zeroed
    /// until the writer knows them.
    pub fn placeholder() -> Self {
        Self {
            version: PACK_VERSION,
            flags: PACK_NO_FLAGS,
            toc_offset: 0,
            names_offset: 0,
            names_size: 0,
        }
    }

    pub fn parse(mut header: &[u8]) -> PackResult<Self> {
        if header.len() < HEADER_SIZE {
            return Err(PackError::InvalidPackage(format!(
                "package content ({:#x} bytes) smaller than header ({:#x} bytes)",
                header.len(),
                HEADER_SIZE
            )));
        }
        if header[..4] != HEADER_MAGIC {
            return Err(PackError::InvalidPackage(String::from(
                "invalid package magic number",
            )));
        }
        header = &header[4..];
        let version = read_u32(&mut header);
        let flags = read_u64(&mut header);
        let toc_offset = read_u64(&mut header);
        let names_offset = read_u64(&mut header);
        let names_size = read_u64(&mut header);

        Ok(Self {
            version,
            flags,
            toc_offset,
            names_offset,
            names_size,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&HEADER_MAGIC)?;
        out.write_all(&self.version.to_le_bytes())?;
        out.write_all(&self.flags.to_le_bytes())?;
        out.write_all(&self.toc_offset.to_le_bytes())?;
        out.write_all(&self.names_offset.to_le_bytes())?;
        out.write_all(&self.names_size.to_le_bytes())
    }
}

/// Table of contents header
///
/// Sits at `toc_offset` and is immediately followed by `entry_count` [`TocEntry`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocHeader {
    pub entry_count: u64,
}

impl TocHeader {
    pub fn parse(mut toc: &[u8]) -> PackResult<Self> {
        if toc.len() < TOC_HEADER_SIZE {
            return Err(PackError::InvalidPackage(String::from(
                "table of contents header truncated",
            )));
        }
        if toc[..4] != TOC_MAGIC {
            return Err(PackError::InvalidPackage(String::from(
                "invalid toc magic number",
            )));
        }
        // Skip the magic and the padding.
        toc = &toc[8..];
        let entry_count = read_u64(&mut toc);
        Ok(Self { entry_count })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&TOC_MAGIC)?;
        out.write_all(&0u32.to_le_bytes())?;
        out.write_all(&self.entry_count.to_le_bytes())
    }
}

/// One fixed-size record in the table of contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    pub offset: u64,
    pub size: u64,
    pub name_offset: u64,
    pub flags: u64,
}

impl TocEntry {
    /// Parses a TOC entry from exactly [`TOC_ENTRY_SIZE`] bytes.
    /// The caller has already made sure they're in the package.
    pub fn parse(mut entry: &[u8]) -> Self {
        debug_assert_eq!(entry.len(), TOC_ENTRY_SIZE);
        let offset = read_u64(&mut entry);
        let size = read_u64(&mut entry);
        let name_offset = read_u64(&mut entry);
        let flags = read_u64(&mut entry);
        Self {
            offset,
            size,
            name_offset,
            flags,
        }
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&self.offset.to_le_bytes())?;
        out.write_all(&self.size.to_le_bytes())?;
        out.write_all(&self.name_offset.to_le_bytes())?;
        out.write_all(&self.flags.to_le_bytes())
    }
}
