//! Tools for reading a package.
//!
//! To start reading a package, create a [`PackReader`] from its bytes or its path.
//! The reader owns a single copy of the whole package;
//! every [`Entry`] it hands out borrows from that buffer,
//! so the borrow checker won't let one outlive the reader
//! or survive a reload.
//!
//! [`PackReader`]: struct.PackReader.html
//! [`Entry`]: struct.Entry.html

use std::fs;

use camino::Utf8Path;
use log::*;

use crate::arch::{checked_range, usize};
use crate::layout::{self, Header, TocEntry, TocHeader};
use crate::result::*;

/// Per-entry flags stored in the table of contents
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntryFlags(u64);

impl EntryFlags {
    /// No flags set: the entry was added from memory.
    pub const NONE: EntryFlags = EntryFlags(0);
    /// The entry was added from a file on disk.
    pub const FILE: EntryFlags = EntryFlags(1);

    pub const fn from_bits(bits: u64) -> Self {
        EntryFlags(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if all flags in `other` are set in `self`.
    pub const fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if the entry came from a file on disk.
    pub const fn is_file(self) -> bool {
        self.contains(EntryFlags::FILE)
    }
}

/// An entry in a package, borrowed from its [`PackReader`]
///
/// [`PackReader`]: struct.PackReader.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    /// The name it was stored under (usually a path)
    pub name: &'a str,
    /// The entry's contents
    pub content: &'a [u8],
    pub flags: EntryFlags,
}

impl Entry<'_> {
    /// Size of the entry's contents in bytes
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Validates a package buffer, returning its header and TOC header.
///
/// Checks that the header and table of contents are where they should be
/// (and carry their magic numbers), and that every TOC entry fits in the buffer.
/// Offsets inside individual TOC entries are checked on each lookup.
pub fn parse(buffer: &[u8]) -> PackResult<(Header, TocHeader)> {
    let header = Header::parse(buffer)?;
    trace!("{:?}", header);

    if header.version != layout::PACK_VERSION {
        if cfg!(feature = "check-version") {
            return Err(PackError::UnsupportedPackage(format!(
                "version {} (expected {})",
                header.version,
                layout::PACK_VERSION
            )));
        }
        warn!(
            "Package version {} isn't {}; reading it anyways",
            header.version,
            layout::PACK_VERSION
        );
    }
    if header.flags != layout::PACK_NO_FLAGS {
        warn!("Ignoring unknown package flags {:#x}", header.flags);
    }

    let toc_end = header
        .toc_offset
        .checked_add(layout::TOC_HEADER_SIZE as u64)
        .filter(|end| *end <= buffer.len() as u64)
        .ok_or_else(|| {
            PackError::InvalidPackage(format!(
                "toc position ({:#x} + {:#x}) outside bounds of package ({:#x})",
                header.toc_offset,
                layout::TOC_HEADER_SIZE,
                buffer.len()
            ))
        })?;
    let toc_start = usize(header.toc_offset)?;
    let toc = TocHeader::parse(&buffer[toc_start..usize(toc_end)?])?;
    trace!("{:?}", toc);

    let entries_size = toc
        .entry_count
        .checked_mul(layout::TOC_ENTRY_SIZE as u64)
        .ok_or_else(|| {
            PackError::InvalidPackage(format!("absurd entry count {}", toc.entry_count))
        })?;
    if checked_range(toc_end, entries_size, buffer.len(), "toc entries").is_err() {
        return Err(PackError::InvalidPackage(format!(
            "{} toc entries don't fit in package ({:#x} bytes)",
            toc.entry_count,
            buffer.len()
        )));
    }

    checked_range(
        header.names_offset,
        header.names_size,
        buffer.len(),
        "name table",
    )?;

    Ok((header, toc))
}

/// A package loaded into memory
#[derive(Debug, Clone)]
pub struct PackReader {
    /// The entire package
    buffer: Vec<u8>,
    /// Decoded from the front of `buffer`
    header: Header,
    /// Decoded from `buffer` at `header.toc_offset`
    entry_count: usize,
}

impl PackReader {
    /// Copies the given package bytes and validates them.
    pub fn from_bytes(bytes: &[u8]) -> PackResult<Self> {
        Self::from_vec(bytes.to_vec())
    }

    /// Takes ownership of the given package bytes and validates them.
    pub fn from_vec(buffer: Vec<u8>) -> PackResult<Self> {
        let (header, toc) = parse(&buffer)?;
        let entry_count = usize(toc.entry_count)?;
        debug!("Loaded package with {} entries", entry_count);
        Ok(Self {
            buffer,
            header,
            entry_count,
        })
    }

    /// Reads the entire package at `path` into memory and validates it.
    pub fn open<P: AsRef<Utf8Path>>(path: P) -> PackResult<Self> {
        let path = path.as_ref();
        info!("Reading package {}", path);
        let buffer = fs::read(path).map_err(PackError::file(path))?;
        Self::from_vec(buffer)
    }

    /// Replaces the loaded package with a copy of `bytes`.
    ///
    /// If the new package is invalid, the old one stays loaded.
    pub fn load(&mut self, bytes: &[u8]) -> PackResult<()> {
        *self = Self::from_bytes(bytes)?;
        Ok(())
    }

    /// Replaces the loaded package with `buffer`.
    ///
    /// If the new package is invalid, the old one stays loaded.
    pub fn load_vec(&mut self, buffer: Vec<u8>) -> PackResult<()> {
        *self = Self::from_vec(buffer)?;
        Ok(())
    }

    /// Replaces the loaded package with the one at `path`.
    ///
    /// If the new package can't be read or is invalid, the old one stays loaded.
    pub fn load_from_path<P: AsRef<Utf8Path>>(&mut self, path: P) -> PackResult<()> {
        *self = Self::open(path)?;
        Ok(())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The number of entries in the table of contents
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// The whole package, as loaded
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Reads the `n`th record from the table of contents.
    fn toc_entry(&self, n: usize) -> PackResult<TocEntry> {
        if n >= self.entry_count {
            return Err(PackError::IndexOutOfRange {
                index: n,
                count: self.entry_count,
            });
        }
        // parse() made sure the whole table fits.
        let start = usize(self.header.toc_offset)?
            + layout::TOC_HEADER_SIZE
            + n * layout::TOC_ENTRY_SIZE;
        let toc_entry = TocEntry::parse(&self.buffer[start..start + layout::TOC_ENTRY_SIZE]);
        trace!("{:?}", toc_entry);
        Ok(toc_entry)
    }

    /// Returns the NUL-terminated name starting at `name_offset`,
    /// which must be inside the name table.
    fn name_at(&self, name_offset: u64) -> PackResult<&[u8]> {
        let names = checked_range(
            self.header.names_offset,
            self.header.names_size,
            self.buffer.len(),
            "name table",
        )?;
        let names_end = names.end as u64;
        if name_offset < self.header.names_offset || name_offset >= names_end {
            return Err(PackError::OutOfBounds(format!(
                "name offset {:#x} outside name table ({:#x}..{:#x})",
                name_offset, self.header.names_offset, names_end
            )));
        }
        let tail = &self.buffer[usize(name_offset)?..names.end];
        let len = memchr::memchr(0, tail).ok_or_else(|| {
            PackError::OutOfBounds(format!(
                "name at {:#x} runs off the end of the name table",
                name_offset
            ))
        })?;
        Ok(&tail[..len])
    }

    fn entry_from_toc(&self, toc_entry: &TocEntry) -> PackResult<Entry<'_>> {
        let name = std::str::from_utf8(self.name_at(toc_entry.name_offset)?)?;
        let content = checked_range(
            toc_entry.offset,
            toc_entry.size,
            self.buffer.len(),
            "entry content",
        )?;
        Ok(Entry {
            name,
            content: &self.buffer[content],
            flags: EntryFlags::from_bits(toc_entry.flags),
        })
    }

    /// Gets the `n`th entry in the package.
    pub fn entry(&self, n: usize) -> PackResult<Entry<'_>> {
        let toc_entry = self.toc_entry(n)?;
        self.entry_from_toc(&toc_entry)
    }

    /// Returns just the name of the `n`th entry.
    pub fn entry_name(&self, n: usize) -> PackResult<&str> {
        let toc_entry = self.toc_entry(n)?;
        Ok(std::str::from_utf8(self.name_at(toc_entry.name_offset)?)?)
    }

    /// Gets the first entry (in storage order) named exactly `name`.
    ///
    /// Names are compared in full, so `"abc"` won't find an entry named `"abcd"`.
    /// Entries are checked in order, so a corrupt name (out of bounds or
    /// not UTF-8) on any entry before the match fails the whole lookup.
    pub fn entry_by_name(&self, name: &str) -> PackResult<Entry<'_>> {
        for n in 0..self.entry_count {
            let toc_entry = self.toc_entry(n)?;
            if self.name_at(toc_entry.name_offset)? == name.as_bytes() {
                debug!("Found {} at index {}", name, n);
                return self.entry_from_toc(&toc_entry);
            }
        }
        Err(PackError::NoSuchEntry(name.to_owned()))
    }

    /// Returns an iterator over every entry in the package, in storage order.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            reader: self,
            next: 0,
        }
    }
}

/// Iterates over all entries in a [`PackReader`]
///
/// [`PackReader`]: struct.PackReader.html
pub struct Entries<'a> {
    reader: &'a PackReader,
    next: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = PackResult<Entry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.entry_count {
            return None;
        }
        let entry = self.reader.entry(self.next);
        self.next += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.reader.entry_count - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Entries<'_> {}
