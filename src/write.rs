//! Tools for writing a package.
//!
//! Stage entries in a [`PackWriter`], then write them all out at once:
//!
//! ```no_run
//! # use packfile::*;
//! let mut writer = PackWriter::new();
//! writer.add_entry("greeting", "hello");
//! writer.add_entry("answer", 42u32.to_le_bytes());
//! writer.add_file("assets/logo.png", true)?;
//! writer.write_to_path("assets.pack")?;
//! # Ok::<(), packfile::result::PackError>(())
//! ```
//!
//! [`PackWriter`]: struct.PackWriter.html

use std::fs::{self, File};
use std::io::{self, prelude::*, BufWriter, SeekFrom};

use camino::{Utf8Path, Utf8PathBuf};
use log::*;

use crate::arch::padding_for;
use crate::layout::{self, Header, TocEntry, TocHeader};
use crate::read::EntryFlags;
use crate::result::*;

/// Where a staged entry's bytes come from
#[derive(Debug, Clone)]
enum Content {
    /// Already in memory
    Memory(Vec<u8>),
    /// Read from `path` at write time. `size` was measured when it was added.
    File { path: Utf8PathBuf, size: u64 },
}

#[derive(Debug, Clone)]
struct StagedEntry {
    name: String,
    flags: EntryFlags,
    content: Content,
}

impl StagedEntry {
    fn size(&self) -> u64 {
        match &self.content {
            Content::Memory(bytes) => bytes.len() as u64,
            Content::File { size, .. } => *size,
        }
    }
}

/// Collects entries and writes them out as a package
#[derive(Debug, Default, Clone)]
pub struct PackWriter {
    entries: Vec<StagedEntry>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of staged entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stages an in-memory entry.
    ///
    /// Anything that converts into a `Vec<u8>` works:
    /// strings, byte arrays (`42u32.to_le_bytes()`), vectors...
    pub fn add_entry<N, B>(&mut self, name: N, bytes: B)
    where
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        self.add_entry_with_flags(name, bytes, EntryFlags::NONE)
    }

    /// Stages an in-memory entry with the given TOC flags.
    pub fn add_entry_with_flags<N, B>(&mut self, name: N, bytes: B, flags: EntryFlags)
    where
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        let name = name.into();
        let bytes = bytes.into();
        debug!("Adding {} ({} bytes from memory)", name, bytes.len());
        self.entries.push(StagedEntry {
            name,
            flags,
            content: Content::Memory(bytes),
        });
    }

    /// Stages the file at `path`, naming the entry after the path.
    ///
    /// See [`add_file_as()`](#method.add_file_as).
    pub fn add_file<P: AsRef<Utf8Path>>(&mut self, path: P, lazy: bool) -> PackResult<()> {
        let path = path.as_ref();
        self.add_file_as(path, path.as_str(), lazy)
    }

    /// Stages the file at `path` under the given name.
    ///
    /// If `lazy`, only the file's size is recorded now,
    /// and its contents are read when the package is written.
    /// Otherwise the file is read into memory immediately.
    pub fn add_file_as<P, N>(&mut self, path: P, name: N, lazy: bool) -> PackResult<()>
    where
        P: AsRef<Utf8Path>,
        N: Into<String>,
    {
        let path = path.as_ref();
        let name = name.into();

        let content = if lazy {
            let size = fs::metadata(path).map_err(PackError::file(path))?.len();
            debug!("Adding {} ({} bytes, lazily from {})", name, size, path);
            Content::File {
                path: path.to_owned(),
                size,
            }
        } else {
            let bytes = fs::read(path).map_err(PackError::file(path))?;
            debug!("Adding {} ({} bytes from {})", name, bytes.len(), path);
            Content::Memory(bytes)
        };

        self.entries.push(StagedEntry {
            name,
            flags: EntryFlags::FILE,
            content,
        });
        Ok(())
    }

    /// Creates (or truncates) the file at `path` and writes the package to it.
    ///
    /// If writing fails partway through, the file is left as-is;
    /// cleaning it up is up to the caller.
    pub fn write_to_path<P: AsRef<Utf8Path>>(&self, path: P) -> PackResult<u64> {
        let path = path.as_ref();
        info!("Writing {} entries to {}", self.entries.len(), path);
        let file = File::create(path).map_err(PackError::file(path))?;
        let mut out = BufWriter::new(file);
        let written = self.write_to(&mut out).map_err(|e| match e {
            PackError::Io(source) => PackError::FileIo {
                path: path.to_owned(),
                source,
            },
            other => other,
        })?;
        out.flush().map_err(PackError::file(path))?;
        Ok(written)
    }

    /// Seeks `out` to `offset`, then writes the package there.
    pub fn write_at<W: Write + Seek>(&self, out: &mut W, offset: u64) -> PackResult<u64> {
        out.seek(SeekFrom::Start(offset))?;
        self.write_to(out)
    }

    /// Writes the package starting at the current position of `out`.
    ///
    /// All offsets in the package are relative to that position.
    /// Returns the number of bytes written.
    ///
    /// Names containing a NUL byte are rejected with
    /// [`PackError::InvalidName`] before anything is written.
    ///
    /// [`PackError::InvalidName`]: ../result/enum.PackError.html#variant.InvalidName
    pub fn write_to<W: Write + Seek>(&self, out: &mut W) -> PackResult<u64> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| memchr::memchr(0, e.name.as_bytes()).is_some())
        {
            return Err(PackError::InvalidName(entry.name.clone()));
        }

        let base = out.stream_position()?;
        // Position relative to the start of the package
        let mut pos = 0u64;

        // The header's offsets get patched in as we learn them.
        let mut header = Header::placeholder();
        header.write(out)?;
        pos += layout::HEADER_SIZE as u64;

        let mut content_offsets = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            content_offsets.push(pos);
            pos += write_content(out, entry)?;
            pos += pad(out, pos)?;
        }

        header.names_offset = pos;
        let mut name_offsets = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            name_offsets.push(pos);
            out.write_all(entry.name.as_bytes())?;
            out.write_all(&[0])?;
            pos += entry.name.len() as u64 + 1;
        }
        header.names_size = pos - header.names_offset;
        trace!(
            "Name table at {:#x}, {:#x} bytes",
            header.names_offset,
            header.names_size
        );
        patch_u64(out, base, layout::NAMES_OFFSET_FIELD, header.names_offset)?;
        patch_u64(out, base, layout::NAMES_SIZE_FIELD, header.names_size)?;
        out.seek(SeekFrom::Start(base + pos))?;

        pos += pad(out, pos)?;
        header.toc_offset = pos;
        trace!("Table of contents at {:#x}", header.toc_offset);
        patch_u64(out, base, layout::TOC_OFFSET_FIELD, header.toc_offset)?;
        out.seek(SeekFrom::Start(base + pos))?;

        TocHeader {
            entry_count: self.entries.len() as u64,
        }
        .write(out)?;
        pos += layout::TOC_HEADER_SIZE as u64;

        for ((entry, offset), name_offset) in self
            .entries
            .iter()
            .zip(content_offsets)
            .zip(name_offsets)
        {
            let toc_entry = TocEntry {
                offset,
                size: entry.size(),
                name_offset,
                flags: entry.flags.bits(),
            };
            trace!("{:?}", toc_entry);
            toc_entry.write(out)?;
            pos += layout::TOC_ENTRY_SIZE as u64;
        }

        debug!("Wrote {} entries in {} bytes", self.entries.len(), pos);
        Ok(pos)
    }
}

/// Writes an entry's contents, returning how many bytes that took.
fn write_content<W: Write>(out: &mut W, entry: &StagedEntry) -> PackResult<u64> {
    match &entry.content {
        Content::Memory(bytes) => {
            out.write_all(bytes)?;
            Ok(bytes.len() as u64)
        }
        Content::File { path, size } => {
            // Lazy file: read the whole thing into memory, then write that.
            let bytes = fs::read(path).map_err(PackError::file(path.as_path()))?;
            let actual = bytes.len() as u64;
            if actual != *size {
                return Err(PackError::SizeMismatch {
                    path: path.clone(),
                    expected: *size,
                    actual,
                });
            }
            out.write_all(&bytes)?;
            Ok(actual)
        }
    }
}

/// Writes zeroes until `pos` is aligned, returning how many were written.
fn pad<W: Write>(out: &mut W, pos: u64) -> io::Result<u64> {
    const ZEROES: [u8; layout::ALIGNMENT as usize] = [0; layout::ALIGNMENT as usize];
    let padding = padding_for(pos, layout::ALIGNMENT);
    out.write_all(&ZEROES[..padding as usize])?;
    Ok(padding)
}

/// Overwrites one of the header's u64 fields.
/// Leaves the stream wherever the write ended.
fn patch_u64<W: Write + Seek>(out: &mut W, base: u64, field: u64, value: u64) -> io::Result<()> {
    out.seek(SeekFrom::Start(base + field))?;
    out.write_all(&value.to_le_bytes())
}
