use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::*;
use memmap2::Mmap;
use rayon::prelude::*;

use packfile::layout::{self, Header, TocEntry, TocHeader};
use packfile::result::PackError;
use packfile::*;

const TEST_FILE_CONTENTS: &str = "This is a test file.\n";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn utf8_tempdir() -> Result<(tempfile::TempDir, Utf8PathBuf)> {
    let tempdir = tempfile::tempdir()?;
    let path = Utf8PathBuf::from_path_buf(tempdir.path().to_owned())
        .map_err(|p| anyhow::anyhow!("Temp dir {} isn't UTF-8", p.display()))?;
    Ok((tempdir, path))
}

fn write_test_file(dir: &Utf8Path) -> Result<Utf8PathBuf> {
    let path = dir.join("test_file.txt");
    fs::write(&path, TEST_FILE_CONTENTS)?;
    Ok(path)
}

fn pack(writer: &PackWriter) -> Result<PackReader> {
    let mut out = std::io::Cursor::new(Vec::new());
    writer.write_to(&mut out)?;
    Ok(PackReader::from_vec(out.into_inner())?)
}

/// Every TOC entry, decoded straight from the package bytes
fn raw_toc(bytes: &[u8]) -> Result<(Header, Vec<TocEntry>)> {
    let header = Header::parse(bytes)?;
    let toc_start = header.toc_offset as usize;
    let toc = TocHeader::parse(&bytes[toc_start..])?;
    let entries = (0..toc.entry_count as usize)
        .map(|i| {
            let at = toc_start + layout::TOC_HEADER_SIZE + i * layout::TOC_ENTRY_SIZE;
            TocEntry::parse(&bytes[at..at + layout::TOC_ENTRY_SIZE])
        })
        .collect();
    Ok((header, entries))
}

#[test]
fn writes_value_entries() -> Result<()> {
    init_logging();
    let (_tempdir, dir) = utf8_tempdir()?;
    let out_file = dir.join("tmp");

    let mut writer = PackWriter::new();
    writer.add_entry("num", 8u32.to_le_bytes());
    writer.write_to_path(&out_file)?;

    let reader = PackReader::open(&out_file)?;
    assert_eq!(reader.entry_count(), 1);

    let entry = reader.entry(0)?;
    assert_eq!(entry.name, "num");
    assert_eq!(entry.size(), 4);
    assert_eq!(entry.flags, EntryFlags::NONE);
    assert_eq!(u32::from_le_bytes(entry.content.try_into()?), 8);
    Ok(())
}

#[test]
#[allow(clippy::approx_constant)]
fn writes_value_entries2() -> Result<()> {
    init_logging();
    let mut writer = PackWriter::new();
    writer.add_entry("f", 3.14f32.to_le_bytes());
    writer.add_entry("name of abc", "abc");
    let reader = pack(&writer)?;

    assert_eq!(reader.entry_count(), 2);

    let entry = reader.entry(0)?;
    assert_eq!(entry.name, "f");
    assert_eq!(entry.size(), 4);
    assert_eq!(entry.flags, EntryFlags::NONE);
    assert_eq!(f32::from_le_bytes(entry.content.try_into()?), 3.14f32);

    let entry = reader.entry(1)?;
    assert_eq!(entry.name, "name of abc");
    assert_eq!(entry.size(), 3);
    assert_eq!(entry.flags, EntryFlags::NONE);
    assert_eq!(entry.content, b"abc");
    Ok(())
}

#[test]
fn writes_files() -> Result<()> {
    init_logging();
    let (_tempdir, dir) = utf8_tempdir()?;
    let test_file = write_test_file(&dir)?;

    for lazy in [true, false] {
        let mut writer = PackWriter::new();
        writer.add_file(&test_file, lazy)?;
        let reader = pack(&writer)?;

        assert_eq!(reader.entry_count(), 1);
        let entry = reader.entry(0)?;
        assert_eq!(entry.name, test_file.as_str());
        assert_eq!(entry.size(), 21);
        assert!(entry.flags.is_file());
        assert_eq!(entry.content, TEST_FILE_CONTENTS.as_bytes());
    }
    Ok(())
}

#[test]
fn round_trip_preserves_order() -> Result<()> {
    init_logging();
    let (_tempdir, dir) = utf8_tempdir()?;
    let test_file = write_test_file(&dir)?;
    let empty_file = dir.join("empty");
    fs::write(&empty_file, "")?;

    let mut writer = PackWriter::new();
    writer.add_entry("one byte", [1u8]);
    writer.add_file_as(&test_file, "lazy", true)?;
    writer.add_entry("", Vec::<u8>::new());
    writer.add_file_as(&test_file, "eager", false)?;
    writer.add_file_as(&empty_file, "empty file", true)?;
    writer.add_entry("seventeen", vec![0xabu8; 17]);
    writer.add_entry_with_flags("custom flags", "x", EntryFlags::from_bits(0b110));
    assert_eq!(writer.len(), 7);

    let reader = pack(&writer)?;
    let expected: Vec<(&str, &[u8], u64)> = vec![
        ("one byte", &[1u8][..], 0),
        ("lazy", TEST_FILE_CONTENTS.as_bytes(), 1),
        ("", &[][..], 0),
        ("eager", TEST_FILE_CONTENTS.as_bytes(), 1),
        ("empty file", &[][..], 1),
        ("seventeen", &[0xabu8; 17][..], 0),
        ("custom flags", &b"x"[..], 0b110),
    ];
    assert_eq!(reader.entry_count(), expected.len());
    for (entry, (name, content, flags)) in reader.entries().zip(&expected) {
        let entry = entry?;
        debug!("{:?}", entry);
        assert_eq!(entry.name, *name);
        assert_eq!(entry.content, *content);
        assert_eq!(entry.flags.bits(), *flags);
    }

    // Every region is where it should be, too.
    let bytes = reader.as_bytes();
    let (header, toc) = raw_toc(bytes)?;
    assert_eq!(header.version, layout::PACK_VERSION);
    assert_eq!(header.toc_offset % layout::ALIGNMENT, 0);
    assert_eq!(
        header.toc_offset as usize + layout::TOC_HEADER_SIZE + toc.len() * layout::TOC_ENTRY_SIZE,
        bytes.len(),
        "The table of contents should be the last thing in the package"
    );
    let names_end = header.names_offset + header.names_size;
    assert!(names_end <= header.toc_offset);
    let mut last_offset = 0;
    for entry in &toc {
        assert_eq!(entry.offset % layout::ALIGNMENT, 0);
        assert!(entry.offset >= layout::HEADER_SIZE as u64);
        assert!(entry.offset >= last_offset);
        assert!(entry.offset + entry.size <= header.names_offset);
        last_offset = entry.offset + entry.size;

        assert!(entry.name_offset >= header.names_offset);
        assert!(entry.name_offset < names_end);
        let name = &bytes[entry.name_offset as usize..names_end as usize];
        assert!(name.contains(&0), "Names should be NUL-terminated");
    }
    Ok(())
}

#[test]
fn truncation_is_rejected() -> Result<()> {
    init_logging();
    let mut writer = PackWriter::new();
    writer.add_entry("a", "some content");
    writer.add_entry("b", 12345u64.to_le_bytes());
    let reader = pack(&writer)?;
    let bytes = reader.as_bytes();

    for len in 0..bytes.len() {
        match PackReader::from_bytes(&bytes[..len]) {
            Err(PackError::InvalidPackage(_)) | Err(PackError::OutOfBounds(_)) => {}
            Err(other) => panic!("Got unexpected error truncating to {}: {:?}", len, other),
            Ok(_) => panic!("Package truncated to {} bytes loaded anyways", len),
        }
    }
    assert!(PackReader::from_bytes(bytes).is_ok());
    Ok(())
}

#[test]
fn duplicate_names_find_the_first() -> Result<()> {
    init_logging();
    let mut writer = PackWriter::new();
    writer.add_entry("dup", "first");
    writer.add_entry("other", "middle");
    writer.add_entry("dup", "second");
    let reader = pack(&writer)?;

    assert_eq!(reader.entry_count(), 3);
    assert_eq!(reader.entry_by_name("dup")?.content, b"first");
    assert_eq!(reader.entry(2)?.content, b"second");
    Ok(())
}

#[test]
fn names_must_match_exactly() -> Result<()> {
    init_logging();
    let mut writer = PackWriter::new();
    writer.add_entry("abcd", "long");
    writer.add_entry("abc", "short");
    let reader = pack(&writer)?;

    assert_eq!(reader.entry_by_name("abc")?.content, b"short");
    assert_eq!(reader.entry_by_name("abcd")?.content, b"long");
    for missing in ["ab", "abcde", ""] {
        match reader.entry_by_name(missing) {
            Err(PackError::NoSuchEntry(name)) => assert_eq!(name, missing),
            other => panic!("Expected no entry for {:?}, got {:?}", missing, other),
        }
    }
    Ok(())
}

#[test]
fn names_with_nul_are_rejected() -> Result<()> {
    init_logging();
    let mut writer = PackWriter::new();
    writer.add_entry("a\0b", "first");
    writer.add_entry("c", "second");

    let mut out = std::io::Cursor::new(Vec::new());
    match writer.write_to(&mut out) {
        Err(PackError::InvalidName(name)) => assert_eq!(name, "a\0b"),
        other => panic!("Expected a name with a NUL to be rejected, got {:?}", other),
    }

    let (_dir, dir_path) = utf8_tempdir()?;
    let pack_path = dir_path.join("nul.pack");
    assert!(matches!(
        writer.write_to_path(&pack_path),
        Err(PackError::InvalidName(_))
    ));

    // Without it, everything round trips.
    let mut writer = PackWriter::new();
    writer.add_entry("a", "first");
    writer.add_entry("c", "second");
    let reader = pack(&writer)?;
    assert_eq!(reader.entry_by_name("a")?.content, b"first");
    assert_eq!(reader.entry(1)?.name, "c");
    Ok(())
}

#[test]
fn lazy_files_are_read_at_write_time() -> Result<()> {
    init_logging();
    let (_tempdir, dir) = utf8_tempdir()?;
    let test_file = write_test_file(&dir)?;

    let mut writer = PackWriter::new();
    writer.add_file(&test_file, true)?;

    // Same size, different bytes
    fs::write(&test_file, "THIS IS A TEST FILE.\n")?;
    let reader = pack(&writer)?;
    assert_eq!(reader.entry(0)?.content, b"THIS IS A TEST FILE.\n");

    // Different size
    fs::write(&test_file, "shorter\n")?;
    match writer.write_to(&mut std::io::Cursor::new(Vec::new())) {
        Err(PackError::SizeMismatch {
            path,
            expected,
            actual,
        }) => {
            assert_eq!(path, test_file);
            assert_eq!(expected, 21);
            assert_eq!(actual, 8);
        }
        other => panic!("Expected a size mismatch, got {:?}", other),
    }

    // Gone entirely
    fs::remove_file(&test_file)?;
    match writer.write_to(&mut std::io::Cursor::new(Vec::new())) {
        Err(PackError::FileIo { path, .. }) => assert_eq!(path, test_file),
        other => panic!("Expected an I/O error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn write_at_offset() -> Result<()> {
    init_logging();
    let (_tempdir, dir) = utf8_tempdir()?;
    let out_path = dir.join("prefixed.bin");

    let prefix = b"some other file format's stuff";
    let mut out = File::create(&out_path)?;
    out.write_all(prefix)?;

    let mut writer = PackWriter::new();
    writer.add_entry("hello", "world");
    let written = writer.write_at(&mut out, prefix.len() as u64)?;
    assert_eq!(out.seek(SeekFrom::End(0))?, prefix.len() as u64 + written);
    drop(out);

    let bytes = fs::read(&out_path)?;
    assert_eq!(&bytes[..prefix.len()], prefix);
    // The package is self-contained, wherever it was written.
    let reader = PackReader::from_bytes(&bytes[prefix.len()..])?;
    assert_eq!(reader.entry_by_name("hello")?.content, b"world");
    Ok(())
}

#[test]
fn reload_replaces_package() -> Result<()> {
    init_logging();
    let (_tempdir, dir) = utf8_tempdir()?;
    let out_path = dir.join("second.pack");

    let mut first = PackWriter::new();
    first.add_entry("first", "1");
    let mut reader = pack(&first)?;
    assert_eq!(reader.entry(0)?.name, "first");

    let mut second = PackWriter::new();
    second.add_entry("second", "2");
    second.add_entry("third", "3");
    second.write_to_path(&out_path)?;

    reader.load_from_path(&out_path)?;
    assert_eq!(reader.entry_count(), 2);
    assert_eq!(reader.entry(0)?.name, "second");

    match reader.load_from_path(dir.join("nope")) {
        Err(PackError::FileIo { path, .. }) => assert_eq!(path, dir.join("nope")),
        other => panic!("Expected an I/O error, got {:?}", other),
    }
    assert_eq!(reader.entry_count(), 2);
    Ok(())
}

#[test]
fn read_memory_mapped_package() -> Result<()> {
    init_logging();
    let (_tempdir, dir) = utf8_tempdir()?;
    let out_path = dir.join("mapped.pack");

    let mut writer = PackWriter::new();
    for i in 0..32u32 {
        writer.add_entry(format!("entry {}", i), i.to_le_bytes());
    }
    writer.write_to_path(&out_path)?;

    info!("Memory mapping {}", out_path);
    let file = File::open(&out_path).context("Couldn't open package")?;
    let mapping = unsafe { Mmap::map(&file).context("Couldn't mmap package")? };
    let reader = PackReader::from_bytes(&mapping)?;
    drop(mapping);

    // Readers are Sync, so lookups can happen from any number of threads.
    (0..reader.entry_count())
        .into_par_iter()
        .try_for_each::<_, Result<()>>(|i| {
            let entry = reader.entry_by_name(&format!("entry {}", i))?;
            assert_eq!(u32::from_le_bytes(entry.content.try_into()?), i as u32);
            Ok(())
        })?;
    Ok(())
}
