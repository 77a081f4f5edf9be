//! One way to load entries, whether they're packed or not.
//!
//! A [`PackLoader`] serves entries by index either from a package
//! (see [`PackReader`]) or from a list of loose files under a base directory.
//! The latter is handy during development: edit a file and the next
//! lookup picks up the change, no repacking required.
//!
//! ```no_run
//! # use packfile::*;
//! let source = if cfg!(debug_assertions) {
//!     PackSource::Files {
//!         names: vec!["shaders/main.glsl".into(), "textures/grass.png".into()],
//!         base_dir: "assets".into(),
//!     }
//! } else {
//!     PackSource::Package("assets.pack".into())
//! };
//! let mut loader = PackLoader::open(source)?;
//! let shader = loader.entry(0)?;
//! println!("{} is {} bytes", shader.name, shader.data.len());
//! # Ok::<(), packfile::result::PackError>(())
//! ```
//!
//! [`PackLoader`]: struct.PackLoader.html
//! [`PackReader`]: ../read/struct.PackReader.html

use std::fs;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use log::*;

use crate::read::PackReader;
use crate::result::*;

/// Where a [`PackLoader`] gets its entries
///
/// [`PackLoader`]: struct.PackLoader.html
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackSource {
    /// A package file, read into memory in its entirety.
    Package(Utf8PathBuf),
    /// Loose files, each read (and cached) on demand.
    Files {
        /// Entry names, which are paths relative to `base_dir`
        names: Vec<String>,
        base_dir: Utf8PathBuf,
    },
}

/// Which kind of [`PackSource`] a loader was opened with
///
/// [`PackSource`]: enum.PackSource.html
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoaderMode {
    Package,
    Files,
}

/// An entry served by a [`PackLoader`]
///
/// [`PackLoader`]: struct.PackLoader.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedEntry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
}

/// Files-mode cache counters
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from memory
    pub hits: u64,
    /// Lookups that had to read the file
    pub reads: u64,
}

/// A loose file's contents, as of `modified`
#[derive(Debug)]
struct CachedFile {
    data: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug)]
struct LooseFiles {
    names: Vec<String>,
    base_dir: Utf8PathBuf,
    /// One slot per name, filled on first access
    cache: Vec<Option<CachedFile>>,
    stats: CacheStats,
}

impl LooseFiles {
    fn check_index(&self, n: usize) -> PackResult<()> {
        if n >= self.names.len() {
            return Err(PackError::IndexOutOfRange {
                index: n,
                count: self.names.len(),
            });
        }
        Ok(())
    }

    fn load(&mut self, n: usize) -> PackResult<LoadedEntry<'_>> {
        self.check_index(n)?;
        let path = self.base_dir.join(&self.names[n]);

        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .map_err(PackError::file(path.as_path()))?;

        let slot = &mut self.cache[n];
        let cached = match slot.take() {
            Some(cached) if cached.modified >= modified => {
                debug!("{} unchanged since last load", path);
                self.stats.hits += 1;
                cached
            }
            stale => {
                if stale.is_some() {
                    debug!("{} changed on disk; reloading", path);
                } else {
                    debug!("Loading {}", path);
                }
                // Free the stale copy before reading the new one.
                drop(stale);
                let data = fs::read(&path).map_err(PackError::file(path.as_path()))?;
                self.stats.reads += 1;
                CachedFile { data, modified }
            }
        };
        let cached = slot.insert(cached);

        Ok(LoadedEntry {
            name: &self.names[n],
            data: &cached.data,
        })
    }
}

#[derive(Debug)]
enum Source {
    Package(PackReader),
    Files(LooseFiles),
}

/// Loads entries from a package or from loose files
#[derive(Debug)]
pub struct PackLoader {
    source: Source,
}

impl PackLoader {
    /// Opens the given source.
    ///
    /// Packages are read and validated immediately;
    /// loose files aren't touched until they're asked for.
    pub fn open(source: PackSource) -> PackResult<Self> {
        match source {
            PackSource::Package(path) => Self::from_package(path),
            PackSource::Files { names, base_dir } => Ok(Self::from_files(names, base_dir)),
        }
    }

    /// Reads the package at `path` into memory.
    pub fn from_package<P: AsRef<Utf8Path>>(path: P) -> PackResult<Self> {
        let reader = PackReader::open(path)?;
        Ok(Self {
            source: Source::Package(reader),
        })
    }

    /// Serves the given names as files relative to `base_dir`.
    pub fn from_files<N, P>(names: Vec<N>, base_dir: P) -> Self
    where
        N: Into<String>,
        P: Into<Utf8PathBuf>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut cache = Vec::new();
        cache.resize_with(names.len(), || None);
        let base_dir = base_dir.into();
        debug!("Serving {} loose files from {}", names.len(), base_dir);
        Self {
            source: Source::Files(LooseFiles {
                names,
                base_dir,
                cache,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn mode(&self) -> LoaderMode {
        match &self.source {
            Source::Package(_) => LoaderMode::Package,
            Source::Files(_) => LoaderMode::Files,
        }
    }

    /// The number of entries in the package, or the number of configured files.
    pub fn entry_count(&self) -> usize {
        match &self.source {
            Source::Package(reader) => reader.entry_count(),
            Source::Files(files) => files.names.len(),
        }
    }

    /// Gets the `n`th entry.
    ///
    /// From a package, this just points into the loaded package.
    /// From loose files, this always checks the file's modification time,
    /// and reads it again if it changed since the last load.
    ///
    /// This takes `&mut self` in both modes since files mode updates its cache.
    /// To share package lookups between threads, use [`reader()`](#method.reader).
    pub fn entry(&mut self, n: usize) -> PackResult<LoadedEntry<'_>> {
        match &mut self.source {
            Source::Package(reader) => {
                let entry = reader.entry(n)?;
                Ok(LoadedEntry {
                    name: entry.name,
                    data: entry.content,
                })
            }
            Source::Files(files) => files.load(n),
        }
    }

    /// Gets the name of the `n`th entry without loading it.
    ///
    /// Never touches the disk.
    pub fn entry_name(&self, n: usize) -> PackResult<&str> {
        match &self.source {
            Source::Package(reader) => reader.entry_name(n),
            Source::Files(files) => {
                files.check_index(n)?;
                Ok(&files.names[n])
            }
        }
    }

    /// Frees every cached file, so the next lookup of each reads it again.
    /// Does nothing for packages.
    pub fn clear_cache(&mut self) {
        if let Source::Files(files) = &mut self.source {
            debug!("Clearing {} cache slots", files.cache.len());
            files.cache.iter_mut().for_each(|slot| *slot = None);
        }
    }

    /// Cache counters for loose files. Always zero for packages.
    pub fn cache_stats(&self) -> CacheStats {
        match &self.source {
            Source::Package(_) => CacheStats::default(),
            Source::Files(files) => files.stats,
        }
    }

    /// The underlying reader, when loading from a package.
    ///
    /// Unlike [`entry()`](#method.entry), this only needs a shared borrow,
    /// so it can be used from several threads at once.
    pub fn reader(&self) -> Option<&PackReader> {
        match &self.source {
            Source::Package(reader) => Some(reader),
            Source::Files(_) => None,
        }
    }
}
