//! packfile bundles named blobs of bytes into a single package file
//! and reads them back out with a simple API:
//!
//! ```no_run
//! # use packfile::*;
//! let mut writer = PackWriter::new();
//! writer.add_entry("num", 8u32.to_le_bytes());
//! writer.add_entry("greeting", "hello");
//! // Lazy files are read when the package is written, not now.
//! writer.add_file("assets/test_file.txt", true)?;
//! writer.write_to_path("assets.pack")?;
//!
//! let reader = PackReader::open("assets.pack")?;
//! assert_eq!(reader.entry_count(), 3);
//! let greeting = reader.entry_by_name("greeting")?;
//! assert_eq!(greeting.content, b"hello");
//! # Ok::<(), packfile::result::PackError>(())
//! ```
//!
//! A package is just a header, each entry's contents (8-byte aligned),
//! a table of NUL-terminated names, and a table of contents at the very end
//! telling us where to find all of it. See [`layout`] for the details.
//!
//! Reading a package means reading _all_ of it into one buffer up front.
//! Entries handed out by a [`PackReader`] point right into that buffer;
//! nothing is copied, and the borrow checker makes sure they don't
//! outlive it.
//!
//! During development it's often nicer to skip packing altogether.
//! A [`PackLoader`] serves entries by index from either a package
//! or a list of loose files, re-reading a file only when its modification
//! time changes. Which one to use is up to the caller:
//!
//! ```no_run
//! # use packfile::*;
//! let names = vec!["assets/test_file.txt"];
//! let mut loader = if cfg!(debug_assertions) {
//!     PackLoader::from_files(names, ".")
//! } else {
//!     PackLoader::from_package("assets.pack")?
//! };
//! let bytes = loader.entry(0)?.data;
//! # Ok::<(), packfile::result::PackError>(())
//! ```
//!
//! [`layout`]: layout/index.html
//! [`PackReader`]: read/struct.PackReader.html
//! [`PackLoader`]: load/struct.PackLoader.html

pub mod layout;
pub mod load;
pub mod read;
pub mod result;
pub mod write;

pub use load::{LoaderMode, PackLoader, PackSource};
pub use read::{Entry, EntryFlags, PackReader};
pub use write::PackWriter;

mod arch;
