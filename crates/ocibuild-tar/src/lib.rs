//! Reproducible tar+gzip layer construction.
//!
//! Given a sorted set of planned file entries, [`build`] produces
//! byte-for-byte identical output across runs: directories are synthesized
//! for any missing parent path, timestamps are pinned to each entry's
//! configured modification time, and the gzip wrapper carries no filename or
//! embedded mtime.

mod builder;
mod entry;
mod error;

pub use builder::build;
pub use entry::{
    EntryKind, FileEntriesLayer, FileEntry, DEFAULT_DIRECTORY_PERMISSIONS,
    DEFAULT_MODIFICATION_TIME,
};
pub use error::{Error, Result};
