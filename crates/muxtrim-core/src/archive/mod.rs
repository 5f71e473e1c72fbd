//! Package archive IO - `.nupkg` files are plain zip archives.

pub mod extract;
pub mod repack;

use std::fs::File;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use extract::{ExtractedFile, extract_package};
pub use repack::{RepackSummary, is_excluded, repack};

/// Extraction and repacking failures.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The archive is not a readable zip, or writing one failed.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Walking the tree to repack failed.
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// An entry name is absolute or escapes the destination.
    #[error("Invalid path in archive: {0}")]
    UnsafePath(String),

    /// Two entries share a name.
    #[error("Duplicate entry in archive: {0}")]
    DuplicateEntry(String),
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
