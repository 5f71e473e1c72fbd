//! Repackaging a working tree into a `.nupkg`.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use super::{ArchiveError, sha256_file};
use crate::paths::entry_name;
use crate::timestamps::{self, ArchiveClock};

/// Package signature written by nuget.org; invalid once contents change.
pub const SIGNATURE_FILE: &str = ".signature.p7s";

/// Outcome of a repack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackSummary {
    /// Written archive.
    pub output: PathBuf,
    /// Number of file entries.
    pub entries: usize,
    /// Hex SHA-256 of the archive.
    pub sha256: String,
}

/// Files never carried into the output: nested packages (including the
/// input and output archives themselves) and the package signature.
pub fn is_excluded(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return true;
    };
    name == SIGNATURE_FILE || name.to_ascii_lowercase().ends_with(".nupkg")
}

/// Compress every non-excluded file under `source_dir` into `output`.
///
/// Entries are added in sorted path order with deflate compression. Each
/// entry's timestamp is the file's mtime broken into calendar fields under
/// `clock`, so identical trees produce identical entry metadata.
pub fn repack(
    source_dir: &Path,
    output: &Path,
    clock: ArchiveClock,
) -> Result<RepackSummary, ArchiveError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || is_excluded(entry.path()) {
            continue;
        }
        let name = entry_name(source_dir, entry.path())
            .ok_or_else(|| ArchiveError::UnsafePath(entry.path().display().to_string()))?;
        files.push((name, entry.into_path()));
    }

    let mut zip = ZipWriter::new(BufWriter::new(File::create(output)?));
    for (name, path) in &files {
        let mtime = timestamps::modified(path)?;
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(timestamps::naive_to_zip(clock.to_naive(mtime)));

        zip.start_file(name.as_str(), options)?;
        let mut input = File::open(path)?;
        io::copy(&mut input, &mut zip)?;
    }
    let writer = zip.finish()?;
    writer.into_inner().map_err(io::IntoInnerError::into_error)?;

    let sha256 = sha256_file(output)?;
    debug!(output = %output.display(), entries = files.len(), "repack complete");

    Ok(RepackSummary {
        output: output.to_path_buf(),
        entries: files.len(),
        sha256,
    })
}
