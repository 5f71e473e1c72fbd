//! Package extraction with timestamp restore.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::ArchiveError;
use crate::Reporter;
use crate::timestamps::{self, ArchiveClock};

/// Information about an extracted file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Entry timestamp as recorded in the archive
    pub modified: Option<NaiveDateTime>,
}

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const EOCD_LEN: usize = 22;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const CENTRAL_HEADER_LEN: usize = 46;

/// Extract every entry of a package archive into `dest_dir`.
///
/// Each file's mtime is set from its entry timestamp, read under `clock`.
/// An entry name that appears twice in the central directory is rejected
/// before anything is written. Any error aborts the extraction; files
/// already written stay on disk.
pub fn extract_package<R: Reporter + ?Sized>(
    archive_path: &Path,
    dest_dir: &Path,
    clock: ArchiveClock,
    reporter: &R,
) -> Result<Vec<ExtractedFile>, ArchiveError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;

    // ZipArchive keeps only the last of several same-named entries.
    if let Some(name) = find_duplicate_entry(&mut File::open(archive_path)?)? {
        return Err(ArchiveError::DuplicateEntry(name));
    }

    fs::create_dir_all(dest_dir)?;
    let total = archive.len() as u64;
    let mut seen = HashSet::with_capacity(archive.len());
    let mut extracted = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative_path) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(ArchiveError::UnsafePath(entry.name().to_string()));
        };

        if !seen.insert(relative_path.clone()) {
            return Err(ArchiveError::DuplicateEntry(entry.name().to_string()));
        }

        let absolute_path = dest_dir.join(&relative_path);
        if entry.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }
        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }

        {
            let mut outfile = File::create(&absolute_path)?;
            io::copy(&mut entry, &mut outfile)?;
        }

        let modified = entry.last_modified().and_then(timestamps::zip_to_naive);
        match modified {
            Some(naive) => timestamps::set_modified(&absolute_path, clock.to_system_time(naive))?,
            None => warn!(entry = entry.name(), "entry has no valid timestamp"),
        }

        extracted.push(ExtractedFile {
            relative_path,
            absolute_path,
            modified,
        });
        reporter.extracting(i as u64 + 1, total);
    }

    debug!(
        archive = %archive_path.display(),
        files = extracted.len(),
        "extraction complete"
    );
    Ok(extracted)
}

/// First entry name listed more than once in the central directory.
pub fn find_duplicate_entry<F: Read + Seek>(file: &mut F) -> io::Result<Option<String>> {
    let Some(names) = central_directory_names(file)? else {
        return Ok(None);
    };
    let mut seen = HashSet::with_capacity(names.len());
    Ok(names
        .into_iter()
        .find(|name| !seen.insert(name.clone()))
        .map(|name| String::from_utf8_lossy(&name).into_owned()))
}

/// Raw entry names in central directory order. `None` when the end record
/// is missing or defers to zip64 fields.
fn central_directory_names<F: Read + Seek>(file: &mut F) -> io::Result<Option<Vec<Vec<u8>>>> {
    let len = file.seek(SeekFrom::End(0))?;
    let tail_len = len.min((EOCD_LEN + usize::from(u16::MAX)) as u64);
    if tail_len < EOCD_LEN as u64 {
        return Ok(None);
    }
    let tail_start = len - tail_len;
    file.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0; tail_len as usize];
    file.read_exact(&mut tail)?;

    let Some(eocd) = (0..=tail.len() - EOCD_LEN)
        .rev()
        .find(|&at| le_u32(&tail, at) == EOCD_SIGNATURE)
    else {
        return Ok(None);
    };
    let cd_size = le_u32(&tail, eocd + 12);
    if cd_size == u32::MAX {
        return Ok(None);
    }
    let Some(cd_start) = (tail_start + eocd as u64).checked_sub(u64::from(cd_size)) else {
        return Ok(None);
    };

    file.seek(SeekFrom::Start(cd_start))?;
    let mut cd = vec![0; cd_size as usize];
    file.read_exact(&mut cd)?;

    let mut names = Vec::new();
    let mut pos = 0;
    while pos + CENTRAL_HEADER_LEN <= cd.len() && le_u32(&cd, pos) == CENTRAL_HEADER_SIGNATURE {
        let name_len = usize::from(le_u16(&cd, pos + 28));
        let extra_len = usize::from(le_u16(&cd, pos + 30));
        let comment_len = usize::from(le_u16(&cd, pos + 32));
        let start = pos + CENTRAL_HEADER_LEN;
        let Some(name) = cd.get(start..start + name_len) else {
            break;
        };
        names.push(name.to_vec());
        pos = start + name_len + extra_len + comment_len;
    }
    Ok(Some(names))
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use chrono::NaiveDate;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn dos(y: u16, mo: u8, d: u8, h: u8, mi: u8, s: u8) -> zip::DateTime {
        zip::DateTime::from_date_and_time(y, mo, d, h, mi, s).unwrap()
    }

    fn build_zip(path: &Path, entries: &[(&str, &[u8], zip::DateTime)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data, time) in entries {
            let options = SimpleFileOptions::default().last_modified_time(*time);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_restores_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("in.nupkg");
        build_zip(
            &archive,
            &[
                ("Microsoft.UI.Xaml.nuspec", b"<package/>".as_slice(), dos(2024, 11, 19, 10, 0, 0)),
                ("lib/uap10.0/Microsoft.UI.Xaml.pri", b"pri".as_slice(), dos(2024, 11, 19, 11, 30, 8)),
            ],
        );

        let out = dir.path().join("out");
        let files = extract_package(&archive, &out, ArchiveClock::Utc, &NullReporter).unwrap();
        assert_eq!(files.len(), 2);

        let pri = out.join("lib").join("uap10.0").join("Microsoft.UI.Xaml.pri");
        assert_eq!(fs::read(&pri).unwrap(), b"pri");

        let expected = NaiveDate::from_ymd_opt(2024, 11, 19)
            .unwrap()
            .and_hms_opt(11, 30, 8)
            .unwrap();
        assert_eq!(files[1].modified, Some(expected));
        assert_eq!(
            timestamps::modified(&pri).unwrap(),
            ArchiveClock::Utc.to_system_time(expected)
        );
    }

    #[test]
    fn test_extract_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.nupkg");
        build_zip(&archive, &[("../escape.txt", b"x".as_slice(), zip::DateTime::default())]);

        let err = extract_package(&archive, &dir.path().join("out"), ArchiveClock::Utc, &NullReporter)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafePath(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }

    /// Two stored entries whose names both end up as `a.txt`.
    fn build_duplicate_zip(path: &Path) {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("a.txt", options).unwrap();
        zip.write_all(b"first").unwrap();
        zip.start_file("b.txt", options).unwrap();
        zip.write_all(b"second").unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();

        let from = b"b.txt";
        let mut at = 0;
        while let Some(offset) = bytes[at..].windows(from.len()).position(|w| w == from) {
            bytes[at + offset..at + offset + from.len()].copy_from_slice(b"a.txt");
            at += offset + from.len();
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_extract_rejects_duplicate_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("dup.nupkg");
        build_duplicate_zip(&archive);

        let out = dir.path().join("out");
        let err = extract_package(&archive, &out, ArchiveClock::Utc, &NullReporter).unwrap_err();
        match err {
            ArchiveError::DuplicateEntry(name) => assert_eq!(name, "a.txt"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.join("a.txt").exists());
    }

    #[test]
    fn test_central_directory_names_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("in.nupkg");
        build_zip(
            &archive,
            &[
                ("b.txt", b"b".as_slice(), zip::DateTime::default()),
                ("lib/a.txt", b"a".as_slice(), zip::DateTime::default()),
            ],
        );

        let mut file = File::open(&archive).unwrap();
        let names = central_directory_names(&mut file).unwrap().unwrap();
        assert_eq!(names, vec![b"b.txt".to_vec(), b"lib/a.txt".to_vec()]);
        assert_eq!(find_duplicate_entry(&mut file).unwrap(), None);
    }

    #[test]
    fn test_short_file_has_no_directory() {
        let mut cursor = std::io::Cursor::new(b"PK".to_vec());
        assert_eq!(central_directory_names(&mut cursor).unwrap(), None);
    }

    #[test]
    fn test_extract_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.nupkg");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_package(&archive, &dir.path().join("out"), ArchiveClock::Utc, &NullReporter)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Zip(_)));
    }
}
