//! Resource index trimming.
//!
//! Each `<PackageId>.pri` in the extracted tree goes through the same
//! sequence, in its own directory:
//!
//! 1. rename to [`WORKING_INDEX`] and remember its mtime;
//! 2. dump it to XML with the [`ResourceIndexTool`];
//! 3. [`filter_dump`] blanks the legacy markup payloads;
//! 4. write [`PRI_CONFIG`] and rebuild the binary index;
//! 5. remove the intermediates, restore the mtime and the original name.
//!
//! Indexes without matches still go through the dump/rebuild pair.

pub mod filter;
pub mod tool;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub use filter::{BLANK_PAYLOAD, Denylist, LEGACY_VARIANTS, TrimStats, filter_dump, trim_target};
pub use tool::{CONFIG_FILE, DUMP_FILE, MakePri, ResourceIndexTool, WORKING_INDEX};

use crate::Reporter;
use crate::timestamps;
use crate::tools::ToolError;

/// Indexer configuration for `makepri new`. Qualifier defaults match what
/// the framework package itself ships with.
pub const PRI_CONFIG: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<resources targetOsVersion="10.0.0" majorVersion="1">
  <packaging>
    <autoResourcePackage qualifier="Scale" />
    <autoResourcePackage qualifier="DXFeatureLevel" />
  </packaging>
  <index startIndexAt="resources.pri.xml" root="">
    <default>
      <qualifier name="Language" value="en-US" />
      <qualifier name="Contrast" value="standard" />
      <qualifier name="Scale" value="200" />
      <qualifier name="HomeRegion" value="001" />
      <qualifier name="TargetSize" value="256" />
      <qualifier name="LayoutDirection" value="LTR" />
      <qualifier name="DXFeatureLevel" value="DX9" />
      <qualifier name="Configuration" value="" />
      <qualifier name="AlternateForm" value="" />
      <qualifier name="Platform" value="UAP" />
    </default>
    <indexer-config type="priinfo" emitStrings="true" emitPaths="true" emitEmbeddedData="true" />
  </index>
</resources>
"#;

/// Failures while trimming an index.
#[derive(Error, Debug)]
pub enum TrimError {
    /// Renaming, reading or writing an intermediate file failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The dump or rebuild step failed.
    #[error("Resource tool failed: {0}")]
    Tool(#[from] ToolError),

    /// The dump is not well-formed XML.
    #[error("Malformed resource dump: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A dump attribute could not be parsed.
    #[error("Malformed resource dump attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    /// The dump is not UTF-8.
    #[error("Resource dump is not UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),

    /// Walking the extracted tree failed.
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// An intermediate file from an earlier run is still present.
    #[error("Stale working file in the way: {}", .0.display())]
    WorkingFileExists(PathBuf),

    /// The tool exited successfully but did not write its output.
    #[error("Resource tool produced no output at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Result of trimming one index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedIndex {
    /// The index, under its original name.
    pub path: PathBuf,
    /// What the filter did to it.
    pub stats: TrimStats,
}

/// Every file named exactly `file_name` under `root`, in sorted walk order.
pub fn find_resource_indexes(root: &Path, file_name: &str) -> Result<Vec<PathBuf>, TrimError> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == file_name {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Drives a [`ResourceIndexTool`] over resource index files.
#[derive(Debug)]
pub struct Trimmer<'a, T: ResourceIndexTool + ?Sized> {
    tool: &'a T,
    denylist: &'a Denylist,
    index_name: &'a str,
}

impl<'a, T: ResourceIndexTool + ?Sized> Trimmer<'a, T> {
    /// `index_name` is the resource map name passed to the rebuild
    /// (the package id, e.g. `Microsoft.UI.Xaml`).
    pub fn new(tool: &'a T, denylist: &'a Denylist, index_name: &'a str) -> Self {
        Self {
            tool,
            denylist,
            index_name,
        }
    }

    /// Trim every `<index_name>.pri` under `root`, one at a time.
    pub fn trim_tree<R: Reporter + ?Sized>(
        &self,
        root: &Path,
        reporter: &R,
    ) -> Result<Vec<TrimmedIndex>, TrimError> {
        let file_name = format!("{}.pri", self.index_name);
        let indexes = find_resource_indexes(root, &file_name)?;
        if indexes.is_empty() {
            reporter.warning(&format!("No {file_name} found under {}", root.display()));
        }

        let mut trimmed = Vec::with_capacity(indexes.len());
        for path in indexes {
            reporter.trimming(&path);
            let stats = self.trim_file(&path)?;
            info!(
                path = %path.display(),
                blanked = stats.blanked,
                already_blank = stats.already_blank,
                "trimmed resource index"
            );
            trimmed.push(TrimmedIndex { path, stats });
        }
        Ok(trimmed)
    }

    /// Trim a single resource index file in place.
    pub fn trim_file(&self, path: &Path) -> Result<TrimStats, TrimError> {
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "index has no parent"))?;
        let working = dir.join(WORKING_INDEX);
        let dump = dir.join(DUMP_FILE);
        let config = dir.join(CONFIG_FILE);

        if working.exists() {
            return Err(TrimError::WorkingFileExists(working));
        }

        let mtime = timestamps::modified(path)?;
        fs::rename(path, &working)?;

        self.tool.dump(dir)?;
        if !dump.is_file() {
            return Err(TrimError::MissingOutput(dump));
        }

        let xml = String::from_utf8(fs::read(&dump)?)?;
        let (filtered, stats) = filter_dump(&xml, self.denylist)?;
        fs::write(&dump, filtered)?;
        fs::write(&config, PRI_CONFIG)?;

        self.tool.rebuild(dir, self.index_name)?;
        if !working.is_file() {
            return Err(TrimError::MissingOutput(working));
        }

        fs::remove_file(&dump)?;
        fs::remove_file(&config)?;

        timestamps::set_modified(&working, mtime)?;
        fs::rename(&working, path)?;
        debug!(path = %path.display(), ?stats, "index rebuilt");

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use std::cell::RefCell;

    /// Treats the binary index as its own XML dump.
    #[derive(Default)]
    struct FixtureTool {
        calls: RefCell<Vec<String>>,
    }

    impl ResourceIndexTool for FixtureTool {
        fn dump(&self, dir: &Path) -> Result<(), ToolError> {
            self.calls.borrow_mut().push("dump".into());
            fs::copy(dir.join(WORKING_INDEX), dir.join(DUMP_FILE)).unwrap();
            Ok(())
        }

        fn rebuild(&self, dir: &Path, index_name: &str) -> Result<(), ToolError> {
            self.calls.borrow_mut().push(format!("rebuild {index_name}"));
            assert_eq!(fs::read_to_string(dir.join(CONFIG_FILE)).unwrap(), PRI_CONFIG);
            fs::copy(dir.join(DUMP_FILE), dir.join(WORKING_INDEX)).unwrap();
            Ok(())
        }
    }

    struct FailingTool;

    impl ResourceIndexTool for FailingTool {
        fn dump(&self, _: &Path) -> Result<(), ToolError> {
            Err(ToolError::NotFound {
                tool: "makepri",
                path: PathBuf::from("makepri.exe"),
            })
        }

        fn rebuild(&self, _: &Path, _: &str) -> Result<(), ToolError> {
            unreachable!("dump fails first")
        }
    }

    const INDEX: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<PriInfo><ResourceMap><ResourceMapSubtree><ResourceMapSubtree><ResourceMapSubtree><NamedResource name="a.rs2.xbf"><Candidate><Base64Value>AAAA</Base64Value></Candidate></NamedResource><NamedResource name="a.xbf"><Candidate><Base64Value>BBBB</Base64Value></Candidate></NamedResource></ResourceMapSubtree></ResourceMapSubtree></ResourceMapSubtree></ResourceMap></PriInfo>"#;

    fn write_index(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_trim_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib").join("Microsoft.UI.Xaml.pri");
        write_index(&path, INDEX);
        let mtime = timestamps::ArchiveClock::Utc
            .to_system_time(chrono::NaiveDate::from_ymd_opt(2024, 11, 19).unwrap().and_hms_opt(1, 2, 4).unwrap());
        timestamps::set_modified(&path, mtime).unwrap();

        let tool = FixtureTool::default();
        let denylist = Denylist::default();
        let stats = Trimmer::new(&tool, &denylist, "Microsoft.UI.Xaml")
            .trim_file(&path)
            .unwrap();

        assert_eq!(stats.blanked, 1);
        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("<Base64Value>IA==</Base64Value>"));
        assert!(body.contains("<Base64Value>BBBB</Base64Value>"));
        assert_eq!(timestamps::modified(&path).unwrap(), mtime);

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec!["Microsoft.UI.Xaml.pri"]);
        assert_eq!(
            *tool.calls.borrow(),
            vec!["dump".to_string(), "rebuild Microsoft.UI.Xaml".to_string()]
        );
    }

    #[test]
    fn test_trim_tree_processes_each_index() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("lib").join("uap10.0").join("Microsoft.UI.Xaml.pri");
        let b = dir.path().join("runtimes").join("win10-x64").join("Microsoft.UI.Xaml.pri");
        let other = dir.path().join("lib").join("Other.pri");
        write_index(&a, INDEX);
        write_index(&b, INDEX);
        write_index(&other, INDEX);

        let tool = FixtureTool::default();
        let denylist = Denylist::default();
        let trimmed = Trimmer::new(&tool, &denylist, "Microsoft.UI.Xaml")
            .trim_tree(dir.path(), &NullReporter)
            .unwrap();

        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[0].path, a);
        assert_eq!(trimmed[1].path, b);
        assert_eq!(fs::read_to_string(&other).unwrap(), INDEX);
    }

    #[test]
    fn test_unmatched_index_still_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Microsoft.UI.Xaml.pri");
        write_index(&path, INDEX);

        let tool = FixtureTool::default();
        let denylist = Denylist::new(["nothing-matches"]);
        let stats = Trimmer::new(&tool, &denylist, "Microsoft.UI.Xaml")
            .trim_file(&path)
            .unwrap();

        assert_eq!(stats.matched(), 0);
        assert_eq!(tool.calls.borrow().len(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), INDEX);
    }

    #[test]
    fn test_tool_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Microsoft.UI.Xaml.pri");
        write_index(&path, INDEX);

        let denylist = Denylist::default();
        let err = Trimmer::new(&FailingTool, &denylist, "Microsoft.UI.Xaml")
            .trim_file(&path)
            .unwrap_err();
        assert!(matches!(err, TrimError::Tool(_)));
    }

    #[test]
    fn test_stale_working_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Microsoft.UI.Xaml.pri");
        write_index(&path, INDEX);
        fs::write(dir.path().join(WORKING_INDEX), b"stale").unwrap();

        let tool = FixtureTool::default();
        let denylist = Denylist::default();
        let err = Trimmer::new(&tool, &denylist, "Microsoft.UI.Xaml")
            .trim_file(&path)
            .unwrap_err();
        assert!(matches!(err, TrimError::WorkingFileExists(_)));
        assert!(tool.calls.borrow().is_empty());
    }
}
