//! The external resource index tool, as a function boundary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::tools::{ToolError, run_tool};

/// Name the binary index is given while it is being worked on.
pub const WORKING_INDEX: &str = "resources.pri";
/// Textual dump written next to [`WORKING_INDEX`].
pub const DUMP_FILE: &str = "resources.pri.xml";
/// Indexer configuration consumed by the rebuild.
pub const CONFIG_FILE: &str = "priconfig.xml";

/// Converts a binary resource index to its XML dump and back.
///
/// Both operations work inside `dir`: `dump` reads [`WORKING_INDEX`] and
/// writes [`DUMP_FILE`]; `rebuild` reads [`DUMP_FILE`] and [`CONFIG_FILE`] and
/// overwrites [`WORKING_INDEX`].
pub trait ResourceIndexTool {
    /// Write the XML dump of the working index.
    fn dump(&self, dir: &Path) -> Result<(), ToolError>;

    /// Build a new working index from the dump, as `index_name`'s resource map.
    fn rebuild(&self, dir: &Path, index_name: &str) -> Result<(), ToolError>;
}

impl<T: ResourceIndexTool + ?Sized> ResourceIndexTool for &T {
    fn dump(&self, dir: &Path) -> Result<(), ToolError> {
        (**self).dump(dir)
    }

    fn rebuild(&self, dir: &Path, index_name: &str) -> Result<(), ToolError> {
        (**self).rebuild(dir, index_name)
    }
}

/// Windows SDK `makepri.exe`.
#[derive(Debug, Clone)]
pub struct MakePri {
    path: PathBuf,
}

impl MakePri {
    /// Runs the binary at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Binary this runs.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResourceIndexTool for MakePri {
    fn dump(&self, dir: &Path) -> Result<(), ToolError> {
        let input = dir.join(WORKING_INDEX);
        let output = dir.join(DUMP_FILE);
        let args: [&OsStr; 8] = [
            "dump".as_ref(),
            "/if".as_ref(),
            input.as_os_str(),
            "/of".as_ref(),
            output.as_os_str(),
            "/dt".as_ref(),
            "detailed".as_ref(),
            "/o".as_ref(),
        ];
        run_tool(&self.path, args, dir)?;
        Ok(())
    }

    fn rebuild(&self, dir: &Path, index_name: &str) -> Result<(), ToolError> {
        let config = dir.join(CONFIG_FILE);
        let output = dir.join(WORKING_INDEX);
        let args: [&OsStr; 10] = [
            "new".as_ref(),
            "/pr".as_ref(),
            dir.as_os_str(),
            "/cf".as_ref(),
            config.as_os_str(),
            "/in".as_ref(),
            index_name.as_ref(),
            "/of".as_ref(),
            output.as_os_str(),
            "/o".as_ref(),
        ];
        run_tool(&self.path, args, dir)?;
        Ok(())
    }
}
