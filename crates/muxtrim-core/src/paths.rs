//! Filesystem locations and path helpers.

use std::io;
use std::path::{Path, PathBuf};

/// Per-user configuration directory (`<config_dir>/muxtrim`), or None if the
/// platform has no such directory.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("muxtrim"))
}

/// Default configuration file: `<config_dir>/muxtrim/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Resolve `path` against the current directory once, up front, so later
/// steps never depend on ambient process state.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    std::path::absolute(path)
}

/// Archive entry name for `path` relative to `root`, `/`-separated.
pub fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(Path::new("muxtrim").join("config.toml")));
        }
    }

    #[test]
    fn test_absolute_keeps_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(absolute(dir.path()).unwrap(), dir.path());
        assert!(absolute(Path::new("out")).unwrap().is_absolute());
    }

    #[test]
    fn test_entry_name_uses_forward_slashes() {
        let root = Path::new("/work/out");
        let file = root.join("runtimes").join("win-x64").join("native").join("a.pri");
        assert_eq!(
            entry_name(root, &file).as_deref(),
            Some("runtimes/win-x64/native/a.pri")
        );
        assert_eq!(entry_name(root, root), None);
        assert_eq!(entry_name(root, Path::new("/elsewhere/a")), None);
    }
}
