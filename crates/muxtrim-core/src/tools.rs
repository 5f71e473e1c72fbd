//! Build tool discovery and structured process execution.
//!
//! Two tools live under the "Program Files (x86)" folder on a Windows build
//! host:
//!
//! - `vswhere.exe`, queried for the newest MSBuild install;
//! - the Windows SDK `makepri.exe`, found by picking the greatest versioned
//!   directory under `Windows Kits\10\bin`.
//!
//! Discovery is a single pass over one well-known root. A missing or
//! non-executable tool is fatal.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable Windows sets to the "Program Files (x86)" known folder.
pub const PROGRAM_FILES_X86_ENV: &str = "ProgramFiles(x86)";

const MSBUILD_QUERY: [&str; 5] = [
    "-latest",
    "-requires",
    "Microsoft.Component.MSBuild",
    "-find",
    r"MSBuild\**\Bin\MSBuild.exe",
];

/// Tool discovery and execution failures.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The named environment variable is unset.
    #[error("Known folder not found: {0}")]
    FolderNotFound(&'static str),

    /// A tool is missing or not executable.
    #[error("{tool} not found at {}", path.display())]
    NotFound {
        /// Tool name.
        tool: &'static str,
        /// Where it was expected.
        path: PathBuf,
    },

    /// No versioned SDK directory exists under the given root.
    #[error("No Windows SDK found under {}", .0.display())]
    NoSdk(PathBuf),

    /// An SDK search pattern did not compile.
    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The process could not be started.
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        /// Program that ran.
        program: String,
        /// Its exit status.
        status: ExitStatus,
        /// Captured standard error.
        stderr: String,
    },
}

/// Tool discovery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Override for the "Program Files (x86)" folder.
    pub program_files_x86: Option<PathBuf>,
    /// Explicit `makepri.exe`; skips SDK discovery.
    pub makepri: Option<PathBuf>,
    /// SDK binary architecture directory.
    pub sdk_arch: String,
    /// Also require an MSBuild install reported by `vswhere`.
    pub verify_msbuild: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program_files_x86: None,
            makepri: None,
            sdk_arch: "x64".to_string(),
            verify_msbuild: false,
        }
    }
}

/// Resolved tool locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// `makepri.exe`.
    pub makepri: PathBuf,
    /// MSBuild, when verification was requested.
    pub msbuild: Option<PathBuf>,
}

impl Toolchain {
    /// Locate every tool the configuration asks for.
    pub fn discover(config: &ToolConfig) -> Result<Self, ToolError> {
        let makepri = match &config.makepri {
            Some(path) => {
                require_executable("makepri", path)?;
                path.clone()
            }
            None => locate_makepri(&program_files_x86(config)?, &config.sdk_arch)?,
        };

        let msbuild = if config.verify_msbuild {
            Some(locate_msbuild(&program_files_x86(config)?)?)
        } else {
            None
        };

        info!(makepri = %makepri.display(), "toolchain resolved");
        Ok(Self { makepri, msbuild })
    }
}

/// Resolve the "Program Files (x86)" folder from config or the environment.
pub fn program_files_x86(config: &ToolConfig) -> Result<PathBuf, ToolError> {
    if let Some(path) = &config.program_files_x86 {
        return Ok(path.clone());
    }
    std::env::var_os(PROGRAM_FILES_X86_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or(ToolError::FolderNotFound("Program Files (x86)"))
}

/// Ask `vswhere` for the newest MSBuild executable.
pub fn locate_msbuild(program_files: &Path) -> Result<PathBuf, ToolError> {
    let vswhere = program_files
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");
    require_executable("vswhere", &vswhere)?;

    let output = run_tool(&vswhere, MSBUILD_QUERY, program_files)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let msbuild = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| ToolError::NotFound {
            tool: "msbuild",
            path: vswhere.clone(),
        })?;

    require_executable("msbuild", &msbuild)?;
    debug!(msbuild = %msbuild.display(), "found msbuild");
    Ok(msbuild)
}

/// Find `makepri.exe` in the newest Windows 10+ SDK.
pub fn locate_makepri(program_files: &Path, arch: &str) -> Result<PathBuf, ToolError> {
    let bin = program_files.join("Windows Kits").join("10").join("bin");
    let sdk = latest_sdk_dir(&bin)?;
    let makepri = sdk.join(arch).join("makepri.exe");
    require_executable("makepri", &makepri)?;
    debug!(sdk = %sdk.display(), "selected Windows SDK");
    Ok(makepri)
}

/// Lexicographically greatest `10.*` directory under the SDK bin folder.
pub fn latest_sdk_dir(bin: &Path) -> Result<PathBuf, ToolError> {
    let pattern = format!("{}/10.*", glob::Pattern::escape(&bin.to_string_lossy()));

    let mut candidates: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(Result::ok)
        .filter(|p| p.is_dir())
        .collect();
    candidates.sort();
    candidates.pop().ok_or_else(|| ToolError::NoSdk(bin.to_path_buf()))
}

fn require_executable(tool: &'static str, path: &Path) -> Result<(), ToolError> {
    if is_executable(path) {
        Ok(())
    } else {
        Err(ToolError::NotFound {
            tool,
            path: path.to_path_buf(),
        })
    }
}

/// Whether `path` is a file this process may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Run an external tool to completion with an explicit working directory,
/// capturing its output. A non-zero exit is an error carrying stderr (or
/// stdout when stderr is empty, which is how `makepri` reports problems).
pub fn run_tool<I, S>(program: &Path, args: I, cwd: &Path) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!(?cmd, "running tool");

    let output = cmd.output().map_err(|source| ToolError::Spawn {
        program: name.clone(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        return Err(ToolError::Failed {
            program: name,
            status: output.status,
            stderr,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch_exe(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_latest_sdk_is_lexicographic_max() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("Windows Kits").join("10").join("bin");
        for v in ["10.0.17763.0", "10.0.22621.0", "10.0.19041.0"] {
            fs::create_dir_all(bin.join(v)).unwrap();
        }
        fs::create_dir_all(bin.join("x64")).unwrap();

        let latest = latest_sdk_dir(&bin).unwrap();
        assert_eq!(latest.file_name().unwrap(), "10.0.22621.0");
    }

    #[test]
    fn test_no_sdk() {
        let dir = tempfile::tempdir().unwrap();
        let err = latest_sdk_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ToolError::NoSdk(_)));
    }

    #[test]
    fn test_locate_makepri() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("Windows Kits").join("10").join("bin");
        touch_exe(&bin.join("10.0.19041.0").join("x64").join("makepri.exe"));
        touch_exe(&bin.join("10.0.22621.0").join("x64").join("makepri.exe"));

        let found = locate_makepri(dir.path(), "x64").unwrap();
        assert!(found.ends_with(Path::new("10.0.22621.0/x64/makepri.exe")));
    }

    #[test]
    fn test_locate_makepri_missing_arch() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("Windows Kits").join("10").join("bin");
        touch_exe(&bin.join("10.0.22621.0").join("x64").join("makepri.exe"));

        let err = locate_makepri(dir.path(), "arm64").unwrap_err();
        assert!(matches!(err, ToolError::NotFound { tool: "makepri", .. }));
    }

    #[test]
    fn test_discover_with_explicit_makepri() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("makepri.exe");
        touch_exe(&exe);

        let config = ToolConfig {
            makepri: Some(exe.clone()),
            ..ToolConfig::default()
        };
        let toolchain = Toolchain::discover(&config).unwrap();
        assert_eq!(toolchain.makepri, exe);
        assert_eq!(toolchain.msbuild, None);
    }

    #[test]
    fn test_missing_vswhere_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_msbuild(dir.path()).unwrap_err();
        assert!(matches!(err, ToolError::NotFound { tool: "vswhere", .. }));
    }

    #[test]
    fn test_directory_is_not_executable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_executable(dir.path()));
        assert!(!is_executable(&dir.path().join("absent.exe")));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_surfaces_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_tool(Path::new("/bin/sh"), ["-c", "echo boom >&2; exit 3"], dir.path())
            .unwrap_err();
        match err {
            ToolError::Failed { stderr, status, .. } => {
                assert_eq!(stderr, "boom");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_uses_explicit_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_tool(Path::new("/bin/sh"), ["-c", "pwd"], dir.path()).unwrap();
        let pwd = String::from_utf8_lossy(&output.stdout).trim().to_string();
        assert_eq!(
            Path::new(&pwd).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
