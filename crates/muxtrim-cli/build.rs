//! Stamps the binary with the release tag and commit it was built from.
//!
//! `MUXTRIM_BUILD_VERSION` is the nearest tag without its `v` prefix, or the
//! package version outside a checkout. `MUXTRIM_BUILD_COMMIT` is the short
//! commit hash, or `unknown`.

use std::path::PathBuf;
use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    // The crate sits below the repository root, so ask git where HEAD lives.
    if let Some(git_dir) = git(&["rev-parse", "--absolute-git-dir"]) {
        let git_dir = PathBuf::from(git_dir);
        for watched in ["HEAD", "refs/tags", "packed-refs"] {
            println!("cargo:rerun-if-changed={}", git_dir.join(watched).display());
        }
    }

    let version = git(&["describe", "--tags", "--dirty=-dev"])
        .map(|tag| tag.trim_start_matches('v').to_string())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    let commit = git(&["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=MUXTRIM_BUILD_VERSION={version}");
    println!("cargo:rustc-env=MUXTRIM_BUILD_COMMIT={commit}");
}
