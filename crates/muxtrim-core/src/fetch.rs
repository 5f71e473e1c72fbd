//! NuGet version query and package download.
//!
//! The version list is the one network call allowed to fail: any error falls
//! back to a single configured version. Download failures are fatal.

use std::path::Path;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::Reporter;

/// Network and download failures.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing the downloaded file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The version index was not the expected JSON.
    #[error("Malformed package index: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status the server returned.
        status: StatusCode,
    },
}

/// Response body of the flat-container `index.json`.
#[derive(Debug, Deserialize)]
struct FlatContainerIndex {
    versions: Vec<String>,
}

/// Published versions of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionList {
    /// Versions in index order, oldest first.
    pub versions: Vec<String>,
    /// False when the list is the offline fallback.
    pub from_network: bool,
}

impl VersionList {
    /// The one-entry list used when the index cannot be read.
    pub fn fallback(version: &str) -> Self {
        Self {
            versions: vec![version.to_string()],
            from_network: false,
        }
    }

    /// Default offered to the operator.
    pub fn latest(&self) -> Option<&str> {
        latest_version(&self.versions)
    }
}

/// Query the package index, falling back to `fallback` on any failure.
pub async fn fetch_versions(client: &Client, index_url: &str, fallback: &str) -> VersionList {
    match try_fetch_versions(client, index_url).await {
        Ok(versions) if !versions.is_empty() => {
            debug!(count = versions.len(), "fetched version list");
            VersionList {
                versions,
                from_network: true,
            }
        }
        Ok(_) => {
            warn!(url = index_url, "package index lists no versions, using fallback");
            VersionList::fallback(fallback)
        }
        Err(e) => {
            warn!(url = index_url, error = %e, "package index unavailable, using fallback");
            VersionList::fallback(fallback)
        }
    }
}

async fn try_fetch_versions(client: &Client, index_url: &str) -> Result<Vec<String>, FetchError> {
    let resp = client
        .get(index_url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?;

    if resp.status() != StatusCode::OK {
        return Err(FetchError::Status {
            url: index_url.to_string(),
            status: resp.status(),
        });
    }

    let body = resp.bytes().await?;
    let index: FlatContainerIndex = serde_json::from_slice(&body)?;
    Ok(index.versions)
}

/// Highest version in the list.
///
/// Versions are compared as semver where they parse; strings that do not
/// parse lose to any that do. With no parseable entry the last one wins,
/// matching the index's own ascending order.
pub fn latest_version(versions: &[String]) -> Option<&str> {
    versions
        .iter()
        .filter_map(|v| semver::Version::parse(v).ok().map(|parsed| (parsed, v)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, v)| v.as_str())
        .or_else(|| versions.last().map(String::as_str))
}

/// Operator input, or `default` when the input is blank.
pub fn choose_version(input: &str, default: &str) -> String {
    let input = input.trim();
    if input.is_empty() {
        default.to_string()
    } else {
        input.to_string()
    }
}

/// Stream `url` into `dest`, reporting progress. Returns the SHA-256 of the
/// downloaded bytes.
pub async fn download<R: Reporter + ?Sized>(
    client: &Client,
    url: &str,
    dest: &Path,
    label: &str,
    reporter: &R,
) -> Result<String, FetchError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let total_size = response.content_length();
    reporter.downloading(label, 0, total_size);

    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        reporter.downloading(label, downloaded, total_size);
    }

    file.flush().await?;
    let hash = hex::encode(hasher.finalize());
    debug!(url, bytes = downloaded, sha256 = %hash, "download complete");
    Ok(hash)
}
