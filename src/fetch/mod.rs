//! # Source Artifact Fetcher
//!
//! Downloads source tarballs over HTTP, verifies their content digest and
//! gzip framing, and unpacks them into the reconciliation workspace.
//! Transfers are streamed so partial downloads are detected against
//! Content-Length before anything is unpacked.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::builder::tarball;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("failed to download artifact from {url}: {detail}")]
    Download { url: String, detail: String },

    #[error("artifact download returned HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("partial download from {url}: expected {expected} bytes, got {actual}")]
    Partial {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("downloaded artifact from {0} is empty")]
    Empty(String),

    #[error("digest mismatch for {url}: expected {expected}, got {actual}")]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("invalid artifact format from {0}: not a gzip stream")]
    NotGzip(String),

    #[error("failed to unpack artifact from {url}: {detail}")]
    Unpack { url: String, detail: String },

    #[error("workspace i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP fetcher with a bounded retry budget
#[derive(Debug)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    retries: usize,
}

impl ArtifactFetcher {
    /// Build a fetcher with the given per-request timeout and retry budget
    pub fn new(timeout: Duration, retries: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            retries: retries.max(1),
        })
    }

    /// Download the tarball at `url`, verify it against `digest`, and
    /// unpack it into `dir`. Retries transient failures up to the
    /// configured budget.
    pub async fn fetch(&self, url: &str, digest: &str, dir: &Path) -> Result<(), FetchError> {
        let mut last_err = None;
        for attempt in 1..=self.retries {
            match self.fetch_once(url, digest, dir).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(url, attempt, "artifact fetch attempt failed: {e}");
                    last_err = Some(e);
                    if attempt < self.retries {
                        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt was made"))
    }

    async fn fetch_once(&self, url: &str, digest: &str, dir: &Path) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(dir).await?;

        // FluxCD URLs occasionally carry a trailing dot in the cluster-local
        // FQDN, which breaks HTTP routing
        let url_normalized = url.replace("./", "/");

        let response = self
            .client
            .get(&url_normalized)
            .send()
            .await
            .map_err(|e| FetchError::Download {
                url: url_normalized.clone(),
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url_normalized,
                status: response.status().as_u16(),
            });
        }

        let expected_size = response.content_length();
        let parent = dir.parent().unwrap_or(dir);
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut first_bytes = [0u8; 2];
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Download {
                url: url_normalized.clone(),
                detail: e.to_string(),
            })?;
            if downloaded == 0 && chunk.len() >= 2 {
                first_bytes.copy_from_slice(&chunk[..2]);
            }
            downloaded += chunk.len() as u64;
            hasher.update(&chunk);
            temp.write_all(&chunk)?;
        }
        temp.flush()?;

        if downloaded == 0 {
            return Err(FetchError::Empty(url_normalized));
        }
        if let Some(expected) = expected_size {
            if downloaded != expected {
                return Err(FetchError::Partial {
                    url: url_normalized,
                    expected,
                    actual: downloaded,
                });
            }
        }

        // gzip magic bytes; anything else would fail extraction with a
        // far less useful error
        if first_bytes != [0x1f, 0x8b] {
            return Err(FetchError::NotGzip(url_normalized));
        }

        if !digest.is_empty() {
            let computed = format!("sha256:{:x}", hasher.finalize());
            if digest != computed {
                return Err(FetchError::DigestMismatch {
                    url: url_normalized,
                    expected: digest.to_string(),
                    actual: computed,
                });
            }
            debug!(url = url_normalized.as_str(), digest, "checksum verified");
        }

        tarball::extract(temp.path(), dir).map_err(|e| FetchError::Unpack {
            url: url_normalized,
            detail: e.to_string(),
        })
    }
}
