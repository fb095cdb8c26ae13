//! Blocking HTTP access to employee photos.
//!
//! Must only be used from the engine thread: reqwest's blocking client
//! cannot run inside the tokio runtime.

use facesync_core::fingerprint::MIN_IMAGE_BYTES;
use facesync_core::{FetchError, ImageFetcher, ResourceMetadata};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::io::Read;
use std::time::Duration;

/// Largest photo accepted; bigger bodies are abandoned mid-read.
pub const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

const USER_AGENT: &str = concat!("facesyncd/", env!("CARGO_PKG_VERSION"));

pub struct HttpImageFetcher {
    client: Client,
    probe_timeout: Duration,
    fetch_timeout: Duration,
}

impl HttpImageFetcher {
    pub fn new(probe_timeout: Duration, fetch_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            probe_timeout,
            fetch_timeout,
        })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn probe(&self, url: &str) -> Result<ResourceMetadata, FetchError> {
        let response = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .map_err(map_reqwest)?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(metadata_from_headers(response.headers()))
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .map_err(map_reqwest)?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        // Reject before reading the body when the server already tells us.
        if let Some(len) = declared_length(response.headers()) {
            check_size(len)?;
        }

        let body = read_limited(response)?;
        tracing::debug!(url, bytes = body.len(), "image downloaded");
        Ok(body)
    }
}

fn map_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

fn check_size(len: u64) -> Result<(), FetchError> {
    if len < MIN_IMAGE_BYTES as u64 {
        return Err(FetchError::TooSmall(len));
    }
    if len > MAX_IMAGE_BYTES {
        return Err(FetchError::TooLarge(MAX_IMAGE_BYTES));
    }
    Ok(())
}

/// Read at most one byte past the limit so oversized bodies are never buffered whole.
fn read_limited(body: impl Read) -> Result<Vec<u8>, FetchError> {
    let mut buf = Vec::new();
    body.take(MAX_IMAGE_BYTES + 1)
        .read_to_end(&mut buf)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;
    check_size(buf.len() as u64)?;
    Ok(buf)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// `Content-Length` and `Last-Modified`; missing or unparsable headers stay `None`.
pub(crate) fn metadata_from_headers(headers: &HeaderMap) -> ResourceMetadata {
    ResourceMetadata {
        size: declared_length(headers),
        modified_at: headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
    }
}
