//! Payload Source: turn a user-supplied path or URL into bytes.
//!
//! Remote pages are fetched with a bounded timeout; local files are read
//! whole. Both paths fail before any encoding work starts, so a bad source
//! never produces a partial document.
//!
//! Decode inputs go through [`read_pdf`], which checks the `%PDF` magic
//! bytes so callers get a meaningful error rather than a pdfium crash.

use crate::error::QrVaultError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where the payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// A web page, fetched over HTTP(S).
    Url(String),
    /// A local file, read verbatim.
    File(PathBuf),
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

impl PayloadSource {
    /// Classify a CLI-style locator.
    pub fn parse(input: &str) -> Result<Self, QrVaultError> {
        if input.trim().is_empty() {
            return Err(QrVaultError::InvalidInput {
                input: input.to_string(),
            });
        }
        if is_url(input) {
            reqwest::Url::parse(input).map_err(|_| QrVaultError::InvalidInput {
                input: input.to_string(),
            })?;
            Ok(PayloadSource::Url(input.to_string()))
        } else {
            Ok(PayloadSource::File(PathBuf::from(input)))
        }
    }

    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        match self {
            PayloadSource::Url(url) => url.clone(),
            PayloadSource::File(path) => path.display().to_string(),
        }
    }

    /// Read or download the payload.
    pub async fn fetch(&self, timeout_secs: u64) -> Result<Vec<u8>, QrVaultError> {
        match self {
            PayloadSource::Url(url) => fetch_url(url, timeout_secs).await,
            PayloadSource::File(path) => read_local(path).await,
        }
    }
}

/// Read a local file, mapping I/O failures onto the source error family.
async fn read_local(path: &Path) -> Result<Vec<u8>, QrVaultError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => QrVaultError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => QrVaultError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Download a URL into memory.
async fn fetch_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, QrVaultError> {
    info!("Fetching payload from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| QrVaultError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let fetch_err = |e: reqwest::Error| {
        if e.is_timeout() {
            QrVaultError::FetchTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            QrVaultError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(fetch_err)?;
    if !response.status().is_success() {
        return Err(QrVaultError::FetchFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(fetch_err)?;
    info!("Fetched {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Read a PDF to decode, validating existence and magic bytes.
pub async fn read_pdf(path: &Path) -> Result<Vec<u8>, QrVaultError> {
    let bytes = read_local(path).await?;
    check_pdf_magic(path, &bytes)?;
    Ok(bytes)
}

fn check_pdf_magic(path: &Path, bytes: &[u8]) -> Result<(), QrVaultError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(QrVaultError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}
