//! Result types returned by the encode and decode entry points.
//!
//! Everything here is serde-serialisable so the CLI can emit a `--json`
//! report and callers can log a run's statistics verbatim.

use crate::error::{PageError, QrVaultError};
use crate::pipeline::layout::LayoutPolicy;
use crate::pipeline::properties::DocumentProperties;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sizes at each stage of the encode pipeline; printed on the metadata page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadStats {
    /// Bytes of the original payload.
    pub raw_size: usize,
    /// Bytes after zlib compression.
    pub compressed_size: usize,
    /// Characters of base64 text.
    pub encoded_size: usize,
    /// Number of chunks (one QR symbol each).
    pub chunk_count: usize,
}

/// Statistics for one encode run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeStats {
    #[serde(flatten)]
    pub payload: PayloadStats,
    /// Pages in the document, metadata page included.
    pub page_count: usize,
    pub render_duration_ms: u64,
    pub write_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// What [`crate::encode::encode`] produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeOutput {
    /// The finished PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    pub layout: LayoutPolicy,
    pub dpi: u32,
    pub stats: EncodeStats,
}

/// One symbol recovered from a scanned page, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredSymbol {
    /// Chunk position: derived from page and slot, or read from the index prefix.
    pub index: usize,
    /// 1-indexed document page.
    pub page: usize,
    pub slot: usize,
    /// Chunk text with any index prefix removed.
    pub text: String,
}

/// Symbols and failures for one scanned page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageScan {
    /// 1-indexed document page.
    pub page: usize,
    pub symbols: Vec<RecoveredSymbol>,
    pub errors: Vec<PageError>,
}

/// Statistics for one decode run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeStats {
    pub total_pages: usize,
    pub data_pages: usize,
    pub symbols_recovered: usize,
    pub expected_chunks: usize,
    pub failed_pages: usize,
    pub payload_size: usize,
    pub scan_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// What [`crate::decode::decode`] produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeOutput {
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub stats: DecodeStats,
    /// Every page-level problem, in page order, even when reconstruction succeeded.
    pub page_errors: Vec<PageError>,
}

/// What [`crate::decode::inspect`] reports without scanning any page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub pdf_version: String,
    /// `None` for PDFs not written by this crate.
    pub properties: Option<DocumentProperties>,
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// reader never sees a partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), QrVaultError> {
    let failed = |source: std::io::Error| QrVaultError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let Some(name) = path.file_name() else {
        return Err(failed(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "output path has no file name",
        )));
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let mut tmp_name = name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(failed(e));
    }
    Ok(())
}
