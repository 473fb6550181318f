//! Error types for the edgequake-qrvault library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`QrVaultError`]: **Fatal**: the run cannot proceed or its result
//!   cannot be trusted (source unavailable, gap in the chunk sequence,
//!   corrupt compressed stream). Returned as `Err(QrVaultError)` from the
//!   top-level `encode*` / `decode*` functions.
//!
//! * [`PageError`]: **Non-fatal**: a single page yielded no readable
//!   symbol. Recorded in [`crate::output::DecodeOutput::page_errors`] with
//!   its page number; decoding continues. It only becomes fatal indirectly,
//!   when the reassembler later finds the positions that page should have
//!   carried missing.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the two inverse transforms (base64 text and zlib stream).
#[derive(Debug, Error)]
pub enum CodecError {
    /// The zlib encoder rejected the payload.
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// The compressed stream is truncated, has a bad header or a bad checksum.
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(#[source] std::io::Error),

    /// The text contains characters outside the base64 alphabet or bad padding.
    #[error("invalid base64 text: {0}")]
    InvalidEncoding(#[source] base64::DecodeError),
}

/// All fatal errors returned by the edgequake-qrvault library.
///
/// Page-level failures use [`PageError`] and are collected in
/// [`crate::output::DecodeOutput`] rather than propagated here.
#[derive(Debug, Error)]
pub enum QrVaultError {
    // ── Payload source errors ─────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a readable path nor a valid HTTP/HTTPS URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The URL was valid but the fetch failed.
    #[error("Failed to fetch '{url}': {reason}\nCheck your internet connection.")]
    FetchFailed { url: String, reason: String },

    /// The fetch exceeded the configured timeout.
    #[error("Fetch timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    FetchTimeout { url: String, secs: u64 },

    // ── Codec errors ──────────────────────────────────────────────────────
    /// Malformed base64 text or zlib stream outside of reassembly.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A chunk does not fit a QR symbol at error-correction level H.
    #[error("Chunk {index} is {len} bytes, larger than a version-40 QR symbol holds at level H ({max} bytes)")]
    ChunkTooLarge { index: usize, len: usize, max: usize },

    // ── Reassembly errors ─────────────────────────────────────────────────
    /// A required chunk position was not recovered from the document.
    #[error("Chunk {index} is missing (expected on page {page}); refusing to reconstruct a partial payload")]
    MissingChunk { index: usize, page: usize },

    /// Two different symbols claim the same chunk position.
    #[error("Chunk {index} was recovered twice with different contents (pages {first_page} and {second_page})")]
    ConflictingChunk {
        index: usize,
        first_page: usize,
        second_page: usize,
    },

    /// All chunks were present but inverting base64 or zlib failed.
    #[error("Reconstruction failed while {stage}: {source}")]
    Reconstruction {
        stage: &'static str,
        #[source]
        source: CodecError,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// Scan DPI differs from the DPI the document was written at.
    #[error("Document '{path}' was written for {written} DPI but scanning was requested at {requested} DPI\nDrop --dpi to use the recorded resolution.")]
    ResolutionMismatch {
        path: PathBuf,
        written: u32,
        requested: u32,
    },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// pdfium or lopdf failed while assembling the output document.
    #[error("Failed to write document: {0}")]
    DocumentWriteFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Place libpdfium next to the binary or in the working directory.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page of a scanned document.
///
/// Stored in [`crate::output::DecodeOutput::page_errors`]. Page numbers are
/// 1-indexed, matching what a reader sees printed on the paper.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// No QR symbol could be found on the page.
    #[error("Page {page}: no QR code found")]
    SymbolNotFound { page: usize },

    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// A symbol was found but its content could not be used.
    #[error("Page {page}: unreadable QR code: {detail}")]
    UnreadableSymbol { page: usize, detail: String },

    /// The metadata page unexpectedly carried a symbol; it was ignored.
    #[error("Page {page}: metadata page contains a QR code, ignored")]
    MetadataPageSymbol { page: usize },
}

impl PageError {
    /// 1-indexed page the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::SymbolNotFound { page }
            | PageError::RenderFailed { page, .. }
            | PageError::UnreadableSymbol { page, .. }
            | PageError::MetadataPageSymbol { page } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn missing_chunk_display() {
        let e = QrVaultError::MissingChunk { index: 4, page: 4 };
        let msg = e.to_string();
        assert!(msg.contains("Chunk 4"), "got: {msg}");
        assert!(msg.contains("page 4"), "got: {msg}");
    }

    #[test]
    fn reconstruction_chains_source() {
        let inner = CodecError::CorruptStream(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "bad adler32",
        ));
        let e = QrVaultError::Reconstruction {
            stage: "decompressing",
            source: inner,
        };
        assert!(e.to_string().contains("decompressing"));
        let source = e.source().expect("source is chained");
        assert!(source.to_string().contains("bad adler32"));
    }

    #[test]
    fn resolution_mismatch_display() {
        let e = QrVaultError::ResolutionMismatch {
            path: PathBuf::from("a.pdf"),
            written: 300,
            requested: 150,
        };
        let msg = e.to_string();
        assert!(msg.contains("300 DPI"));
        assert!(msg.contains("150 DPI"));
    }

    #[test]
    fn page_error_reports_page() {
        assert_eq!(PageError::SymbolNotFound { page: 7 }.page(), 7);
        assert_eq!(
            PageError::UnreadableSymbol {
                page: 2,
                detail: "ecc".into()
            }
            .page(),
            2
        );
        assert!(PageError::SymbolNotFound { page: 3 }
            .to_string()
            .contains("Page 3"));
    }
}
