//! # edgequake-qrvault
//!
//! Archive arbitrary bytes (a captured web page, any file) as printable QR
//! codes in a paginated PDF, and recover them losslessly from that PDF.
//!
//! ## Why this crate?
//!
//! Paper outlives most storage media, and a QR symbol at error-correction
//! level H survives creases, stains and a worn printer. The wire format is
//! deliberately boring, `base64(zlib(payload))` split into fixed-size
//! chunks, so the printed instructions are enough to recover the data with
//! any QR reader even if this crate is long gone.
//!
//! ## Pipeline Overview
//!
//! ```text
//! payload
//!  │
//!  ├─ 1. Source    read a file or fetch a URL (images inlined for web pages)
//!  ├─ 2. Codec     zlib → base64
//!  ├─ 3. Chunk     fixed-size pieces, one per symbol
//!  ├─ 4. Symbol    QR at level H, rendered in parallel
//!  ├─ 5. Layout    one or two symbols per page, optional metadata page
//!  └─ 6. Write     PDF via pdfium, protocol stamped into the Info dictionary
//!
//! PDF
//!  │
//!  ├─ 1. Scan      rasterise at the recorded DPI
//!  ├─ 2. Detect    find and decode every symbol, position it by page and slot
//!  └─ 3. Rebuild   verify no gaps, concatenate, base64 → zlib → payload
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_qrvault::{decode, encode_to_file, DecodeConfig, EncodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stats = encode_to_file("notes.txt", "notes.pdf", &EncodeConfig::default()).await?;
//!     eprintln!("{} QR codes on {} pages", stats.payload.chunk_count, stats.page_count);
//!
//!     let output = decode("notes.pdf", &DecodeConfig::default()).await?;
//!     assert_eq!(output.payload, std::fs::read("notes.txt")?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `qrvault` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-qrvault = { version = "0.1", default-features = false }
//! ```
//!
//! ## Layouts
//!
//! | Layout | Page | Symbols per page | Default chunk | Metadata page |
//! |--------|------|------------------|---------------|---------------|
//! | `Single` | 8 in × 8 in | 1 | 1000 chars | off |
//! | `Stacked { rows: 2 }` | US Letter | 2 | 800 chars | on |
//!
//! Writing and scanning need the pdfium shared library at runtime; see
//! [`pipeline::engine`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DecodeConfig, DecodeConfigBuilder, EncodeConfig, EncodeConfigBuilder};
pub use decode::{decode, decode_sync, decode_to_file, inspect, ScanPlan};
pub use encode::{
    encode, encode_bytes, encode_to_file, encode_with_previews, encoded_text, load_payload,
    preview_pages,
};
pub use error::{CodecError, PageError, QrVaultError};
pub use output::{
    DecodeOutput, DecodeStats, DocumentInfo, EncodeOutput, EncodeStats, PageScan, PayloadStats,
    RecoveredSymbol,
};
pub use output::write_atomic;
pub use pipeline::layout::LayoutPolicy;
pub use pipeline::properties::DocumentProperties;
pub use progress::{NoopProgressCallback, ProgressCallback, VaultProgressCallback};
pub use stream::{scan_stream, PageScanStream};
