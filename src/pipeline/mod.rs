//! Pipeline stages for the QR codec.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own and the pdfium-backed stages can be swapped out
//! without touching the protocol.
//!
//! ## Data Flow
//!
//! ```text
//! encode:  source ──▶ inline ──▶ codec ──▶ chunk ──▶ symbol ──▶ layout ──▶ writer ──▶ properties
//!          (URL/path)  (HTML)   (zlib+b64)          (QR, H)   (pages)    (pdfium)    (lopdf)
//!
//! decode:  properties ──▶ scan ──▶ symbol ──▶ reassemble ──▶ codec
//!          (lopdf)       (pdfium)  (rqrr)     (order, gaps)   (b64+zlib)
//! ```
//!
//! 1. [`source`] : read a local file or fetch a URL with a timeout
//! 2. [`inline`] : inline `<img>` tags of fetched pages as small JPEG data URIs
//! 3. [`codec`]  : zlib compression and standard base64, and their inverses
//! 4. [`chunk`]  : fixed-size split of the text, optional `NNNNNN:` index prefix
//! 5. [`symbol`] : QR rendering at level H, and symbol detection in rasters
//! 6. [`layout`] : page geometry, slot placement, in-memory page rasterisation
//! 7. [`writer`] : composed pages to PDF; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 8. [`properties`]: protocol parameters stamped into the PDF Info dictionary
//! 9. [`scan`]   : rasterise pages at the recorded DPI
//! 10. [`reassemble`]: order, validate and invert the recovered chunks
//!
//! [`engine`] binds the pdfium library for the writer and the scanner.

pub mod chunk;
pub mod codec;
pub mod engine;
pub mod inline;
pub mod layout;
pub mod properties;
pub mod reassemble;
pub mod scan;
pub mod source;
pub mod symbol;
pub mod writer;
