//! Progress-callback trait for per-symbol and per-page events.
//!
//! Inject an [`Arc<dyn VaultProgressCallback>`] via
//! [`crate::config::EncodeConfigBuilder::progress_callback`] or
//! [`crate::config::DecodeConfigBuilder::progress_callback`] to receive
//! events as symbols are rendered and pages are scanned.
//!
//! # Example
//!
//! ```rust
//! use edgequake_qrvault::{EncodeConfig, VaultProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: AtomicUsize,
//! }
//!
//! impl VaultProgressCallback for CountingCallback {
//!     fn on_symbol_rendered(&self, index: usize, total_chunks: usize) {
//!         let done = self.rendered.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("QR {} ready ({}/{})", index, done, total_chunks);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { rendered: AtomicUsize::new(0) });
//!
//! let config = EncodeConfig::builder()
//!     .progress_callback(counter as Arc<dyn VaultProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the encode and decode pipelines as they make progress.
///
/// With `concurrency > 1`, `on_symbol_rendered`, `on_page_scanned` and
/// `on_page_error` may be called from different threads and in any order.
/// All methods have default no-op implementations.
pub trait VaultProgressCallback: Send + Sync {
    /// Called once before any symbol is rendered.
    fn on_encode_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called when the symbol for chunk `index` (0-based) has been rendered.
    fn on_symbol_rendered(&self, index: usize, total_chunks: usize) {
        let _ = (index, total_chunks);
    }

    /// Called once the document has been written.
    fn on_encode_complete(&self, total_chunks: usize, page_count: usize) {
        let _ = (total_chunks, page_count);
    }

    /// Called once before any page is scanned.
    fn on_scan_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when a page has been scanned.
    ///
    /// # Arguments
    /// * `page_num`     : 1-indexed page number
    /// * `total_pages`  : total pages in the document
    /// * `symbols_found`: symbols recovered from the page
    fn on_page_scanned(&self, page_num: usize, total_pages: usize, symbols_found: usize) {
        let _ = (page_num, total_pages, symbols_found);
    }

    /// Called for every page-level problem (the page may still have yielded
    /// some symbols).
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been scanned.
    fn on_scan_complete(&self, total_pages: usize, symbols_recovered: usize) {
        let _ = (total_pages, symbols_recovered);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl VaultProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in the configs.
pub type ProgressCallback = Arc<dyn VaultProgressCallback>;
