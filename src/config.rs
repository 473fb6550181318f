//! Configuration types for encoding and decoding.
//!
//! Encoding is controlled through [`EncodeConfig`], decoding through
//! [`DecodeConfig`], each built via its builder. `build()` validates every
//! knob so a bad value fails before any work starts.
//!
//! Several encode defaults depend on the layout: the chunk size and whether a
//! metadata page is printed. The builder resolves them in `build()`, so
//! setting `.layout(..)` after `.chunk_size(..)` never discards an explicit
//! choice.

use crate::error::QrVaultError;
use crate::pipeline::chunk::{INDEX_PREFIX_LEN, QR_MAX_BYTES_ECC_H};
use crate::pipeline::layout::LayoutPolicy;
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::fmt;

/// Lowest supported protocol resolution.
pub const MIN_DPI: u32 = 72;
/// Highest supported protocol resolution.
pub const MAX_DPI: u32 = 600;
/// Default protocol resolution.
pub const DEFAULT_DPI: u32 = 300;

/// Configuration for turning a payload into a QR document.
///
/// # Example
/// ```rust
/// use edgequake_qrvault::{EncodeConfig, LayoutPolicy};
///
/// let config = EncodeConfig::builder()
///     .layout(LayoutPolicy::Single)
///     .dpi(300)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 1000);
/// assert!(!config.metadata_page);
/// ```
#[derive(Clone, Serialize)]
pub struct EncodeConfig {
    /// Arrangement of symbols on data pages. Fixed for a run.
    pub layout: LayoutPolicy,

    /// Base64 characters per symbol. Default: 1000 for `Single`, 800 for `Stacked`.
    ///
    /// Larger chunks mean fewer pages but denser symbols that are harder to
    /// scan from paper. Together with the index prefix it must fit a
    /// version-40 symbol at error-correction level H.
    pub chunk_size: usize,

    /// Protocol resolution in dots per inch. Range 72–600. Default: 300.
    ///
    /// Symbol images are rendered at `physical size × dpi` pixels, and the
    /// scanner rasterises at the same value, which is recorded in the document.
    pub dpi: u32,

    /// Symbols rendered in parallel. Default: 1.
    pub concurrency: usize,

    /// Prepend a statistics and instructions page. Default: `true` for `Stacked`.
    pub metadata_page: bool,

    /// Prefix every symbol with a fixed-width `NNNNNN:` position. Default: false.
    pub indexed_chunks: bool,

    /// Inline `<img>` tags of fetched web pages as data URIs. Default: true.
    pub inline_images: bool,

    /// Timeout for fetching a URL payload, in seconds. Default: 30.
    pub download_timeout_secs: u64,

    /// Timeout for each inlined image, in seconds. Default: 5.
    pub image_timeout_secs: u64,

    /// Receives per-symbol progress events.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        let layout = LayoutPolicy::default();
        Self {
            layout,
            chunk_size: layout.default_chunk_size(),
            dpi: DEFAULT_DPI,
            concurrency: 1,
            metadata_page: layout.default_metadata_page(),
            indexed_chunks: false,
            inline_images: true,
            download_timeout_secs: 30,
            image_timeout_secs: 5,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EncodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeConfig")
            .field("layout", &self.layout)
            .field("chunk_size", &self.chunk_size)
            .field("dpi", &self.dpi)
            .field("concurrency", &self.concurrency)
            .field("metadata_page", &self.metadata_page)
            .field("indexed_chunks", &self.indexed_chunks)
            .field("inline_images", &self.inline_images)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn VaultProgressCallback>"),
            )
            .finish()
    }
}

impl EncodeConfig {
    /// Create a new builder for `EncodeConfig`.
    pub fn builder() -> EncodeConfigBuilder {
        EncodeConfigBuilder {
            config: Self::default(),
            chunk_size: None,
            metadata_page: None,
        }
    }

    /// Bytes each symbol carries, index prefix included.
    pub fn symbol_capacity(&self) -> usize {
        self.chunk_size + if self.indexed_chunks { INDEX_PREFIX_LEN } else { 0 }
    }
}

/// Builder for [`EncodeConfig`].
pub struct EncodeConfigBuilder {
    config: EncodeConfig,
    chunk_size: Option<usize>,
    metadata_page: Option<bool>,
}

impl EncodeConfigBuilder {
    pub fn layout(mut self, layout: LayoutPolicy) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn metadata_page(mut self, v: bool) -> Self {
        self.metadata_page = Some(v);
        self
    }

    pub fn indexed_chunks(mut self, v: bool) -> Self {
        self.config.indexed_chunks = v;
        self
    }

    pub fn inline_images(mut self, v: bool) -> Self {
        self.config.inline_images = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EncodeConfig, QrVaultError> {
        let mut c = self.config;
        c.chunk_size = self.chunk_size.unwrap_or(c.layout.default_chunk_size());
        c.metadata_page = self
            .metadata_page
            .unwrap_or(c.layout.default_metadata_page());

        validate_dpi(c.dpi)?;
        validate_layout(c.layout)?;
        if c.chunk_size == 0 {
            return Err(QrVaultError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.symbol_capacity() > QR_MAX_BYTES_ECC_H {
            return Err(QrVaultError::InvalidConfig(format!(
                "Chunk size {} (plus {} index bytes) exceeds the {} bytes a QR symbol holds at level H",
                c.chunk_size,
                c.symbol_capacity() - c.chunk_size,
                QR_MAX_BYTES_ECC_H
            )));
        }
        if c.download_timeout_secs == 0 || c.image_timeout_secs == 0 {
            return Err(QrVaultError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(c)
    }
}

/// Configuration for recovering a payload from a QR document.
///
/// Protocol parameters normally come from the document itself; the
/// `fallback_*` fields apply only to PDFs that do not carry them, such as a
/// re-scanned printout.
#[derive(Clone, Serialize)]
pub struct DecodeConfig {
    /// Scan resolution. Default: the resolution recorded in the document.
    ///
    /// An explicit value that differs from the recorded one is rejected.
    pub dpi: Option<u32>,

    /// Layout assumed when the document records none. Default: `Stacked { rows: 2 }`.
    pub fallback_layout: LayoutPolicy,

    /// Resolution assumed when the document records none. Default: 300.
    pub fallback_dpi: u32,

    /// Whether page 1 is a metadata page when the document does not say.
    /// Default: the layout's usual choice.
    pub fallback_metadata_page: bool,

    /// Pages decoded in parallel. Default: 4.
    pub concurrency: usize,

    /// Receives per-page progress events.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        let layout = LayoutPolicy::default();
        Self {
            dpi: None,
            fallback_layout: layout,
            fallback_dpi: DEFAULT_DPI,
            fallback_metadata_page: layout.default_metadata_page(),
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DecodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeConfig")
            .field("dpi", &self.dpi)
            .field("fallback_layout", &self.fallback_layout)
            .field("fallback_dpi", &self.fallback_dpi)
            .field("fallback_metadata_page", &self.fallback_metadata_page)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn VaultProgressCallback>"),
            )
            .finish()
    }
}

impl DecodeConfig {
    /// Create a new builder for `DecodeConfig`.
    pub fn builder() -> DecodeConfigBuilder {
        DecodeConfigBuilder {
            config: Self::default(),
            fallback_metadata_page: None,
        }
    }
}

/// Builder for [`DecodeConfig`].
pub struct DecodeConfigBuilder {
    config: DecodeConfig,
    fallback_metadata_page: Option<bool>,
}

impl DecodeConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = Some(dpi);
        self
    }

    pub fn fallback_layout(mut self, layout: LayoutPolicy) -> Self {
        self.config.fallback_layout = layout;
        self
    }

    pub fn fallback_dpi(mut self, dpi: u32) -> Self {
        self.config.fallback_dpi = dpi;
        self
    }

    pub fn fallback_metadata_page(mut self, v: bool) -> Self {
        self.fallback_metadata_page = Some(v);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DecodeConfig, QrVaultError> {
        let mut c = self.config;
        c.fallback_metadata_page = self
            .fallback_metadata_page
            .unwrap_or(c.fallback_layout.default_metadata_page());

        if let Some(dpi) = c.dpi {
            validate_dpi(dpi)?;
        }
        validate_dpi(c.fallback_dpi)?;
        validate_layout(c.fallback_layout)?;
        Ok(c)
    }
}

fn validate_dpi(dpi: u32) -> Result<(), QrVaultError> {
    if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
        return Err(QrVaultError::InvalidConfig(format!(
            "DPI must be {MIN_DPI}–{MAX_DPI}, got {dpi}"
        )));
    }
    Ok(())
}

fn validate_layout(layout: LayoutPolicy) -> Result<(), QrVaultError> {
    if let LayoutPolicy::Stacked { rows } = layout {
        let max = LayoutPolicy::max_stacked_rows();
        if rows == 0 || rows > max {
            return Err(QrVaultError::InvalidConfig(format!(
                "Stacked layout fits 1–{max} rows per page, got {rows}"
            )));
        }
    }
    Ok(())
}
