//! Decode entry points: QR document → payload.
//!
//! The document is rasterised at the DPI it was written for, every page is
//! searched for symbols, each symbol is given its chunk position, and the
//! reassembler refuses to return anything unless every position in
//! `[0, expected)` was recovered.
//!
//! A page that yields nothing is a [`PageError`], not a failure of the run;
//! it only becomes fatal when the positions it carried turn out to be needed.

use crate::config::{DecodeConfig, MAX_DPI, MIN_DPI};
use crate::error::{PageError, QrVaultError};
use crate::output::{write_atomic, DecodeOutput, DecodeStats, DocumentInfo, PageScan, RecoveredSymbol};
use crate::pipeline::chunk::parse_indexed;
use crate::pipeline::layout::LayoutPolicy;
use crate::pipeline::properties::{self, DocumentProperties};
use crate::pipeline::reassemble::{expected_chunks, reassemble};
use crate::pipeline::source;
use crate::pipeline::symbol::SymbolScan;
use crate::stream::scan_pages;
use futures::StreamExt;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a document will be scanned: from its stamped properties, or from the
/// fallbacks in [`DecodeConfig`] when it carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanPlan {
    pub dpi: u32,
    pub layout: LayoutPolicy,
    pub metadata_page: bool,
    /// `Some(true)`: every symbol must carry an index prefix.
    /// `None`: use a prefix when a symbol has one.
    pub indexed: Option<bool>,
    /// Chunk count recorded by the writer.
    pub expected_chunks: Option<usize>,
}

impl ScanPlan {
    /// Combine the document's properties with the caller's configuration.
    pub fn resolve(
        path: &Path,
        properties: Option<DocumentProperties>,
        config: &DecodeConfig,
    ) -> Result<Self, QrVaultError> {
        let Some(p) = properties else {
            let dpi = config.dpi.unwrap_or(config.fallback_dpi);
            warn!(
                "No protocol properties in '{}'; assuming {} layout ({} per page), {} DPI, metadata page: {}",
                path.display(),
                config.fallback_layout.name(),
                config.fallback_layout.slots_per_page(),
                dpi,
                config.fallback_metadata_page
            );
            return Ok(Self {
                dpi,
                layout: config.fallback_layout,
                metadata_page: config.fallback_metadata_page,
                indexed: None,
                expected_chunks: None,
            });
        };

        if !(MIN_DPI..=MAX_DPI).contains(&p.dpi) {
            return Err(QrVaultError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("recorded resolution {} DPI is out of range", p.dpi),
            });
        }
        if let Some(requested) = config.dpi {
            if requested != p.dpi {
                return Err(QrVaultError::ResolutionMismatch {
                    path: path.to_path_buf(),
                    written: p.dpi,
                    requested,
                });
            }
        }
        debug!("Document properties: {:?}", p);
        Ok(Self {
            dpi: p.dpi,
            layout: p.layout,
            metadata_page: p.metadata_page,
            indexed: Some(p.indexed),
            expected_chunks: Some(p.chunk_count),
        })
    }

    /// 1-indexed page where data symbols start.
    pub fn first_data_page(&self) -> usize {
        if self.metadata_page {
            2
        } else {
            1
        }
    }

    /// 1-indexed page chunk `index` is printed on.
    pub fn page_of(&self, index: usize) -> usize {
        self.first_data_page() + self.layout.locate(index).0
    }

    /// First chunk position `page` carries, or `None` for the metadata page.
    pub fn first_position(&self, page: usize) -> Option<usize> {
        page.checked_sub(self.first_data_page())
            .map(|data_page| self.layout.position(data_page, 0))
    }

    /// Assign chunk positions to the symbols found on `page`, whose raster
    /// measured `width × height` pixels.
    pub fn locate_symbols(&self, page: usize, (width, height): (u32, u32), found: SymbolScan) -> PageScan {
        let mut scan = PageScan {
            page,
            ..Default::default()
        };

        let Some(data_page) = page.checked_sub(self.first_data_page()) else {
            if !found.symbols.is_empty() {
                scan.errors.push(PageError::MetadataPageSymbol { page });
            }
            return scan;
        };

        for symbol in found.symbols {
            let slot = self.layout.slot_at(
                symbol.center.0 / width.max(1) as f32,
                symbol.center.1 / height.max(1) as f32,
            );
            let prefixed = parse_indexed(&symbol.text).map(|(i, t)| (i, t.to_string()));
            let (index, text) = match (self.indexed, prefixed) {
                (Some(false), _) | (None, None) => {
                    (self.layout.position(data_page, slot), symbol.text)
                }
                (_, Some(found)) => found,
                (Some(true), None) => {
                    scan.errors.push(PageError::UnreadableSymbol {
                        page,
                        detail: format!("slot {slot}: missing index prefix"),
                    });
                    continue;
                }
            };
            debug!("Page {} slot {} → chunk {}", page, slot, index);
            scan.symbols.push(RecoveredSymbol {
                index,
                page,
                slot,
                text,
            });
        }

        scan.errors.extend(
            found
                .failures
                .into_iter()
                .map(|detail| PageError::UnreadableSymbol { page, detail }),
        );
        if scan.symbols.is_empty() && scan.errors.is_empty() {
            scan.errors.push(PageError::SymbolNotFound { page });
        }
        scan
    }
}

/// Recover the payload from a QR document.
///
/// # Errors
/// Fatal errors only: unreadable or non-PDF input, a resolution mismatch,
/// pdfium missing or refusing the document, a missing or conflicting chunk,
/// or a payload that does not decode.
/// Pages without a readable symbol are reported in
/// [`DecodeOutput::page_errors`].
pub async fn decode(
    input: impl AsRef<Path>,
    config: &DecodeConfig,
) -> Result<DecodeOutput, QrVaultError> {
    let total_start = Instant::now();
    let path = input.as_ref();
    info!("Starting decode: {}", path.display());

    let (plan, total_pages) = plan_scan(path, config).await?;

    let scan_start = Instant::now();
    let pages = scan_pages(path, Arc::new(plan), total_pages, config).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(total_pages);
    }
    let mut scans: Vec<PageScan> = pages.collect().await;
    scans.sort_by_key(|s| s.page);
    let scan_duration_ms = scan_start.elapsed().as_millis() as u64;

    let recovered: Vec<RecoveredSymbol> = scans.iter().flat_map(|s| s.symbols.clone()).collect();
    let page_errors: Vec<PageError> = scans.iter().flat_map(|s| s.errors.clone()).collect();
    let failed_positions: Vec<usize> = scans
        .iter()
        .filter(|s| s.symbols.is_empty())
        .filter_map(|s| plan.first_position(s.page))
        .collect();
    let data_pages = total_pages.saturating_sub(plan.first_data_page() - 1);

    info!(
        "Scanned {} pages in {}ms: {} symbols, {} page problems",
        total_pages,
        scan_duration_ms,
        recovered.len(),
        page_errors.len()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_complete(total_pages, recovered.len());
    }

    let expected = expected_chunks(plan.expected_chunks, &recovered, &failed_positions);
    if expected == 0 {
        warn!("No QR codes found in '{}'", path.display());
        return Err(QrVaultError::MissingChunk {
            index: 0,
            page: plan.first_data_page(),
        });
    }

    let payload = reassemble(&recovered, expected, |i| plan.page_of(i))?;

    let stats = DecodeStats {
        total_pages,
        data_pages,
        symbols_recovered: recovered.len(),
        expected_chunks: expected,
        failed_pages: scans.iter().filter(|s| !s.errors.is_empty()).count(),
        payload_size: payload.len(),
        scan_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Decode complete: {} chunks → {} bytes, {}ms total",
        expected, stats.payload_size, stats.total_duration_ms
    );

    Ok(DecodeOutput {
        payload,
        stats,
        page_errors,
    })
}

/// Decode `input` and write the payload atomically to `output_path`.
///
/// Nothing is written unless reconstruction succeeds.
pub async fn decode_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &DecodeConfig,
) -> Result<DecodeOutput, QrVaultError> {
    let output = decode(input, config).await?;
    write_atomic(output_path.as_ref(), &output.payload).await?;
    info!("Wrote {}", output_path.as_ref().display());
    Ok(output)
}

/// Synchronous wrapper around [`decode`].
///
/// Creates a temporary tokio runtime internally.
pub fn decode_sync(
    input: impl AsRef<Path>,
    config: &DecodeConfig,
) -> Result<DecodeOutput, QrVaultError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| QrVaultError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(decode(input, config))
}

/// Report a document's page count and protocol properties without scanning.
///
/// Does not require the pdfium library.
pub async fn inspect(input: impl AsRef<Path>) -> Result<DocumentInfo, QrVaultError> {
    let path = input.as_ref();
    let bytes = source::read_pdf(path).await?;
    properties::inspect(path, &bytes)
}

/// Read the document once: validate it, resolve the plan, count pages.
pub(crate) async fn plan_scan(
    path: &Path,
    config: &DecodeConfig,
) -> Result<(ScanPlan, usize), QrVaultError> {
    let info = inspect(path).await?;
    let plan = ScanPlan::resolve(path, info.properties, config)?;
    info!(
        "PDF has {} pages; scanning at {} DPI with {} layout",
        info.page_count,
        plan.dpi,
        plan.layout.name()
    );
    Ok((plan, info.page_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::symbol::DecodedSymbol;

    const PAGE_PX: (u32, u32) = (850, 1100);

    fn plan(indexed: Option<bool>) -> ScanPlan {
        ScanPlan {
            dpi: 100,
            layout: LayoutPolicy::Stacked { rows: 2 },
            metadata_page: true,
            indexed,
            expected_chunks: None,
        }
    }

    fn found(symbols: &[(&str, f32)]) -> SymbolScan {
        SymbolScan {
            symbols: symbols
                .iter()
                .map(|(text, fy)| DecodedSymbol {
                    text: text.to_string(),
                    center: (425.0, fy * 1100.0),
                })
                .collect(),
            failures: Vec::new(),
        }
    }

    fn props(dpi: u32) -> DocumentProperties {
        DocumentProperties {
            dpi,
            layout: LayoutPolicy::Single,
            chunk_count: 3,
            chunk_size: 1000,
            metadata_page: false,
            indexed: false,
        }
    }

    #[test]
    fn geometry_gives_positions() {
        let scan = plan(Some(false)).locate_symbols(3, PAGE_PX, found(&[("AAAA", 0.3), ("BBBB", 0.7)]));
        let placed: Vec<(usize, usize)> = scan.symbols.iter().map(|s| (s.index, s.slot)).collect();
        // Page 3 is the second data page.
        assert_eq!(placed, vec![(2, 0), (3, 1)]);
        assert!(scan.errors.is_empty());
    }

    #[test]
    fn lone_bottom_symbol_keeps_its_slot() {
        let scan = plan(Some(false)).locate_symbols(2, PAGE_PX, found(&[("BBBB", 0.7)]));
        assert_eq!(scan.symbols[0].index, 1);
    }

    #[test]
    fn metadata_page_symbols_are_ignored() {
        let scan = plan(None).locate_symbols(1, PAGE_PX, found(&[("AAAA", 0.3)]));
        assert!(scan.symbols.is_empty());
        assert_eq!(scan.errors, vec![PageError::MetadataPageSymbol { page: 1 }]);

        let empty = plan(None).locate_symbols(1, PAGE_PX, SymbolScan::default());
        assert!(empty.errors.is_empty());
    }

    #[test]
    fn index_prefix_overrides_geometry() {
        let scan = plan(Some(true)).locate_symbols(2, PAGE_PX, found(&[("000042:QUJD", 0.3)]));
        assert_eq!(scan.symbols[0].index, 42);
        assert_eq!(scan.symbols[0].text, "QUJD");

        let detected = plan(None).locate_symbols(2, PAGE_PX, found(&[("000007:QUJD", 0.7)]));
        assert_eq!(detected.symbols[0].index, 7);
    }

    #[test]
    fn required_prefix_missing_is_unreadable() {
        let scan = plan(Some(true)).locate_symbols(2, PAGE_PX, found(&[("QUJD", 0.3)]));
        assert!(scan.symbols.is_empty());
        assert!(matches!(scan.errors[0], PageError::UnreadableSymbol { page: 2, .. }));
    }

    #[test]
    fn empty_data_page_is_symbol_not_found() {
        let scan = plan(None).locate_symbols(4, PAGE_PX, SymbolScan::default());
        assert_eq!(scan.errors, vec![PageError::SymbolNotFound { page: 4 }]);

        let failed = SymbolScan {
            symbols: Vec::new(),
            failures: vec!["ecc".into()],
        };
        let scan = plan(None).locate_symbols(4, PAGE_PX, failed);
        assert!(matches!(scan.errors.as_slice(), [PageError::UnreadableSymbol { .. }]));
    }

    #[test]
    fn positions_map_back_to_pages() {
        let p = plan(None);
        assert_eq!(p.first_position(1), None);
        assert_eq!(p.first_position(2), Some(0));
        assert_eq!(p.first_position(4), Some(4));
        assert_eq!(p.page_of(5), 4);
    }

    #[test]
    fn explicit_dpi_must_match_the_document() {
        let config = DecodeConfig::builder().dpi(150).build().unwrap();
        assert!(matches!(
            ScanPlan::resolve(Path::new("a.pdf"), Some(props(300)), &config),
            Err(QrVaultError::ResolutionMismatch {
                written: 300,
                requested: 150,
                ..
            })
        ));
        let plan = ScanPlan::resolve(Path::new("a.pdf"), Some(props(150)), &config).unwrap();
        assert_eq!(plan.expected_chunks, Some(3));
        assert_eq!(plan.indexed, Some(false));
    }

    #[test]
    fn fallbacks_apply_without_properties() {
        let config = DecodeConfig::builder()
            .fallback_layout(LayoutPolicy::Single)
            .fallback_dpi(200)
            .build()
            .unwrap();
        let plan = ScanPlan::resolve(Path::new("scan.pdf"), None, &config).unwrap();
        assert_eq!(plan.dpi, 200);
        assert_eq!(plan.layout, LayoutPolicy::Single);
        assert!(!plan.metadata_page);
        assert_eq!(plan.indexed, None);
        assert_eq!(plan.expected_chunks, None);
    }

    #[test]
    fn out_of_range_recorded_dpi_is_corrupt() {
        let config = DecodeConfig::default();
        assert!(matches!(
            ScanPlan::resolve(Path::new("a.pdf"), Some(props(5)), &config),
            Err(QrVaultError::CorruptPdf { .. })
        ));
    }

    #[tokio::test]
    async fn inspect_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert!(matches!(
            inspect(&path).await,
            Err(QrVaultError::NotAPdf { .. })
        ));
    }
}
