//! Streaming scan API: emit each page's symbols as soon as it is decoded.
//!
//! Unlike the eager [`crate::decode::decode`], which returns only after the
//! whole document has been scanned and reassembled, [`scan_stream`] yields a
//! [`PageScan`] per page as its symbols are located. Pages may arrive out of
//! order when `concurrency > 1`; every item carries its page number and every
//! symbol its chunk position, so callers can sort or index as they go.

use crate::config::DecodeConfig;
use crate::decode::{plan_scan, ScanPlan};
use crate::error::{PageError, QrVaultError};
use crate::output::PageScan;
use crate::pipeline::{scan, symbol};
use crate::progress::ProgressCallback;
use futures::stream::StreamExt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of per-page scan results.
pub type PageScanStream = Pin<Box<dyn Stream<Item = PageScan> + Send>>;

/// Scan a QR document, streaming page results as they are ready.
///
/// # Returns
/// - `Ok((plan, stream))`: the resolved scan plan and one [`PageScan`] per page
/// - `Err(QrVaultError)`: fatal error (file not found, not a PDF, resolution
///   mismatch, pdfium missing or unable to open the document)
///
/// # Example
/// ```rust,no_run
/// use edgequake_qrvault::{scan_stream, DecodeConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (plan, mut pages) = scan_stream("vault.pdf", &DecodeConfig::default()).await?;
/// println!("expecting {:?} chunks", plan.expected_chunks);
/// while let Some(page) = pages.next().await {
///     for s in &page.symbols {
///         println!("page {} slot {} → chunk {}", page.page, s.slot, s.index);
///     }
///     for e in &page.errors {
///         eprintln!("{e}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn scan_stream(
    input: impl AsRef<Path>,
    config: &DecodeConfig,
) -> Result<(ScanPlan, PageScanStream), QrVaultError> {
    let path = input.as_ref();
    info!("Starting streaming scan: {}", path.display());

    let (plan, total_pages) = plan_scan(path, config).await?;
    let pages = scan_pages(path, Arc::new(plan), total_pages, config).await?;
    Ok((plan, pages))
}

/// Rasterise pages on a pdfium thread and decode them on a bounded pool.
///
/// Fails before yielding anything when pdfium cannot be bound or the
/// document cannot be opened.
pub(crate) async fn scan_pages(
    path: &Path,
    plan: Arc<ScanPlan>,
    total_pages: usize,
    config: &DecodeConfig,
) -> Result<PageScanStream, QrVaultError> {
    let rasters = scan::rasterize_pages(path, plan.dpi, config.concurrency).await?;
    let callback = config.progress_callback.clone();

    let s = ReceiverStream::new(rasters)
        .map(move |raster| {
            let plan = Arc::clone(&plan);
            let callback = callback.clone();
            async move {
                let page_scan = match raster {
                    Ok((page, image)) => {
                        let dims = image.dimensions();
                        match tokio::task::spawn_blocking(move || symbol::decode_symbols(&image))
                            .await
                        {
                            Ok(found) => plan.locate_symbols(page, dims, found),
                            Err(e) => PageScan {
                                page,
                                symbols: Vec::new(),
                                errors: vec![PageError::UnreadableSymbol {
                                    page,
                                    detail: format!("decoder task panicked: {e}"),
                                }],
                            },
                        }
                    }
                    Err(e) => PageScan {
                        page: e.page(),
                        symbols: Vec::new(),
                        errors: vec![e],
                    },
                };
                report(callback.as_ref(), &page_scan, total_pages);
                page_scan
            }
        })
        .buffer_unordered(config.concurrency);

    Ok(Box::pin(s))
}

/// Log every skipped unit with its page, and forward to the callback.
fn report(callback: Option<&ProgressCallback>, page_scan: &PageScan, total_pages: usize) {
    debug!(
        "Page {}/{}: {} symbols",
        page_scan.page,
        total_pages,
        page_scan.symbols.len()
    );
    for e in &page_scan.errors {
        warn!("{}", e);
    }
    if let Some(cb) = callback {
        cb.on_page_scanned(page_scan.page, total_pages, page_scan.symbols.len());
        for e in &page_scan.errors {
            cb.on_page_error(page_scan.page, total_pages, &e.to_string());
        }
    }
}
