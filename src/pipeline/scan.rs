//! Document Scanner: rasterise PDF pages at the protocol DPI via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations.
//!
//! ## Why scale by DPI, not by a pixel cap?
//!
//! Symbol images are embedded at exactly `symbol size × dpi` pixels. Rendering
//! the page at that same DPI maps every embedded pixel onto one raster pixel,
//! so module edges stay sharp. Pages are rendered one at a time and handed to
//! the caller through a bounded channel, keeping at most a few full-page
//! rasters in memory.

use crate::error::{PageError, QrVaultError};
use crate::pipeline::engine;
use crate::pipeline::layout::POINTS_PER_INCH;
use image::GrayImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One rasterised page, or why it could not be rasterised.
pub type RasterResult = Result<(usize, GrayImage), PageError>;

fn load<'a>(pdfium: &'a Pdfium, pdf_path: &Path) -> Result<PdfDocument<'a>, QrVaultError> {
    pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| QrVaultError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

/// Rasterise every page at `dpi`, sending `(page_number_1based, image)`
/// into a channel with room for `buffer` pages.
///
/// Binding pdfium and opening the document finish before this returns, so
/// their failures come back as the fatal `Err`. Once pages are streaming,
/// per-page failures are sent as [`PageError::RenderFailed`] and the scan
/// continues with the next page.
pub async fn rasterize_pages(
    pdf_path: &Path,
    dpi: u32,
    buffer: usize,
) -> Result<mpsc::Receiver<RasterResult>, QrVaultError> {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let (opened_tx, opened_rx) = oneshot::channel();
    let path: PathBuf = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || rasterize_pages_blocking(&path, dpi, opened_tx, &tx));

    opened_rx
        .await
        .map_err(|_| QrVaultError::Internal("Scanner task ended before opening the document".into()))??;
    Ok(rx)
}

/// Blocking implementation of page rasterisation.
///
/// Reports the outcome of binding and loading on `opened` before sending
/// any page.
fn rasterize_pages_blocking(
    pdf_path: &Path,
    dpi: u32,
    opened: oneshot::Sender<Result<(), QrVaultError>>,
    tx: &mpsc::Sender<RasterResult>,
) {
    let pdfium = match engine::bind() {
        Ok(pdfium) => pdfium,
        Err(e) => {
            warn!("Scan aborted: {}", e);
            let _ = opened.send(Err(e));
            return;
        }
    };
    let document = match load(&pdfium, pdf_path) {
        Ok(document) => document,
        Err(e) => {
            warn!("Scan aborted: {}", e);
            let _ = opened.send(Err(e));
            return;
        }
    };
    if opened.send(Ok(())).is_err() {
        return;
    }

    let pages = document.pages();
    info!("Scanning {} pages at {} DPI", pages.len(), dpi);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / POINTS_PER_INCH);

    for (idx, page) in pages.iter().enumerate() {
        let number = idx + 1;
        let item = page
            .render_with_config(&render_config)
            .map(|bitmap| {
                let image = bitmap.as_image().to_luma8();
                debug!(
                    "Rendered page {} → {}x{} px",
                    number,
                    image.width(),
                    image.height()
                );
                (number, image)
            })
            .map_err(|e| PageError::RenderFailed {
                page: number,
                detail: format!("{:?}", e),
            });

        if tx.blocking_send(item).is_err() {
            debug!("Scan receiver dropped after page {}", number);
            break;
        }
    }
}
