//! Document Writer: composed [`Page`]s → PDF bytes.
//!
//! Page order in the output is exactly the order of `pages`; with positional
//! chunks that order is the only thing that says which chunk comes next.

use crate::error::QrVaultError;
use crate::pipeline::engine;
use crate::pipeline::layout::Page;
use crate::pipeline::properties::DocumentProperties;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

const MARK_STROKE_PT: f32 = 0.5;

/// Write `pages` to a PDF and stamp `properties` into it.
///
/// pdfium runs inside `spawn_blocking`: it is CPU-bound and not async-safe.
pub async fn write_document(
    pages: Vec<Page>,
    properties: DocumentProperties,
) -> Result<Vec<u8>, QrVaultError> {
    let pdf = tokio::task::spawn_blocking(move || write_document_blocking(&pages))
        .await
        .map_err(|e| QrVaultError::Internal(format!("Writer task panicked: {}", e)))??;

    properties.stamp(&pdf)
}

/// Blocking implementation of document writing.
fn write_document_blocking(pages: &[Page]) -> Result<Vec<u8>, QrVaultError> {
    let failed = |what: &'static str| {
        move |e: PdfiumError| QrVaultError::DocumentWriteFailed(format!("{what}: {e:?}"))
    };

    let pdfium = engine::bind()?;
    let mut document = pdfium
        .create_new_pdf()
        .map_err(failed("creating document"))?;
    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();
    let black = PdfColor::new(0, 0, 0, 255);

    for page in pages {
        let size = PdfPagePaperSize::Custom(PdfPoints::new(page.width), PdfPoints::new(page.height));
        let mut pdf_page = document
            .pages_mut()
            .create_page_at_end(size)
            .map_err(failed("adding page"))?;
        let objects = pdf_page.objects_mut();

        for symbol in &page.symbols {
            let image = DynamicImage::ImageLuma8(symbol.image.clone());
            objects
                .create_image_object(
                    PdfPoints::new(symbol.rect.x),
                    PdfPoints::new(symbol.rect.y),
                    &image,
                    Some(PdfPoints::new(symbol.rect.width)),
                    Some(PdfPoints::new(symbol.rect.height)),
                )
                .map_err(failed("placing symbol"))?;
            debug!(
                "Page {}: chunk {} in slot {}",
                page.number, symbol.index, symbol.slot
            );
        }

        for line in &page.text {
            objects
                .create_text_object(
                    PdfPoints::new(line.x),
                    PdfPoints::new(line.y),
                    &line.text,
                    if line.bold { bold } else { regular },
                    PdfPoints::new(line.size),
                )
                .map_err(failed("placing text"))?;
        }

        for mark in &page.marks {
            objects
                .create_path_object_line(
                    PdfPoints::new(mark.from.0),
                    PdfPoints::new(mark.from.1),
                    PdfPoints::new(mark.to.0),
                    PdfPoints::new(mark.to.1),
                    black,
                    PdfPoints::new(MARK_STROKE_PT),
                )
                .map_err(failed("drawing crop mark"))?;
        }
    }

    let bytes = document.save_to_bytes().map_err(failed("saving"))?;
    info!("Wrote {} pages ({} bytes)", pages.len(), bytes.len());
    Ok(bytes)
}
