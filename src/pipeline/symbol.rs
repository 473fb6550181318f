//! QR Renderer and Symbol Decoder.
//!
//! Rendering is pure: one chunk in, one square grayscale image out. The
//! symbol is built at error-correction level H (about 30% of the symbol may
//! be damaged), with the standard 4-module quiet zone, at one pixel per
//! module, then upscaled with nearest-neighbour sampling only. Any smoothing
//! filter would blur module edges and hurt the scan.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode};
use rqrr::PreparedImage;
use tracing::debug;

/// Quiet-zone width around each symbol, in modules.
pub const QUIET_ZONE_MODULES: u32 = 4;

/// Render `data` as a QR symbol scaled to `pixel_size × pixel_size`.
///
/// The version is chosen automatically. When `pixel_size` is smaller than the
/// symbol's module count the image is left at one pixel per module rather
/// than being downsampled and losing modules.
pub fn render(data: &str, pixel_size: u32) -> Result<GrayImage, QrError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)?;
    let native = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .module_dimensions(1, 1)
        .build();

    let target = pixel_size.max(native.width());
    debug!(
        "QR version {:?}: {} modules → {} px",
        code.version(),
        native.width(),
        target
    );
    Ok(imageops::resize(&native, target, target, FilterType::Nearest))
}

/// A symbol recovered from a raster image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSymbol {
    pub text: String,
    /// Centre of the symbol's corner quadrilateral, in image pixels.
    pub center: (f32, f32),
}

/// Everything a single raster yielded.
#[derive(Debug, Default)]
pub struct SymbolScan {
    /// Successfully decoded symbols, top-to-bottom then left-to-right.
    pub symbols: Vec<DecodedSymbol>,
    /// Reasons for grids that were detected but could not be decoded.
    pub failures: Vec<String>,
}

/// Find and decode every QR symbol in `image`.
pub fn decode_symbols(image: &GrayImage) -> SymbolScan {
    let mut prepared = PreparedImage::prepare(image.clone());
    let grids = prepared.detect_grids();

    let mut scan = SymbolScan::default();
    for grid in grids {
        let (sx, sy) = grid
            .bounds
            .iter()
            .fold((0.0f32, 0.0f32), |(x, y), p| (x + p.x as f32, y + p.y as f32));
        let center = (sx / 4.0, sy / 4.0);

        match grid.decode() {
            Ok((_meta, text)) => scan.symbols.push(DecodedSymbol { text, center }),
            Err(e) => scan.failures.push(format!("{e:?} at ({:.0}, {:.0})", center.0, center.1)),
        }
    }

    scan.symbols.sort_by(|a, b| {
        a.center
            .1
            .total_cmp(&b.center.1)
            .then(a.center.0.total_cmp(&b.center.0))
    });
    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_square_and_sized() {
        let img = render("hello world", 300).unwrap();
        assert_eq!(img.dimensions(), (300, 300));
    }

    #[test]
    fn render_only_uses_black_and_white() {
        let img = render("eJzLSM3JyVcozy/KSQEAGgQEXQ==", 250).unwrap();
        assert!(img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn small_pixel_size_keeps_one_pixel_per_module() {
        let img = render(&"A".repeat(200), 10).unwrap();
        assert!(img.width() > 10);
        assert_eq!(img.width(), img.height());
    }

    #[test]
    fn oversized_data_is_rejected() {
        assert!(render(&"x".repeat(1_400), 1_000).is_err());
    }

    #[test]
    fn rendered_symbol_decodes() {
        let text = "eJzLSM3JyVcozy/KSQEAGgQEXQ==";
        let img = render(text, 330).unwrap();
        let scan = decode_symbols(&img);
        assert_eq!(scan.symbols.len(), 1, "failures: {:?}", scan.failures);
        assert_eq!(scan.symbols[0].text, text);
    }

    #[test]
    fn blank_image_has_no_symbols() {
        let blank = GrayImage::from_pixel(200, 200, Luma([255]));
        let scan = decode_symbols(&blank);
        assert!(scan.symbols.is_empty());
    }

    #[test]
    fn symbols_are_returned_top_to_bottom() {
        let top = render("first symbol", 240).unwrap();
        let bottom = render("second symbol", 240).unwrap();
        let mut canvas = GrayImage::from_pixel(300, 560, Luma([255]));
        imageops::overlay(&mut canvas, &bottom, 30, 300);
        imageops::overlay(&mut canvas, &top, 30, 20);

        let scan = decode_symbols(&canvas);
        let texts: Vec<&str> = scan.symbols.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["first symbol", "second symbol"]);
        assert!(scan.symbols[0].center.1 < scan.symbols[1].center.1);
    }
}
