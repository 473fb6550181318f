//! Page Compositor: where each symbol goes on paper.
//!
//! A [`LayoutPolicy`] maps a chunk index to a page and a slot, and a slot
//! to a rectangle in PDF points (origin bottom-left, 72 pt per inch). One
//! policy is chosen per run and recorded in the document, so the scanner
//! uses exactly the geometry the writer used.
//!
//! | Policy | Page | Symbols per page | Furniture |
//! |--------|------|------------------|-----------|
//! | `Single` | 8 in × 8 in | 1, 5.9 in square | `Page N` caption |
//! | `Stacked { rows }` | US Letter | `rows`, 100 mm squares | corner crop marks |
//!
//! [`compose`] produces backend-neutral [`Page`]s. The pdfium writer turns
//! them into PDF objects; [`rasterize`] turns them straight into pixels,
//! which is how previews are made and how the page geometry is tested
//! without a pdfium library.

use crate::output::PayloadStats;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

pub const POINTS_PER_INCH: f32 = 72.0;
const MM_PER_INCH: f32 = 25.4;

const SINGLE_PAGE_IN: f32 = 8.0;
const SINGLE_PADDING_IN: f32 = 0.6;
const SINGLE_BOTTOM_OFFSET_IN: f32 = 0.9;
const CAPTION_FONT_PT: f32 = 10.0;

const LETTER_W_IN: f32 = 8.5;
const LETTER_H_IN: f32 = 11.0;
const STACKED_QR_MM: f32 = 100.0;
const STACKED_MIN_MARGIN_PT: f32 = 20.0;
const CROP_MARK_PT: f32 = 10.0;

/// Average Helvetica advance as a fraction of the font size.
const HELVETICA_AVG_ADVANCE: f32 = 0.55;

/// How symbols are arranged on data pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPolicy {
    /// One large symbol per square page, with a page-number caption.
    Single,
    /// `rows` symbols stacked in a centred block with corner crop marks.
    Stacked { rows: usize },
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        LayoutPolicy::Stacked { rows: 2 }
    }
}

/// Axis-aligned rectangle in PDF points, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// A straight stroke, used for crop marks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub from: (f32, f32),
    pub to: (f32, f32),
}

/// A run of text placed at a baseline position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
}

/// A rendered symbol with its place on the page.
#[derive(Debug, Clone)]
pub struct PlacedSymbol {
    /// Chunk index the image encodes.
    pub index: usize,
    pub slot: usize,
    pub rect: Rect,
    pub image: GrayImage,
}

/// One page of the document, independent of the output backend.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-indexed position in the document.
    pub number: usize,
    pub width: f32,
    pub height: f32,
    pub symbols: Vec<PlacedSymbol>,
    pub text: Vec<TextLine>,
    pub marks: Vec<Line>,
}

impl Page {
    fn blank(number: usize, (width, height): (f32, f32)) -> Self {
        Self {
            number,
            width,
            height,
            symbols: Vec::new(),
            text: Vec::new(),
            marks: Vec::new(),
        }
    }
}

impl LayoutPolicy {
    /// Symbols carried by one data page.
    pub fn slots_per_page(&self) -> usize {
        match self {
            LayoutPolicy::Single => 1,
            LayoutPolicy::Stacked { rows } => (*rows).max(1),
        }
    }

    /// Short name stored in the document properties.
    pub fn name(&self) -> &'static str {
        match self {
            LayoutPolicy::Single => "single",
            LayoutPolicy::Stacked { .. } => "stacked",
        }
    }

    /// Rebuild a policy from its stored name and row count.
    pub fn from_parts(name: &str, rows: usize) -> Option<Self> {
        match name {
            "single" => Some(LayoutPolicy::Single),
            "stacked" if rows >= 1 => Some(LayoutPolicy::Stacked { rows }),
            _ => None,
        }
    }

    /// Chunk size the policy was tuned for.
    pub fn default_chunk_size(&self) -> usize {
        match self {
            LayoutPolicy::Single => 1000,
            LayoutPolicy::Stacked { .. } => 800,
        }
    }

    /// Whether the policy's encoder variant prints a metadata page by default.
    pub fn default_metadata_page(&self) -> bool {
        matches!(self, LayoutPolicy::Stacked { .. })
    }

    /// Page width and height in points.
    pub fn page_size(&self) -> (f32, f32) {
        match self {
            LayoutPolicy::Single => (
                SINGLE_PAGE_IN * POINTS_PER_INCH,
                SINGLE_PAGE_IN * POINTS_PER_INCH,
            ),
            LayoutPolicy::Stacked { .. } => (
                LETTER_W_IN * POINTS_PER_INCH,
                LETTER_H_IN * POINTS_PER_INCH,
            ),
        }
    }

    /// Edge length of one symbol in points.
    pub fn symbol_size(&self) -> f32 {
        match self {
            LayoutPolicy::Single => {
                (SINGLE_PAGE_IN - 2.0 * SINGLE_PADDING_IN - SINGLE_BOTTOM_OFFSET_IN)
                    * POINTS_PER_INCH
            }
            LayoutPolicy::Stacked { .. } => STACKED_QR_MM / MM_PER_INCH * POINTS_PER_INCH,
        }
    }

    /// Edge length of one symbol in pixels at `dpi`.
    pub fn symbol_pixels(&self, dpi: u32) -> u32 {
        (self.symbol_size() / POINTS_PER_INCH * dpi as f32).round() as u32
    }

    /// Largest `rows` a stacked page can hold.
    pub fn max_stacked_rows() -> usize {
        let usable = LETTER_H_IN * POINTS_PER_INCH - 2.0 * STACKED_MIN_MARGIN_PT;
        let qr = STACKED_QR_MM / MM_PER_INCH * POINTS_PER_INCH;
        (usable / qr).floor() as usize
    }

    /// Rectangle occupied by `slot`; slot 0 is the topmost.
    pub fn slot_rect(&self, slot: usize) -> Rect {
        let size = self.symbol_size();
        match self {
            LayoutPolicy::Single => Rect {
                x: SINGLE_PADDING_IN * POINTS_PER_INCH,
                y: (SINGLE_PADDING_IN + SINGLE_BOTTOM_OFFSET_IN) * POINTS_PER_INCH,
                width: size,
                height: size,
            },
            LayoutPolicy::Stacked { .. } => {
                let block = self.block_rect();
                let row = self.slots_per_page() - 1 - slot.min(self.slots_per_page() - 1);
                Rect {
                    x: block.x,
                    y: block.y + row as f32 * size,
                    width: size,
                    height: size,
                }
            }
        }
    }

    /// The centred block holding every slot of a stacked page.
    fn block_rect(&self) -> Rect {
        let (w, h) = self.page_size();
        let size = self.symbol_size();
        let height = size * self.slots_per_page() as f32;
        Rect {
            x: (w - size) / 2.0,
            y: (h - height) / 2.0,
            width: size,
            height,
        }
    }

    /// Crop/registration marks: a small cross on every corner of the block.
    fn crop_marks(&self) -> Vec<Line> {
        if matches!(self, LayoutPolicy::Single) {
            return Vec::new();
        }
        let b = self.block_rect();
        let corners = [
            (b.x, b.y),
            (b.x + b.width, b.y),
            (b.x, b.y + b.height),
            (b.x + b.width, b.y + b.height),
        ];
        corners
            .iter()
            .flat_map(|&(cx, cy)| {
                [
                    Line {
                        from: (cx - CROP_MARK_PT, cy),
                        to: (cx + CROP_MARK_PT, cy),
                    },
                    Line {
                        from: (cx, cy - CROP_MARK_PT),
                        to: (cx, cy + CROP_MARK_PT),
                    },
                ]
            })
            .collect()
    }

    fn caption(&self, page_number: usize) -> Option<TextLine> {
        match self {
            LayoutPolicy::Single => {
                let text = format!("Page {page_number}");
                let (w, _) = self.page_size();
                let padding = SINGLE_PADDING_IN * POINTS_PER_INCH;
                let width = approx_text_width(&text, CAPTION_FONT_PT);
                Some(TextLine {
                    text,
                    x: w - padding - width,
                    y: padding / 2.0,
                    size: CAPTION_FONT_PT,
                    bold: false,
                })
            }
            LayoutPolicy::Stacked { .. } => None,
        }
    }

    /// `(0-indexed data page, slot)` of chunk `index`.
    pub fn locate(&self, index: usize) -> (usize, usize) {
        let slots = self.slots_per_page();
        (index / slots, index % slots)
    }

    /// Inverse of [`LayoutPolicy::locate`].
    pub fn position(&self, data_page: usize, slot: usize) -> usize {
        data_page * self.slots_per_page() + slot
    }

    /// Slot of a symbol centred at `(fx, fy)`, given as fractions of the page
    /// width and height measured from the top-left corner.
    ///
    /// Points inside a slot map to it; anything else maps to the nearest slot
    /// centre.
    pub fn slot_at(&self, fx: f32, fy: f32) -> usize {
        let (w, h) = self.page_size();
        let (x, y) = (fx * w, (1.0 - fy) * h);
        let slots = 0..self.slots_per_page();

        if let Some(slot) = slots.clone().find(|&s| self.slot_rect(s).contains(x, y)) {
            return slot;
        }
        slots
            .min_by(|&a, &b| {
                let da = dist2(self.slot_rect(a).center(), (x, y));
                let db = dist2(self.slot_rect(b).center(), (x, y));
                da.total_cmp(&db)
            })
            .unwrap_or(0)
    }

    /// Place one page's worth of `(index, image)` pairs into their slots.
    pub fn place_images(&self, number: usize, images: Vec<(usize, GrayImage)>) -> Page {
        let mut page = Page::blank(number, self.page_size());
        page.marks = self.crop_marks();
        page.text.extend(self.caption(number));
        page.symbols = images
            .into_iter()
            .map(|(index, image)| {
                let slot = self.locate(index).1;
                PlacedSymbol {
                    index,
                    slot,
                    rect: self.slot_rect(slot),
                    image,
                }
            })
            .collect();
        page
    }
}

fn dist2(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}

fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * HELVETICA_AVG_ADVANCE
}

/// Arrange rendered symbols (in chunk order) into pages.
///
/// With a `metadata` sheet the sheet becomes page 1 and data starts on page 2.
pub fn compose(
    policy: LayoutPolicy,
    symbols: Vec<GrayImage>,
    metadata: Option<Vec<TextLine>>,
) -> Vec<Page> {
    let mut pages = Vec::new();
    if let Some(lines) = metadata {
        let mut sheet = Page::blank(1, policy.page_size());
        sheet.text = lines;
        pages.push(sheet);
    }

    let slots = policy.slots_per_page();
    let mut pending = symbols.into_iter().enumerate().peekable();
    while pending.peek().is_some() {
        let group: Vec<(usize, GrayImage)> = pending.by_ref().take(slots).collect();
        let number = pages.len() + 1;
        pages.push(policy.place_images(number, group));
    }
    pages
}

/// Human-readable statistics and decoding instructions for page 1.
pub fn metadata_sheet(
    policy: LayoutPolicy,
    stats: &PayloadStats,
    dpi: u32,
    indexed: bool,
) -> Vec<TextLine> {
    let (_, h) = policy.page_size();
    let x = POINTS_PER_INCH / 2.0;
    let mut y = h - POINTS_PER_INCH;
    let mut lines = Vec::new();
    let mut push = |text: String, size: f32, bold: bool, advance: f32, y: &mut f32| {
        lines.push(TextLine {
            text,
            x,
            y: *y,
            size,
            bold,
        });
        *y -= advance;
    };

    push("DATA STATISTICS".into(), 14.0, true, 18.0, &mut y);
    let rows = [
        format!("Original size   : {} bytes", stats.raw_size),
        format!("Compressed size : {} bytes", stats.compressed_size),
        format!("Base64 size     : {} bytes", stats.encoded_size),
        format!("Total QR codes  : {}", stats.chunk_count),
        format!(
            "Layout          : {} ({} per page), {} DPI",
            policy.name(),
            policy.slots_per_page(),
            dpi
        ),
    ];
    for row in rows {
        push(row, 12.0, false, 14.0, &mut y);
    }
    y -= 10.0;

    let prefix_en = "   Each code starts with a 6-digit index and ':'; sort by it, then drop it.";
    let prefix_es = "   Cada código empieza con un índice de 6 dígitos y ':'; ordene y elimínelo.";
    let blocks: [(&str, [&str; 4], &str); 2] = [
        (
            "DECODING INSTRUCTIONS (EN):",
            [
                "1. Scan all QR codes in order.",
                "2. Concatenate the scanned outputs.",
                "3. Base64-decode the result.",
                "4. zlib-decompress the output.",
            ],
            prefix_en,
        ),
        (
            "INSTRUCCIONES DE DECODIFICACIÓN (ES):",
            [
                "1. Escanee todos los códigos QR en orden.",
                "2. Concatenar las salidas escaneadas.",
                "3. Decodificar Base64 el resultado.",
                "4. Descomprimir con zlib la salida.",
            ],
            prefix_es,
        ),
    ];
    for (title, steps, prefix_note) in blocks {
        push(title.into(), 12.0, true, 14.0, &mut y);
        for (i, step) in steps.iter().enumerate() {
            push((*step).into(), 12.0, true, 14.0, &mut y);
            if i == 0 && indexed {
                push(prefix_note.into(), 10.0, false, 14.0, &mut y);
            }
        }
        y -= 10.0;
    }

    lines
}

/// Rasterise a composed page at `dpi` without going through PDF.
///
/// Symbols and crop marks are drawn; text is not, so a metadata page comes
/// out blank.
pub fn rasterize(page: &Page, dpi: u32) -> GrayImage {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let width = (page.width * scale).round() as u32;
    let height = (page.height * scale).round() as u32;
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));

    for symbol in &page.symbols {
        let side = (symbol.rect.width * scale).round() as u32;
        let left = (symbol.rect.x * scale).round() as i64;
        let top = ((page.height - symbol.rect.y - symbol.rect.height) * scale).round() as i64;
        let scaled = if symbol.image.width() == side {
            symbol.image.clone()
        } else {
            imageops::resize(&symbol.image, side, side, FilterType::Nearest)
        };
        imageops::overlay(&mut canvas, &scaled, left, top);
    }

    for line in &page.marks {
        draw_line(&mut canvas, line, page.height, scale);
    }
    canvas
}

/// Axis-aligned strokes only; that is all the compositor emits.
fn draw_line(canvas: &mut GrayImage, line: &Line, page_height: f32, scale: f32) {
    let to_px = |(x, y): (f32, f32)| {
        (
            (x * scale).round() as i64,
            ((page_height - y) * scale).round() as i64,
        )
    };
    let (x0, y0) = to_px(line.from);
    let (x1, y1) = to_px(line.to);
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);

    for x in x0.min(x1)..=x0.max(x1) {
        for y in y0.min(y1)..=y0.max(y1) {
            if (0..w).contains(&x) && (0..h).contains(&y) {
                canvas.put_pixel(x as u32, y as u32, Luma([0]));
            }
        }
    }
}
