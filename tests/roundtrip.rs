//! Round-trip tests that never touch pdfium.
//!
//! Pages are composed and rasterised in-process with `preview_pages`, then
//! scanned with the same symbol decoder and position logic the PDF path
//! uses. Run with:
//!   cargo test --test roundtrip

use edgequake_qrvault::pipeline::reassemble::{expected_chunks, reassemble};
use edgequake_qrvault::pipeline::symbol::decode_symbols;
use edgequake_qrvault::{
    preview_pages, EncodeConfig, LayoutPolicy, PageError, PageScan, QrVaultError, ScanPlan,
};
use image::GrayImage;

const DPI: u32 = 150;
const CHUNK: usize = 120;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Deterministic bytes that zlib cannot shrink much.
fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

fn config(layout: LayoutPolicy, indexed: bool) -> EncodeConfig {
    EncodeConfig::builder()
        .layout(layout)
        .chunk_size(CHUNK)
        .dpi(DPI)
        .indexed_chunks(indexed)
        .build()
        .unwrap()
}

fn plan_for(config: &EncodeConfig, expected: Option<usize>) -> ScanPlan {
    ScanPlan {
        dpi: config.dpi,
        layout: config.layout,
        metadata_page: config.metadata_page,
        indexed: Some(config.indexed_chunks),
        expected_chunks: expected,
    }
}

fn render(payload: &[u8], config: &EncodeConfig) -> Vec<GrayImage> {
    tokio_test::block_on(preview_pages(payload, config)).unwrap()
}

/// Scan rasters as if they were pages 1..=n of a document; `skip` pages are
/// treated as lost.
fn scan(pages: &[GrayImage], plan: &ScanPlan, skip: &[usize]) -> Vec<PageScan> {
    pages
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let page = i + 1;
            if skip.contains(&page) {
                PageScan {
                    page,
                    symbols: Vec::new(),
                    errors: vec![PageError::SymbolNotFound { page }],
                }
            } else {
                plan.locate_symbols(page, image.dimensions(), decode_symbols(image))
            }
        })
        .collect()
}

fn restore(scans: &[PageScan], plan: &ScanPlan) -> Result<Vec<u8>, QrVaultError> {
    let recovered: Vec<_> = scans.iter().flat_map(|s| s.symbols.clone()).collect();
    let failed: Vec<usize> = scans
        .iter()
        .filter(|s| s.symbols.is_empty())
        .filter_map(|s| plan.first_position(s.page))
        .collect();
    let expected = expected_chunks(plan.expected_chunks, &recovered, &failed);
    reassemble(&recovered, expected, |i| plan.page_of(i))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn hello_world_single_symbol() {
    let cfg = config(LayoutPolicy::Stacked { rows: 2 }, false);
    let pages = render(b"hello world", &cfg);
    // Metadata sheet + one data page.
    assert_eq!(pages.len(), 2);

    let plan = plan_for(&cfg, Some(1));
    let scans = scan(&pages, &plan, &[]);
    assert!(scans[0].symbols.is_empty(), "metadata page carries no data");
    assert_eq!(scans[1].symbols.len(), 1);
    assert_eq!(restore(&scans, &plan).unwrap(), b"hello world");
}

#[test]
fn empty_payload_is_one_symbol_and_round_trips() {
    let cfg = config(LayoutPolicy::Stacked { rows: 2 }, false);
    let pages = render(b"", &cfg);
    assert_eq!(pages.len(), 2);

    let plan = plan_for(&cfg, Some(1));
    let scans = scan(&pages, &plan, &[]);
    let texts: Vec<&str> = scans[1].symbols.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["eJwDAAAAAAE="]);
    assert!(restore(&scans, &plan).unwrap().is_empty());
}

#[test]
fn multi_page_stacked_round_trip() {
    let payload = noise(500);
    let cfg = config(LayoutPolicy::Stacked { rows: 2 }, false);
    let pages = render(&payload, &cfg);
    assert_eq!(pages.len(), 4, "metadata + 3 data pages of 2 symbols");

    let plan = plan_for(&cfg, None);
    let scans = scan(&pages, &plan, &[]);
    for s in &scans[1..] {
        assert!(s.errors.is_empty(), "page {}: {:?}", s.page, s.errors);
    }
    let slots: Vec<(usize, usize)> = scans[1]
        .symbols
        .iter()
        .map(|s| (s.index, s.slot))
        .collect();
    assert_eq!(slots, vec![(0, 0), (1, 1)]);
    assert_eq!(restore(&scans, &plan).unwrap(), payload);
}

#[test]
fn single_layout_round_trip() {
    let payload = noise(200);
    let cfg = config(LayoutPolicy::Single, false);
    assert!(!cfg.metadata_page);
    let pages = render(&payload, &cfg);
    assert!(pages.len() >= 2);

    let plan = plan_for(&cfg, None);
    let scans = scan(&pages, &plan, &[]);
    assert!(scans.iter().all(|s| s.symbols.len() == 1));
    assert_eq!(restore(&scans, &plan).unwrap(), payload);
}

#[test]
fn indexed_symbols_survive_page_reordering() {
    let payload = noise(500);
    let cfg = config(LayoutPolicy::Stacked { rows: 2 }, true);
    let mut pages = render(&payload, &cfg);
    // Shuffle data pages: the printed index wins over page geometry.
    pages.swap(1, 3);

    let plan = plan_for(&cfg, None);
    let scans = scan(&pages, &plan, &[]);
    assert_eq!(restore(&scans, &plan).unwrap(), payload);
}

#[test]
fn missing_interior_page_names_chunk_and_page() {
    let payload = noise(500);
    let cfg = config(LayoutPolicy::Stacked { rows: 2 }, false);
    let pages = render(&payload, &cfg);
    assert_eq!(pages.len(), 4);

    // Page 3 carries chunks 2 and 3.
    for expected in [Some(6), None] {
        let plan = plan_for(&cfg, expected);
        let scans = scan(&pages, &plan, &[3]);
        match restore(&scans, &plan) {
            Err(QrVaultError::MissingChunk { index, page }) => {
                assert_eq!(index, 2);
                assert_eq!(page, 3);
            }
            other => panic!("expected MissingChunk, got {other:?}"),
        }
    }
}

#[test]
fn missing_final_page_detected_only_with_recorded_count() {
    let payload = noise(500);
    let cfg = config(LayoutPolicy::Stacked { rows: 2 }, false);
    let pages = render(&payload, &cfg);

    let plan = plan_for(&cfg, Some(6));
    let scans = scan(&pages, &plan, &[4]);
    assert!(matches!(
        restore(&scans, &plan),
        Err(QrVaultError::MissingChunk { index: 4, page: 4 })
    ));
}

#[test]
fn default_stacked_config_round_trip() {
    // 800-character chunks at 300 DPI: large symbol versions, upscaled by a
    // non-integer factor.
    let cfg = EncodeConfig::default();
    assert_eq!(cfg.chunk_size, 800);
    assert_eq!(cfg.dpi, 300);
    let payload = noise(1200);
    let pages = render(&payload, &cfg);
    assert_eq!(pages.len(), 3, "metadata + 2 data pages");

    let plan = plan_for(&cfg, None);
    let scans = scan(&pages, &plan, &[]);
    assert_eq!(scans.iter().map(|s| s.symbols.len()).sum::<usize>(), 3);
    assert_eq!(restore(&scans, &plan).unwrap(), payload);
}

#[test]
fn default_single_config_round_trip() {
    let cfg = EncodeConfig::builder()
        .layout(LayoutPolicy::Single)
        .build()
        .unwrap();
    assert_eq!(cfg.chunk_size, 1000);
    let payload = noise(1500);
    let pages = render(&payload, &cfg);
    assert_eq!(pages.len(), 3);

    let plan = plan_for(&cfg, None);
    let scans = scan(&pages, &plan, &[]);
    assert!(scans.iter().all(|s| s.symbols.len() == 1));
    assert_eq!(restore(&scans, &plan).unwrap(), payload);
}
