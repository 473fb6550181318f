//! End-to-end tests for edgequake-qrvault through real PDFs.
//!
//! These tests write PDFs and rasterise them with pdfium, so they need a
//! pdfium library on the loader path (or `PDFIUM_LIB_PATH`). They are gated
//! behind the `QRVAULT_PDFIUM_TESTS` environment variable so they do not run
//! in CI unless explicitly requested.
//!
//! Run with:
//!   QRVAULT_PDFIUM_TESTS=1 cargo test --test e2e -- --nocapture

use edgequake_qrvault::{
    decode, decode_to_file, encode_bytes, encode_to_file, encode_with_previews, inspect,
    DecodeConfig, EncodeConfig, LayoutPolicy, QrVaultError, VaultProgressCallback,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

macro_rules! skip_unless_pdfium {
    () => {{
        if std::env::var("QRVAULT_PDFIUM_TESTS").is_err() {
            println!("SKIP: set QRVAULT_PDFIUM_TESTS=1 to run pdfium tests");
            return;
        }
    }};
}

fn payload() -> Vec<u8> {
    (0..3000u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
        .collect()
}

fn small_config(layout: LayoutPolicy) -> EncodeConfig {
    EncodeConfig::builder()
        .layout(layout)
        .chunk_size(300)
        .dpi(150)
        .concurrency(2)
        .build()
        .unwrap()
}

fn source_file(dir: &tempfile::TempDir, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join("payload.bin");
    std::fs::write(&path, bytes).unwrap();
    path
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stacked_round_trip_through_pdf() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let source = source_file(&dir, &payload());
    let pdf = dir.path().join("vault.pdf");

    let stats = encode_to_file(
        source.to_str().unwrap(),
        &pdf,
        &small_config(LayoutPolicy::Stacked { rows: 2 }),
    )
    .await
    .expect("encode failed");
    println!("encoded: {stats:?}");

    let restored = dir.path().join("restored.bin");
    let output = decode_to_file(&pdf, &restored, &DecodeConfig::default())
        .await
        .expect("decode failed");

    assert_eq!(std::fs::read(&restored).unwrap(), payload());
    assert_eq!(output.stats.expected_chunks, stats.payload.chunk_count);
    assert_eq!(output.stats.total_pages, stats.page_count);
    assert!(output.page_errors.is_empty(), "{:?}", output.page_errors);
}

#[tokio::test]
async fn test_single_layout_round_trip_through_pdf() {
    skip_unless_pdfium!();
    let dir = tempfile::tempdir().unwrap();
    let source = source_file(&dir, b"hello world");

    let encoded = encode_bytes(
        &std::fs::read(&source).unwrap(),
        &small_config(LayoutPolicy::Single),
    )
    .await
    .expect("encode failed");
    let pdf = dir.path().join("single.pdf");
    std::fs::write(&pdf, &encoded.pdf).unwrap();

    let output = decode(&pdf, &DecodeConfig::default())
        .await
        .expect("decode failed");
    assert_eq!(output.payload, b"hello world");
    assert_eq!(output.stats.total_pages, 1);
}

#[tokio::test]
async fn test_inspect_reports_recorded_properties() {
    skip_unless_pdfium!();
    let encoded = encode_bytes(&payload(), &small_config(LayoutPolicy::Stacked { rows: 1 }))
        .await
        .expect("encode failed");
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("vault.pdf");
    std::fs::write(&pdf, &encoded.pdf).unwrap();

    let info = inspect(&pdf).await.expect("inspect failed");
    let props = info.properties.expect("properties missing");
    assert_eq!(props.dpi, 150);
    assert_eq!(props.layout, LayoutPolicy::Stacked { rows: 1 });
    assert_eq!(props.chunk_count, encoded.stats.payload.chunk_count);
    assert!(props.metadata_page);
    assert_eq!(info.page_count, encoded.stats.page_count);
}

#[tokio::test]
async fn test_resolution_mismatch_is_fatal() {
    skip_unless_pdfium!();
    let encoded = encode_bytes(b"dpi check", &small_config(LayoutPolicy::Stacked { rows: 2 }))
        .await
        .expect("encode failed");
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("vault.pdf");
    std::fs::write(&pdf, &encoded.pdf).unwrap();

    let config = DecodeConfig::builder().dpi(300).build().unwrap();
    match decode(&pdf, &config).await {
        Err(QrVaultError::ResolutionMismatch {
            written, requested, ..
        }) => {
            assert_eq!(written, 150);
            assert_eq!(requested, 300);
        }
        other => panic!("expected ResolutionMismatch, got {other:?}"),
    }

    let matching = DecodeConfig::builder().dpi(150).build().unwrap();
    let output = decode(&pdf, &matching).await.expect("decode failed");
    assert_eq!(output.payload, b"dpi check");
}

#[tokio::test]
async fn test_lost_page_fails_without_writing_output() {
    skip_unless_pdfium!();
    let encoded = encode_bytes(&payload(), &small_config(LayoutPolicy::Stacked { rows: 2 }))
        .await
        .expect("encode failed");
    let page_count = encoded.stats.page_count;
    assert!(page_count >= 3, "need a metadata page and two data pages");

    // Drop the last data page but keep the recorded properties.
    let mut doc = lopdf::Document::load_mem(&encoded.pdf).unwrap();
    doc.delete_pages(&[page_count as u32]);
    let mut damaged = Vec::new();
    doc.save_to(&mut damaged).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("damaged.pdf");
    std::fs::write(&pdf, &damaged).unwrap();
    let restored = dir.path().join("restored.bin");

    match decode_to_file(&pdf, &restored, &DecodeConfig::default()).await {
        Err(QrVaultError::MissingChunk { index, page }) => {
            assert_eq!(index, 2 * (page_count - 2));
            assert_eq!(page, page_count);
        }
        other => panic!("expected MissingChunk, got {other:?}"),
    }
    assert!(!restored.exists(), "a failed decode must not leave an output file");
}

#[derive(Default)]
struct RenderCount(AtomicUsize);

impl VaultProgressCallback for RenderCount {
    fn on_symbol_rendered(&self, _index: usize, _total_chunks: usize) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_previews_and_pdf_share_one_rendering() {
    skip_unless_pdfium!();
    let counter = Arc::new(RenderCount::default());
    let config = EncodeConfig::builder()
        .chunk_size(300)
        .dpi(150)
        .progress_callback(counter.clone())
        .build()
        .unwrap();

    let (output, previews) = encode_with_previews(&payload(), &config)
        .await
        .expect("encode failed");
    assert_eq!(previews.len(), output.stats.page_count);
    assert_eq!(
        counter.0.load(Ordering::SeqCst),
        output.stats.payload.chunk_count,
        "each symbol is rendered once"
    );
}
