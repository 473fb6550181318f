//! Encode entry points: payload → QR document.
//!
//! ```text
//! source ──▶ inline ──▶ codec ──▶ chunk ──▶ symbol ──▶ layout ──▶ writer
//! (URL/file)  (HTML)   (zlib+b64)          (QR, H)   (pages)    (pdfium)
//! ```
//!
//! Symbol rendering is the only stage worth parallelising; everything else
//! is a full-barrier transform of its predecessor's complete output.

use crate::config::EncodeConfig;
use crate::error::QrVaultError;
use crate::output::{write_atomic, EncodeOutput, EncodeStats, PayloadStats};
use crate::pipeline::chunk::{self, Chunk, MAX_INDEXED_CHUNKS, QR_MAX_BYTES_ECC_H};
use crate::pipeline::layout::{self, Page};
use crate::pipeline::properties::DocumentProperties;
use crate::pipeline::source::PayloadSource;
use crate::pipeline::{codec, inline, symbol, writer};
use futures::stream::{self, StreamExt};
use image::GrayImage;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Encode the payload behind `source` (file path or HTTP/HTTPS URL) into a
/// PDF held in memory.
pub async fn encode(
    source: impl AsRef<str>,
    config: &EncodeConfig,
) -> Result<EncodeOutput, QrVaultError> {
    let payload = load_payload(source.as_ref(), config).await?;
    encode_bytes(&payload, config).await
}

/// Encode `source` and write the PDF atomically to `output_path`.
pub async fn encode_to_file(
    source: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &EncodeConfig,
) -> Result<EncodeStats, QrVaultError> {
    let output = encode(source, config).await?;
    write_atomic(output_path.as_ref(), &output.pdf).await?;
    info!("Wrote {}", output_path.as_ref().display());
    Ok(output.stats)
}

/// Encode an in-memory payload into a PDF.
pub async fn encode_bytes(
    payload: &[u8],
    config: &EncodeConfig,
) -> Result<EncodeOutput, QrVaultError> {
    let total_start = Instant::now();
    let composed = compose_document(payload, config).await?;
    write_composed(composed, config, total_start).await
}

/// Encode an in-memory payload into a PDF and also rasterise every page at
/// the protocol DPI, from a single rendering of the symbols.
///
/// Metadata pages come out blank in the rasters, as in [`preview_pages`].
pub async fn encode_with_previews(
    payload: &[u8],
    config: &EncodeConfig,
) -> Result<(EncodeOutput, Vec<GrayImage>), QrVaultError> {
    let total_start = Instant::now();
    let mut composed = compose_document(payload, config).await?;
    let (pages, previews) = rasterize_composed(composed.pages, config.dpi).await?;
    composed.pages = pages;
    let output = write_composed(composed, config, total_start).await?;
    Ok((output, previews))
}

async fn write_composed(
    composed: ComposedDocument,
    config: &EncodeConfig,
    total_start: Instant,
) -> Result<EncodeOutput, QrVaultError> {
    let page_count = composed.pages.len();

    let write_start = Instant::now();
    let pdf = writer::write_document(composed.pages, composed.properties).await?;
    let write_duration_ms = write_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_encode_complete(composed.stats.chunk_count, page_count);
    }

    let stats = EncodeStats {
        payload: composed.stats,
        page_count,
        render_duration_ms: composed.render_duration_ms,
        write_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Encoded {} bytes into {} QR codes on {} pages ({} bytes of PDF), {}ms total",
        stats.payload.raw_size,
        stats.payload.chunk_count,
        page_count,
        pdf.len(),
        stats.total_duration_ms
    );

    Ok(EncodeOutput {
        pdf,
        layout: config.layout,
        dpi: config.dpi,
        stats,
    })
}

/// Dry run: the base64 text that would be split into symbols, with the
/// payload statistics. No symbol is rendered and no document is written.
pub async fn encoded_text(
    source: impl AsRef<str>,
    config: &EncodeConfig,
) -> Result<(String, PayloadStats), QrVaultError> {
    let payload = load_payload(source.as_ref(), config).await?;
    let (text, compressed_size) = codec::encode_payload(&payload)?;
    let stats = PayloadStats {
        raw_size: payload.len(),
        compressed_size,
        encoded_size: text.len(),
        chunk_count: text.len().div_ceil(config.chunk_size),
    };
    Ok((text, stats))
}

/// Rasterise every page of the document `payload` would produce, at the
/// protocol DPI, without going through PDF.
///
/// Metadata pages come out blank; text is only drawn by the PDF writer.
/// The progress callback sees a complete encode cycle.
pub async fn preview_pages(
    payload: &[u8],
    config: &EncodeConfig,
) -> Result<Vec<GrayImage>, QrVaultError> {
    let composed = compose_document(payload, config).await?;
    let chunk_count = composed.stats.chunk_count;
    let (_, previews) = rasterize_composed(composed.pages, config.dpi).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_encode_complete(chunk_count, previews.len());
    }
    Ok(previews)
}

/// Rasterise `pages` on a blocking thread, handing the pages back.
async fn rasterize_composed(
    pages: Vec<Page>,
    dpi: u32,
) -> Result<(Vec<Page>, Vec<GrayImage>), QrVaultError> {
    tokio::task::spawn_blocking(move || {
        let images = pages.iter().map(|page| layout::rasterize(page, dpi)).collect();
        (pages, images)
    })
    .await
    .map_err(|e| QrVaultError::Internal(format!("Preview task panicked: {}", e)))
}

/// Read or fetch the payload; fetched web pages get their images inlined
/// and a doctype prepended.
pub async fn load_payload(source: &str, config: &EncodeConfig) -> Result<Vec<u8>, QrVaultError> {
    let source = PayloadSource::parse(source)?;
    info!("Loading payload: {}", source.display());
    let raw = source.fetch(config.download_timeout_secs).await?;
    match &source {
        PayloadSource::Url(url) => Ok(inline::prepare_page(
            &raw,
            url,
            config.inline_images,
            config.image_timeout_secs,
        )
        .await),
        PayloadSource::File(_) => Ok(raw),
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Pages ready for a writer, plus what the scanner must be told.
struct ComposedDocument {
    pages: Vec<Page>,
    properties: DocumentProperties,
    stats: PayloadStats,
    render_duration_ms: u64,
}

/// Compress, encode, chunk, render and lay out. No pdfium involved.
async fn compose_document(
    payload: &[u8],
    config: &EncodeConfig,
) -> Result<ComposedDocument, QrVaultError> {
    let (chunks, stats) = prepare_chunks(payload, config)?;

    let render_start = Instant::now();
    let images = render_symbols(&chunks, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} QR codes in {}ms",
        images.len(),
        render_duration_ms
    );

    let metadata = config
        .metadata_page
        .then(|| layout::metadata_sheet(config.layout, &stats, config.dpi, config.indexed_chunks));
    let pages = layout::compose(config.layout, images, metadata);
    debug!("Composed {} pages", pages.len());

    let properties = DocumentProperties {
        dpi: config.dpi,
        layout: config.layout,
        chunk_count: chunks.len(),
        chunk_size: config.chunk_size,
        metadata_page: config.metadata_page,
        indexed: config.indexed_chunks,
    };

    Ok(ComposedDocument {
        pages,
        properties,
        stats,
        render_duration_ms,
    })
}

fn prepare_chunks(
    payload: &[u8],
    config: &EncodeConfig,
) -> Result<(Vec<Chunk>, PayloadStats), QrVaultError> {
    let (text, compressed_size) = codec::encode_payload(payload)?;
    let chunks = chunk::chunk(&text, config.chunk_size);

    if chunks.is_empty() {
        warn!("Payload produced zero QR codes");
    }
    if config.indexed_chunks && chunks.len() > MAX_INDEXED_CHUNKS {
        return Err(QrVaultError::InvalidConfig(format!(
            "{} chunks exceed the {} an index prefix can number; raise the chunk size",
            chunks.len(),
            MAX_INDEXED_CHUNKS
        )));
    }

    let stats = PayloadStats {
        raw_size: payload.len(),
        compressed_size,
        encoded_size: text.len(),
        chunk_count: chunks.len(),
    };
    info!(
        "Payload {} bytes → {} compressed → {} base64 chars → {} chunks of ≤{}",
        stats.raw_size, stats.compressed_size, stats.encoded_size, stats.chunk_count, config.chunk_size
    );
    Ok((chunks, stats))
}

/// Render one symbol per chunk on a bounded pool, returned in chunk order.
async fn render_symbols(
    chunks: &[Chunk],
    config: &EncodeConfig,
) -> Result<Vec<GrayImage>, QrVaultError> {
    let total = chunks.len();
    let pixels = config.layout.symbol_pixels(config.dpi);
    let indexed = config.indexed_chunks;

    if let Some(ref cb) = config.progress_callback {
        cb.on_encode_start(total);
    }

    let mut results = stream::iter(chunks.iter().map(|c| {
        let index = c.index;
        let text = c.symbol_text(indexed);
        let callback = config.progress_callback.clone();
        async move {
            let len = text.len();
            let rendered = tokio::task::spawn_blocking(move || symbol::render(&text, pixels))
                .await
                .map_err(|e| QrVaultError::Internal(format!("Render task panicked: {}", e)))?
                .map_err(|e| {
                    debug!("QR encoder rejected chunk {}: {:?}", index, e);
                    QrVaultError::ChunkTooLarge {
                        index,
                        len,
                        max: QR_MAX_BYTES_ECC_H,
                    }
                })?;
            debug!("Rendered QR {}/{}", index + 1, total);
            if let Some(ref cb) = callback {
                cb.on_symbol_rendered(index, total);
            }
            Ok::<_, QrVaultError>((index, rendered))
        }
    }))
    .buffer_unordered(config.concurrency);

    let mut slots: Vec<Option<GrayImage>> = vec![None; total];
    while let Some(result) = results.next().await {
        let (index, image) = result?;
        slots[index] = Some(image);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| QrVaultError::Internal(format!("QR {} was never rendered", index)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::LayoutPolicy;
    use crate::progress::VaultProgressCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn small_config(concurrency: usize) -> EncodeConfig {
        EncodeConfig::builder()
            .layout(LayoutPolicy::Stacked { rows: 2 })
            .chunk_size(40)
            .dpi(100)
            .concurrency(concurrency)
            .build()
            .unwrap()
    }

    #[test]
    fn chunks_cover_the_encoded_text() {
        let payload = b"The quick brown fox jumps over the lazy dog. ".repeat(20);
        let config = small_config(1);
        let (chunks, stats) = prepare_chunks(&payload, &config).unwrap();
        let (text, _) = codec::encode_payload(&payload).unwrap();

        assert_eq!(stats.raw_size, payload.len());
        assert_eq!(stats.encoded_size, text.len());
        assert_eq!(stats.chunk_count, chunks.len());
        let joined: String = chunks.iter().map(|c| c.data.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[tokio::test]
    async fn concurrent_rendering_keeps_chunk_order() {
        let payload: Vec<u8> = (0..1500u32).map(|i| (i * 7 % 251) as u8).collect();
        let config = small_config(4);
        let (chunks, _) = prepare_chunks(&payload, &config).unwrap();
        assert!(chunks.len() > 4);

        let images = render_symbols(&chunks, &config).await.unwrap();
        assert_eq!(images.len(), chunks.len());
        for (chunk, image) in chunks.iter().zip(&images) {
            let scan = symbol::decode_symbols(image);
            assert_eq!(scan.symbols.len(), 1, "chunk {}", chunk.index);
            assert_eq!(scan.symbols[0].text, chunk.data);
        }
    }

    #[tokio::test]
    async fn composed_document_records_its_protocol() {
        let config = small_config(2);
        let composed = compose_document(b"hello world", &config).await.unwrap();

        assert_eq!(composed.properties.chunk_count, 1);
        assert_eq!(composed.properties.dpi, 100);
        assert!(composed.properties.metadata_page);
        // Metadata page plus one data page.
        assert_eq!(composed.pages.len(), 2);
        assert!(composed.pages[0].symbols.is_empty());
        assert_eq!(composed.pages[1].symbols.len(), 1);
    }

    struct Counter(AtomicUsize);

    impl VaultProgressCallback for Counter {
        fn on_symbol_rendered(&self, _index: usize, _total: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn callback_sees_every_symbol() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let config = EncodeConfig::builder()
            .chunk_size(30)
            .dpi(72)
            .concurrency(3)
            .progress_callback(counter.clone())
            .build()
            .unwrap();
        let (chunks, _) = prepare_chunks(&[42u8; 600], &config).unwrap();
        render_symbols(&chunks, &config).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), chunks.len());
    }

    #[derive(Default)]
    struct Cycle {
        starts: AtomicUsize,
        completes: AtomicUsize,
        pages: AtomicUsize,
    }

    impl VaultProgressCallback for Cycle {
        fn on_encode_start(&self, _total_chunks: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_encode_complete(&self, _total_chunks: usize, page_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.pages.store(page_count, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn previews_run_one_complete_encode_cycle() {
        let cycle = Arc::new(Cycle::default());
        let config = EncodeConfig::builder()
            .chunk_size(40)
            .dpi(72)
            .progress_callback(cycle.clone())
            .build()
            .unwrap();
        let pages = preview_pages(&[9u8; 200], &config).await.unwrap();

        assert_eq!(cycle.starts.load(Ordering::SeqCst), 1);
        assert_eq!(cycle.completes.load(Ordering::SeqCst), 1);
        assert_eq!(cycle.pages.load(Ordering::SeqCst), pages.len());
    }

    #[tokio::test]
    async fn rasterising_hands_the_pages_back() {
        let config = small_config(1);
        let composed = compose_document(b"hello world", &config).await.unwrap();
        let count = composed.pages.len();
        let (pages, images) = rasterize_composed(composed.pages, config.dpi).await.unwrap();
        assert_eq!(pages.len(), count);
        assert_eq!(images.len(), count);
        assert_eq!(pages[1].symbols.len(), 1);
    }

    #[tokio::test]
    async fn preview_pages_match_page_geometry() {
        let config = EncodeConfig::builder()
            .layout(LayoutPolicy::Single)
            .chunk_size(100)
            .dpi(72)
            .build()
            .unwrap();
        let pages = preview_pages(&[7u8; 50], &config).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].dimensions(), (576, 576));
    }

    #[tokio::test]
    async fn dry_run_reads_a_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"dry run payload").unwrap();
        let config = small_config(1);
        let (text, stats) = encoded_text(file.path().to_string_lossy(), &config)
            .await
            .unwrap();
        assert_eq!(codec::decompress(&codec::decode_text(&text).unwrap()).unwrap(), b"dry run payload");
        assert_eq!(stats.encoded_size, text.len());
    }
}
