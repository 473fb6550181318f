//! Reassembler: positioned symbol texts → original payload bytes.
//!
//! Integrity beats partial recovery. Any gap in `[0, expected)` is fatal and
//! nothing is returned, so no truncated file can ever be written.

use crate::error::QrVaultError;
use crate::output::RecoveredSymbol;
use crate::pipeline::codec;
use tracing::{debug, warn};

/// Number of chunks the document must have carried.
///
/// `known` comes from the document properties. Without it the count is
/// inferred: one past the highest recovered position, raised so that the
/// first position of every page that failed to decode is still required.
pub fn expected_chunks(
    known: Option<usize>,
    recovered: &[RecoveredSymbol],
    failed_positions: &[usize],
) -> usize {
    if let Some(n) = known {
        return n;
    }
    let seen = recovered.iter().map(|s| s.index + 1).max().unwrap_or(0);
    let failed = failed_positions.iter().map(|p| p + 1).max().unwrap_or(0);
    seen.max(failed)
}

/// Order, validate and concatenate the recovered chunks, then invert
/// base64 and zlib.
///
/// `page_of` maps a chunk index to the 1-indexed page it was printed on,
/// for error messages.
pub fn reassemble(
    recovered: &[RecoveredSymbol],
    expected: usize,
    page_of: impl Fn(usize) -> usize,
) -> Result<Vec<u8>, QrVaultError> {
    let mut ordered: Vec<&RecoveredSymbol> = recovered.iter().collect();
    ordered.sort_by_key(|s| (s.index, s.page, s.slot));

    let mut slots: Vec<Option<&RecoveredSymbol>> = vec![None; expected];
    for symbol in ordered {
        let Some(slot) = slots.get_mut(symbol.index) else {
            warn!(
                "Ignoring symbol on page {} slot {}: position {} is beyond the {} expected chunks",
                symbol.page, symbol.slot, symbol.index, expected
            );
            continue;
        };
        match slot {
            None => *slot = Some(symbol),
            Some(first) if first.text == symbol.text => {
                debug!(
                    "Chunk {} seen again on page {}, identical",
                    symbol.index, symbol.page
                );
            }
            Some(first) => {
                return Err(QrVaultError::ConflictingChunk {
                    index: symbol.index,
                    first_page: first.page,
                    second_page: symbol.page,
                });
            }
        }
    }

    let mut text = String::new();
    for (index, slot) in slots.iter().enumerate() {
        match slot {
            Some(symbol) => text.push_str(&symbol.text),
            None => {
                return Err(QrVaultError::MissingChunk {
                    index,
                    page: page_of(index),
                })
            }
        }
    }
    debug!("Reassembled {} chunks → {} chars", expected, text.len());

    let blob = codec::decode_text(&text).map_err(|source| QrVaultError::Reconstruction {
        stage: "decoding base64",
        source,
    })?;
    codec::decompress(&blob).map_err(|source| QrVaultError::Reconstruction {
        stage: "decompressing",
        source,
    })
}
