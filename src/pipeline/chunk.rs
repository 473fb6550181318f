//! Chunker: split the encoded text into ordered, fixed-size segments.
//!
//! A chunk carries no index on the wire by default: its position is implied
//! by where its symbol sits in the document. With `indexed_chunks` enabled
//! each symbol instead starts with a fixed-width decimal index
//! (`000042:`), which the base64 alphabet can never produce, so a prefixed
//! symbol is unambiguous and survives page reordering.

use serde::{Deserialize, Serialize};

/// Bytes a version-40 QR symbol holds in byte mode at error-correction level H.
pub const QR_MAX_BYTES_ECC_H: usize = 1273;

/// Digits in the optional index prefix.
pub const INDEX_WIDTH: usize = 6;

/// Total prefix length: the digits plus the `:` separator.
pub const INDEX_PREFIX_LEN: usize = INDEX_WIDTH + 1;

/// Largest chunk count the index prefix can address.
pub const MAX_INDEXED_CHUNKS: usize = 1_000_000;

/// One contiguous slice of the encoded text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position of the slice within the encoded text.
    pub index: usize,
    pub data: String,
}

impl Chunk {
    /// Text embedded in the chunk's QR symbol.
    pub fn symbol_text(&self, indexed: bool) -> String {
        if indexed {
            format!("{:0width$}:{}", self.index, self.data, width = INDEX_WIDTH)
        } else {
            self.data.clone()
        }
    }
}

/// Split `text` into chunks of `size` characters; the last holds the remainder.
///
/// An empty `text` yields no chunks. A `size` of 0 is treated as 1.
pub fn chunk(text: &str, size: usize) -> Vec<Chunk> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0;
    let mut count = 0;

    for (pos, _) in text.char_indices() {
        if count == size {
            chunks.push(Chunk {
                index: chunks.len(),
                data: text[start..pos].to_string(),
            });
            start = pos;
            count = 0;
        }
        count += 1;
    }
    if count > 0 {
        chunks.push(Chunk {
            index: chunks.len(),
            data: text[start..].to_string(),
        });
    }

    chunks
}

/// Split an indexed symbol into `(index, data)`.
///
/// Returns `None` when the text does not start with a well-formed prefix.
pub fn parse_indexed(symbol: &str) -> Option<(usize, &str)> {
    let digits = symbol.get(..INDEX_WIDTH)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if symbol.as_bytes().get(INDEX_WIDTH) != Some(&b':') {
        return None;
    }
    let index = digits.parse().ok()?;
    Some((index, &symbol[INDEX_PREFIX_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk("", 10).is_empty());
    }

    #[test]
    fn exact_multiple_has_full_last_chunk() {
        let text = "a".repeat(30);
        let chunks = chunk(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].data.len(), 10);
    }

    #[test]
    fn remainder_goes_to_last_chunk() {
        let chunks = chunk("abcdefghijk", 4);
        let data: Vec<&str> = chunks.iter().map(|c| c.data.as_str()).collect();
        assert_eq!(data, vec!["abcd", "efgh", "ijk"]);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn concatenation_covers_text_exactly() {
        let text: String = (0..2_345).map(|i| (b'A' + (i % 26) as u8) as char).collect();
        for size in [1, 7, 100, 800, 2_345, 5_000] {
            let chunks = chunk(&text, size);
            let joined: String = chunks.iter().map(|c| c.data.as_str()).collect();
            assert_eq!(joined, text, "size {size}");
            let total: usize = chunks.iter().map(|c| c.data.len()).sum();
            assert_eq!(total, text.len());
            for c in &chunks[..chunks.len() - 1] {
                assert_eq!(c.data.len(), size.min(text.len()));
            }
            let last = chunks.last().unwrap().data.len();
            assert!((1..=size).contains(&last));
        }
    }

    #[test]
    fn multibyte_text_splits_on_characters() {
        let chunks = chunk("ñññññ", 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data, "ññ");
        assert_eq!(chunks[2].data, "ñ");
    }

    #[test]
    fn index_prefix_parses_back() {
        let c = Chunk {
            index: 42,
            data: "QUJD".into(),
        };
        let symbol = c.symbol_text(true);
        assert_eq!(symbol, "000042:QUJD");
        assert_eq!(parse_indexed(&symbol), Some((42, "QUJD")));
        assert_eq!(c.symbol_text(false), "QUJD");
    }

    #[test]
    fn malformed_prefix_is_rejected() {
        assert_eq!(parse_indexed("QUJDRE"), None);
        assert_eq!(parse_indexed("00004"), None);
        assert_eq!(parse_indexed("000042QUJD"), None);
        assert_eq!(parse_indexed("00a042:QUJD"), None);
    }
}
