//! Compressor and Text Encoder: `payload ⇄ zlib ⇄ base64`.
//!
//! The wire format is exactly `base64(zlib(payload))` with no framing of our
//! own, so a printed archive can be restored by hand with any zlib and any
//! base64 tool, following the instructions printed on the metadata page.
//!
//! Decompression drives [`flate2::Decompress`] directly instead of the
//! `read::ZlibDecoder` adapter: the adapter reports a truncated stream as a
//! clean EOF, which would let a half-scanned archive decode "successfully".

use crate::error::CodecError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::{self, Write};
use tracing::debug;

/// Compress `payload` into a zlib stream at the default level, byte for byte
/// what a stock zlib `compress()` call produces.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(payload.len() / 2 + 64),
        Compression::default(),
    );
    encoder.write_all(payload).map_err(CodecError::Compression)?;
    let blob = encoder.finish().map_err(CodecError::Compression)?;
    debug!("Compressed {} → {} bytes", payload.len(), blob.len());
    Ok(blob)
}

/// Inflate a zlib stream produced by [`compress`].
///
/// Fails with [`CodecError::CorruptStream`] on a bad header, a bad
/// checksum, or a stream that ends before its final block.
pub fn decompress(blob: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(blob.len().saturating_mul(4).max(64));

    loop {
        let consumed = inflater.total_in() as usize;
        let status = inflater
            .decompress_vec(&blob[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|e| CodecError::CorruptStream(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError if out.len() == out.capacity() => {
                out.reserve(out.capacity().max(64));
            }
            Status::Ok | Status::BufError => {
                return Err(CodecError::CorruptStream(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "stream ended after {} of {} bytes without a final block",
                        inflater.total_in(),
                        blob.len()
                    ),
                )));
            }
        }
    }
}

/// Map bytes onto the padded standard base64 alphabet.
pub fn encode_text(blob: &[u8]) -> String {
    STANDARD.encode(blob)
}

/// Inverse of [`encode_text`]; rejects foreign characters and bad padding.
pub fn decode_text(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD.decode(text).map_err(CodecError::InvalidEncoding)
}

/// `base64(zlib(payload))` plus the intermediate compressed size.
pub fn encode_payload(payload: &[u8]) -> Result<(String, usize), CodecError> {
    let blob = compress(payload)?;
    Ok((encode_text(&blob), blob.len()))
}
