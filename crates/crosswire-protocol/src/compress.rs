//! Byte-stream compression for message payloads.
//!
//! Compression is opt-in per message TYPE, never per call: a descriptor
//! either carries a level (every payload of that type is compressed at
//! that level, and every inbound payload is decompressed regardless of
//! size) or it doesn't. Uses zlib streams via `flate2`.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Highest compression level zlib accepts. Descriptor levels above this
/// are clamped rather than rejected.
pub const MAX_LEVEL: u32 = 9;

/// Compresses `data` at the given level (clamped to [`MAX_LEVEL`]).
pub fn compress(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::new(),
        Compression::new(level.min(MAX_LEVEL)),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses a zlib stream produced by [`compress`].
///
/// # Errors
/// Fails on corrupt or truncated input, or on bytes that were never
/// compressed. Callers on the decode path convert the error into a
/// dropped message rather than propagating it.
pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}
