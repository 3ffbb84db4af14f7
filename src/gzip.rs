//! Display-only gzip decompression.
//!
//! The caller keeps the compressed bytes; this module only produces a decoded copy
//! for the log line.

use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::debug;

/// Decompresses a gzip buffer for preview purposes.
///
/// Returns `None` when the stream is corrupt or when the decoded output would exceed
/// `limit` bytes. The input is only borrowed, so the compressed bytes handed to the
/// real consumer are unaffected.
///
/// # Examples
///
/// ```rust
/// use bytes::Bytes;
/// use traffic_tap::gzip::decompress;
///
/// assert!(decompress(&Bytes::from_static(b"not gzip"), 1024).is_none());
/// ```
pub fn decompress(compressed: &Bytes, limit: usize) -> Option<Bytes> {
    let decoder = GzDecoder::new(compressed.as_ref());
    let mut decoded = Vec::new();

    // Read one byte past the limit so an oversized stream is detectable.
    let read_cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    if let Err(e) = decoder.take(read_cap).read_to_end(&mut decoded) {
        debug!(error = %e, compressed_len = compressed.len(), "gzip preview failed");
        return None;
    }

    if decoded.len() > limit {
        debug!(limit, "gzip preview exceeds limit");
        return None;
    }

    Some(Bytes::from(decoded))
}

#[cfg(test)]
pub(crate) fn compress(data: &[u8]) -> Bytes {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    Bytes::from(encoder.finish().unwrap())
}
