//! Plaintext detection for captured bodies.
//!
//! The check looks only at a short prefix, so it stays cheap no matter how large the
//! body is and never allocates.

/// Maximum number of bytes inspected from the start of a buffer.
pub const MAX_SNIFF_BYTES: usize = 64;

/// Maximum number of code points decoded from the inspected prefix.
pub const MAX_SNIFF_CODE_POINTS: usize = 16;

/// Returns true if the buffer probably contains human-readable text.
///
/// Decodes at most [`MAX_SNIFF_CODE_POINTS`] UTF-8 code points from the first
/// [`MAX_SNIFF_BYTES`] bytes. Any control character that is not whitespace makes the
/// buffer binary, and so does a decode failure (including a multi-byte sequence cut
/// off by the prefix window) reached before enough code points were examined.
///
/// # Examples
///
/// ```rust
/// use traffic_tap::sniff::is_plaintext;
///
/// assert!(is_plaintext(b"{\"ok\":true}"));
/// assert!(!is_plaintext(b"\0\x01\x02"));
/// ```
pub fn is_plaintext(buffer: &[u8]) -> bool {
    let prefix = &buffer[..buffer.len().min(MAX_SNIFF_BYTES)];

    let (valid, decode_failed) = match std::str::from_utf8(prefix) {
        Ok(text) => (text, false),
        // valid_up_to always lands on a char boundary
        Err(e) => (
            std::str::from_utf8(&prefix[..e.valid_up_to()]).unwrap_or_default(),
            true,
        ),
    };

    let mut examined = 0;
    for c in valid.chars().take(MAX_SNIFF_CODE_POINTS) {
        if c.is_control() && !is_whitespace_control(c) {
            return false;
        }
        examined += 1;
    }

    // Ran into undecodable bytes before the code point budget was used up.
    !(decode_failed && examined < MAX_SNIFF_CODE_POINTS)
}

fn is_whitespace_control(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\u{0B}' | '\u{0C}' | '\r' | '\u{1C}'..='\u{1F}')
}
