//! UTF-8 framing for byte streams.
//!
//! Terminal and log output arrives in arbitrary byte chunks, but the wire
//! envelope carries text. A multi-byte character split across two reads must
//! not be replaced by U+FFFD, so the framer holds back an incomplete tail
//! until the next chunk completes it.

/// Largest number of bytes a single UTF-8 scalar can occupy.
const MAX_UTF8_SEQUENCE: usize = 4;

/// Returns the length of the longest prefix of `bytes` that ends on a
/// character boundary.
///
/// Invalid sequences in the middle of the buffer do not hold back output;
/// only a truncated sequence at the very end does.
pub fn find_utf8_boundary(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) => match e.error_len() {
            // Truncated sequence at the end: cut before it.
            None => e.valid_up_to(),
            // Genuinely invalid bytes: emit everything, lossy decoding replaces them.
            Some(_) => {
                let tail_start = bytes.len().saturating_sub(MAX_UTF8_SEQUENCE - 1);
                (tail_start..bytes.len())
                    .find(|&i| is_truncated_tail(&bytes[i..]))
                    .unwrap_or(bytes.len())
            }
        },
    }
}

fn is_truncated_tail(tail: &[u8]) -> bool {
    matches!(std::str::from_utf8(tail), Err(e) if e.valid_up_to() == 0 && e.error_len().is_none())
}

/// Accumulates byte chunks and yields complete UTF-8 text.
#[derive(Debug, Default)]
pub struct Utf8Framer {
    pending: Vec<u8>,
}

impl Utf8Framer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the text that is complete so far.
    ///
    /// Returns `None` when the chunk only extended an incomplete character.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(chunk);
        let boundary = find_utf8_boundary(&self.pending);
        if boundary == 0 {
            return None;
        }
        let rest = self.pending.split_off(boundary);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        Some(text)
    }

    /// Drains whatever is left, replacing an incomplete tail.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }

    /// Number of bytes held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
