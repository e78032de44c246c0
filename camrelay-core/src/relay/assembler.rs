//! JPEG frame assembly from an unstructured decoder byte stream
//!
//! The decoder writes concatenated JPEG images to its stdout in
//! arbitrarily sized chunks. The assembler anchors on the JPEG start
//! marker (`FF D8`) and end marker (`FF D9`) to cut that stream into
//! complete frames, including the case of several small frames packed
//! into a single read.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

fn starts_with_soi(data: &[u8]) -> bool {
    data.len() >= 2 && data[..2] == SOI
}

fn ends_with_eoi(data: &[u8]) -> bool {
    data.len() >= 2 && data[data.len() - 2..] == EOI
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

/// Stateful scanner turning decoder output chunks into complete frames.
///
/// Owned by exactly one stream session; `feed` is called once per chunk
/// in arrival order and never blocks.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    /// In-progress frame bytes. Invariant: empty or SOI-prefixed.
    pending: BytesMut,
    /// Prefix of `pending` already searched for an end marker, so
    /// repeated feeds do not rescan the whole buffer.
    scanned: usize,
    frames_dropped: u64,
}

impl FrameAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of partial frames discarded because a new start marker
    /// arrived before the previous frame completed.
    #[must_use]
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Feed one chunk of decoder output; returns every frame it completed,
    /// in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        if starts_with_soi(chunk) {
            if ends_with_eoi(chunk) {
                // Whole frame(s) delivered in one chunk; the pending
                // buffer is left untouched.
                let mut whole = BytesMut::from(chunk);
                let mut scanned = 0;
                return split_complete(&mut whole, &mut scanned);
            }

            // A new frame begins; whatever was half-assembled can no
            // longer complete.
            if !self.pending.is_empty() {
                self.frames_dropped += 1;
                warn!(
                    discarded_bytes = self.pending.len(),
                    "new start marker before frame completed, discarding partial frame"
                );
            }
            self.pending.clear();
            self.pending.extend_from_slice(chunk);
            self.scanned = 0;
            split_complete(&mut self.pending, &mut self.scanned)
        } else if !self.pending.is_empty() {
            self.pending.extend_from_slice(chunk);
            split_complete(&mut self.pending, &mut self.scanned)
        } else {
            // No frame in progress and no start marker to anchor on.
            trace!(len = chunk.len(), "dropping unanchored chunk");
            Vec::new()
        }
    }
}

/// Split every complete frame off the front of `buf`, leaving it empty or
/// holding an SOI-prefixed partial frame. Bytes between an end marker and
/// the next start marker are skipped.
fn split_complete(buf: &mut BytesMut, scanned: &mut usize) -> Vec<Bytes> {
    let mut frames = Vec::new();

    loop {
        // Align the buffer to the next start marker.
        match find_marker(buf, SOI) {
            Some(0) => {}
            Some(at) => {
                trace!(skipped = at, "skipping bytes before start marker");
                buf.advance(at);
                *scanned = 0;
            }
            None => {
                buf.clear();
                *scanned = 0;
                break;
            }
        }

        // The end marker cannot overlap the start marker, so searching
        // begins at offset 2; back up one byte from the scanned prefix so
        // a marker split across two feeds is still found.
        let from = (*scanned).saturating_sub(1).max(2).min(buf.len());
        match find_marker(&buf[from..], EOI) {
            Some(at) => {
                let frame_len = from + at + 2;
                frames.push(buf.split_to(frame_len).freeze());
                *scanned = 0;
            }
            None => {
                *scanned = buf.len();
                break;
            }
        }
    }

    frames
}
