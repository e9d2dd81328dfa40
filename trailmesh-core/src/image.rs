use alloc::vec;
use alloc::vec::Vec;

use crate::payload::{ImageChunkPayload, ImageEndPayload, ImageStartPayload};
use crate::types::NodeId;

/// Outcome of feeding a frame (or the clock) to the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRxEvent {
    /// Every chunk arrived; `data` is the reassembled image.
    Completed {
        source: NodeId,
        image_id: u16,
        data: Vec<u8>,
    },
    /// The transfer ended incomplete (missing chunks, timeout, or it was
    /// displaced by a newer transfer). The partial buffer is discarded.
    Failed {
        source: NodeId,
        image_id: u16,
        received: u16,
        expected: u16,
    },
}

struct Reception {
    image_id: u16,
    source: NodeId,
    total_size: usize,
    total_chunks: u16,
    received_count: u16,
    buffer: Vec<u8>,
    /// One bit per chunk index, so duplicate chunks never double-count.
    chunk_seen: Vec<u64>,
    start_ms: u64,
}

impl Reception {
    fn mark_chunk(&mut self, index: u16) -> bool {
        let word = index as usize / 64;
        let bit = 1u64 << (index as usize % 64);
        if self.chunk_seen[word] & bit != 0 {
            return false;
        }
        self.chunk_seen[word] |= bit;
        true
    }

    fn failed(&self) -> ImageRxEvent {
        ImageRxEvent::Failed {
            source: self.source,
            image_id: self.image_id,
            received: self.received_count,
            expected: self.total_chunks,
        }
    }
}

/// Sink-side image reassembly.
///
/// At most one reception is active; a newer IMAGE_START displaces the current
/// one. Chunks are written at `chunk_index * chunk_size`, so out-of-order
/// arrival across relays is harmless. Missing chunks are never re-requested:
/// an incomplete transfer is reported as failed and discarded.
pub struct ImageReceiver {
    chunk_size: usize,
    max_chunks: u16,
    active: Option<Reception>,
}

impl ImageReceiver {
    pub fn new(chunk_size: usize, max_chunks: u16) -> Self {
        ImageReceiver {
            chunk_size,
            max_chunks,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Begin a reception, displacing any active one.
    ///
    /// Returns the failure event for a displaced transfer. Announcements that
    /// exceed the configured chunk budget are ignored.
    pub fn on_start(
        &mut self,
        source: NodeId,
        start: &ImageStartPayload,
        now_ms: u64,
    ) -> Option<ImageRxEvent> {
        let total_size = start.total_size as usize;
        if start.total_chunks > self.max_chunks
            || total_size > self.chunk_size * self.max_chunks as usize
        {
            return None;
        }

        let displaced = self.active.take().map(|r| r.failed());
        let words = (start.total_chunks as usize + 63) / 64;
        self.active = Some(Reception {
            image_id: start.image_id,
            source,
            total_size,
            total_chunks: start.total_chunks,
            received_count: 0,
            buffer: vec![0u8; total_size],
            chunk_seen: vec![0u64; words.max(1)],
            start_ms: now_ms,
        });
        displaced
    }

    /// Store one chunk. Completes the transfer when the last chunk lands.
    pub fn on_chunk(&mut self, chunk: &ImageChunkPayload<'_>) -> Option<ImageRxEvent> {
        let reception = match self.active.as_mut() {
            Some(r) if r.image_id == chunk.image_id => r,
            _ => return None, // stray chunk, no active transfer for it
        };
        if chunk.chunk_index >= reception.total_chunks {
            return None;
        }
        let offset = chunk.chunk_index as usize * self.chunk_size;
        if offset + chunk.data.len() > reception.total_size {
            return None;
        }
        if reception.mark_chunk(chunk.chunk_index) {
            reception.buffer[offset..offset + chunk.data.len()].copy_from_slice(chunk.data);
            reception.received_count += 1;
        }
        if reception.received_count == reception.total_chunks {
            return self.finish();
        }
        None
    }

    /// Terminate the matching transfer: complete if every chunk arrived,
    /// failed otherwise. Either way the state is freed.
    pub fn on_end(&mut self, end: &ImageEndPayload) -> Option<ImageRxEvent> {
        let matches = self
            .active
            .as_ref()
            .map(|r| r.image_id == end.image_id)
            .unwrap_or(false);
        if matches {
            self.finish()
        } else {
            None
        }
    }

    /// Abort a reception whose source went quiet.
    pub fn prune(&mut self, now_ms: u64, timeout_ms: u64) -> Option<ImageRxEvent> {
        let expired = match self.active.as_ref() {
            Some(r) => now_ms.saturating_sub(r.start_ms) > timeout_ms,
            None => false,
        };
        if expired {
            return self.active.take().map(|r| r.failed());
        }
        None
    }

    fn finish(&mut self) -> Option<ImageRxEvent> {
        let reception = self.active.take()?;
        if reception.received_count == reception.total_chunks {
            Some(ImageRxEvent::Completed {
                source: reception.source,
                image_id: reception.image_id,
                data: reception.buffer,
            })
        } else {
            Some(reception.failed())
        }
    }
}
