// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot, drop-oldest frame exchange
//!
//! Decouples a capture callback (producer) from the compositing side
//! (consumer). Publishing replaces whatever is in the slot, so a slow
//! consumer always gets the newest frame and memory stays bounded to one
//! frame per channel. Frames are skipped, never reordered.

use super::frame::FrameEnvelope;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

#[derive(Default)]
pub struct SingleSlotFrameBuffer {
    slot: ArcSwapOption<FrameEnvelope>,
    dropped: AtomicU64,
}

impl SingleSlotFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, discarding any frame nobody took yet
    pub fn publish(&self, frame: FrameEnvelope) {
        if let Some(stale) = self.slot.swap(Some(Arc::new(frame))) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(sequence = stale.sequence, "Dropped unconsumed frame");
        }
    }

    /// Remove and return the current frame
    pub fn take(&self) -> Option<FrameEnvelope> {
        self.slot
            .swap(None)
            .map(|frame| Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Whether a frame is waiting
    pub fn is_occupied(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Frames replaced before they were taken
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SingleSlotFrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleSlotFrameBuffer")
            .field("occupied", &self.is_occupied())
            .field("dropped", &self.dropped())
            .finish()
    }
}
