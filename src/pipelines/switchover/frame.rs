// SPDX-License-Identifier: GPL-3.0-only

//! Frames crossing the switchover pipeline

use super::compositor::CompositingMode;
use crate::backends::camera::{CapturedFrame, PixelFormat};
use serde::{Deserialize, Serialize};

/// Identity of one capture channel instance
///
/// Ids are never reused within a pipeline, so a reopened device gets a new
/// id and late notifications from its predecessor stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Where a delivered frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    /// Captured by a channel
    Channel(ChannelId),
    /// Generated by the pipeline (blackout keepalive, terminal frame)
    Synthesized,
}

/// Overlay the compositor applied to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStamp {
    pub mode: CompositingMode,
    pub alpha: u8,
}

/// One decoded frame travelling from a channel to the consumer
#[derive(Debug, Clone)]
pub struct FrameEnvelope {
    pub frame: CapturedFrame,
    /// Per-channel arrival sequence, starting at 1
    pub sequence: u64,
    pub origin: FrameOrigin,
    /// Set once the frame went through the compositor
    pub overlay: Option<OverlayStamp>,
}

impl FrameEnvelope {
    pub fn new(frame: CapturedFrame, sequence: u64, origin: FrameOrigin) -> Self {
        Self {
            frame,
            sequence,
            origin,
            overlay: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn format(&self) -> PixelFormat {
        self.frame.format
    }

    pub fn data(&self) -> &[u8] {
        &self.frame.data
    }

    /// Channel that captured the frame, `None` for synthesized frames
    pub fn channel(&self) -> Option<ChannelId> {
        match self.origin {
            FrameOrigin::Channel(id) => Some(id),
            FrameOrigin::Synthesized => None,
        }
    }

    /// Whether every colour sample is black (alpha bytes and neutral
    /// chroma are ignored)
    pub fn is_black(&self) -> bool {
        let data = self.data();
        let format = self.format();
        if format.is_yuv() {
            let luma = self.width() as usize * self.height() as usize;
            data[..luma.min(data.len())].iter().all(|&y| y == 0)
        } else if format.has_alpha() {
            data.chunks_exact(4).all(|px| px[..3].iter().all(|&c| c == 0))
        } else {
            data.iter().all(|&c| c == 0)
        }
    }
}
