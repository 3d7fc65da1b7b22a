// SPDX-License-Identifier: GPL-3.0-only

//! Frame sinks
//!
//! The pipeline hands finished frames to a [`FrameConsumer`] in delivery
//! order and never waits for it to catch up; slow consumers are absorbed by
//! the per-channel single-slot buffers upstream.

use super::frame::FrameEnvelope;
use crate::backends::camera::format_converters;
use crate::errors::{AppError, AppResult};
use futures::channel::mpsc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Sink for composited frames
pub trait FrameConsumer: Send + Sync {
    fn consume(&self, frame: FrameEnvelope);
}

impl<F> FrameConsumer for F
where
    F: Fn(FrameEnvelope) + Send + Sync,
{
    fn consume(&self, frame: FrameEnvelope) {
        self(frame)
    }
}

/// Forwards frames into an unbounded futures channel
///
/// Lets async code (and tests) await frames as a `Stream`.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    sender: mpsc::UnboundedSender<FrameEnvelope>,
}

impl ChannelConsumer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FrameEnvelope>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }
}

impl FrameConsumer for ChannelConsumer {
    fn consume(&self, frame: FrameEnvelope) {
        if self.sender.unbounded_send(frame).is_err() {
            debug!("Frame receiver dropped");
        }
    }
}

/// Writes every Nth frame to a directory as PNG
pub struct SnapshotConsumer {
    output_dir: PathBuf,
    every: u64,
    received: AtomicU64,
}

impl SnapshotConsumer {
    /// Save one frame out of every `every` (0 is treated as 1)
    pub fn new(output_dir: PathBuf, every: u32) -> Self {
        Self {
            output_dir,
            every: u64::from(every.max(1)),
            received: AtomicU64::new(0),
        }
    }

    /// Encode and write one frame, returning the file path
    pub fn save_frame(output_dir: &Path, index: u64, frame: &FrameEnvelope) -> AppResult<PathBuf> {
        let rgba = format_converters::to_rgba(&frame.frame)
            .ok_or_else(|| AppError::Storage(format!("Frame {} has a malformed buffer", index)))?;
        let image = image::RgbaImage::from_raw(frame.width(), frame.height(), rgba)
            .ok_or_else(|| AppError::Storage("Failed to create image buffer".into()))?;

        std::fs::create_dir_all(output_dir)
            .map_err(|e| AppError::Storage(format!("Failed to create {}: {}", output_dir.display(), e)))?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = output_dir.join(format!("FRAME_{}_{:06}.png", timestamp, index));
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| AppError::Storage(format!("PNG encoding failed: {}", e)))?;
        Ok(path)
    }
}

impl FrameConsumer for SnapshotConsumer {
    fn consume(&self, frame: FrameEnvelope) {
        let index = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        if index % self.every != 0 {
            return;
        }

        let output_dir = self.output_dir.clone();
        let write = move || match Self::save_frame(&output_dir, index, &frame) {
            Ok(path) => info!(path = %path.display(), "Snapshot saved"),
            Err(e) => warn!(error = %e, "Snapshot failed"),
        };

        // Encoding is CPU-bound, keep it off async worker threads
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}
