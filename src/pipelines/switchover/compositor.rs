// SPDX-License-Identifier: GPL-3.0-only

//! Fade and blackout overlays
//!
//! Every delivered frame passes through [`FrameCompositor::apply`], which
//! blends solid black over the pixels according to the current
//! [`CompositingState`]:
//!
//! | Mode       | Alpha per frame                    | Ends when                     |
//! |------------|------------------------------------|-------------------------------|
//! | `Normal`   | none                               | -                             |
//! | `FadeIn`   | 255, 255-step, ... down to 0       | a frame is delivered at 0     |
//! | `FadeOut`  | 0, step, ... up to 255             | later frames are suppressed   |
//! | `Blackout` | 255                                | a switchover completes        |
//!
//! The blend only depends on `(mode, alpha)`, never on frame content.

use super::frame::{FrameEnvelope, FrameOrigin, OverlayStamp};
use crate::backends::camera::{CapturedFrame, PixelFormat};
use crate::constants::OPAQUE;
use crate::errors::CompositeError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Overlay mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompositingMode {
    #[default]
    Normal,
    FadeIn,
    FadeOut,
    Blackout,
}

impl std::fmt::Display for CompositingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::FadeIn => "fade-in",
            Self::FadeOut => "fade-out",
            Self::Blackout => "blackout",
        };
        f.write_str(name)
    }
}

/// Overlay mode and fade progress
///
/// Owned by the coordinator task and advanced once per delivered frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositingState {
    mode: CompositingMode,
    alpha: u8,
    step: u8,
    /// FadeOut delivered its opaque frame; further frames are suppressed
    drained: bool,
}

impl CompositingState {
    /// Start in `Normal` with the given fade step (0 is treated as 1)
    pub fn new(step: u8) -> Self {
        Self {
            mode: CompositingMode::Normal,
            alpha: 0,
            step: step.max(1),
            drained: false,
        }
    }

    pub fn mode(&self) -> CompositingMode {
        self.mode
    }

    /// Alpha the next frame will be blended with
    pub fn alpha(&self) -> u8 {
        match self.mode {
            CompositingMode::Normal => 0,
            CompositingMode::Blackout => OPAQUE,
            CompositingMode::FadeIn | CompositingMode::FadeOut => self.alpha,
        }
    }

    pub fn is_blackout(&self) -> bool {
        self.mode == CompositingMode::Blackout
    }

    /// Whether FadeOut has finished and frames are being withheld
    pub fn is_suppressing(&self) -> bool {
        self.mode == CompositingMode::FadeOut && self.drained
    }

    /// Fade in from fully opaque; clears a blackout
    pub fn begin_fade_in(&mut self) {
        self.begin_fade_in_from(OPAQUE);
    }

    /// Fade in from `alpha`, used to reverse an interrupted fade-out
    pub fn begin_fade_in_from(&mut self, alpha: u8) {
        self.drained = false;
        if alpha == 0 {
            self.mode = CompositingMode::Normal;
            self.alpha = 0;
        } else {
            self.mode = CompositingMode::FadeIn;
            self.alpha = alpha;
        }
    }

    /// Fade out from transparent; ignored while blacked out
    pub fn begin_fade_out(&mut self) {
        if self.is_blackout() {
            return;
        }
        self.mode = CompositingMode::FadeOut;
        self.alpha = 0;
        self.drained = false;
    }

    pub fn blackout(&mut self) {
        self.mode = CompositingMode::Blackout;
        self.alpha = OPAQUE;
        self.drained = false;
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.step);
    }

    /// Advance after a frame was delivered at `alpha`
    fn advance(&mut self, alpha: u8) {
        match self.mode {
            CompositingMode::FadeIn => {
                if alpha == 0 {
                    self.mode = CompositingMode::Normal;
                } else {
                    self.alpha = alpha.saturating_sub(self.step);
                }
            }
            CompositingMode::FadeOut => {
                if alpha == OPAQUE {
                    self.drained = true;
                } else {
                    self.alpha = alpha.saturating_add(self.step);
                }
            }
            CompositingMode::Normal | CompositingMode::Blackout => {}
        }
    }
}

impl Default for CompositingState {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_FADE_STEP)
    }
}

/// Applies the overlay of a [`CompositingState`] to frames
#[derive(Debug, Default)]
pub struct FrameCompositor {
    composited: u64,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite one frame and advance `state`
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - frame to deliver, stamped with the overlay used
    /// * `Ok(None)` - frame suppressed (fade-out finished)
    /// * `Err(CompositeError)` - malformed buffer; the frame must be dropped
    pub fn apply(
        &mut self,
        mut frame: FrameEnvelope,
        state: &mut CompositingState,
    ) -> Result<Option<FrameEnvelope>, CompositeError> {
        validate(&frame.frame)?;

        if state.is_suppressing() {
            return Ok(None);
        }

        let mode = state.mode();
        let alpha = state.alpha();
        blend_black(&mut frame.frame, alpha);
        frame.overlay = Some(OverlayStamp { mode, alpha });
        state.advance(alpha);

        self.composited += 1;
        if mode != CompositingMode::Normal {
            debug!(%mode, alpha, sequence = frame.sequence, "Composited overlay");
        }
        Ok(Some(frame))
    }

    /// Frames composited so far
    pub fn composited(&self) -> u64 {
        self.composited
    }
}

/// An all-black frame stamped as an opaque blackout
pub fn black_frame(width: u32, height: u32, format: PixelFormat) -> FrameEnvelope {
    let pixels = width as usize * height as usize;
    let data = match format {
        PixelFormat::RGBA | PixelFormat::BGRA => [0, 0, 0, OPAQUE].repeat(pixels),
        PixelFormat::RGB24 | PixelFormat::Gray8 => vec![0; format.buffer_len(width, height)],
        PixelFormat::NV12 | PixelFormat::I420 => {
            let mut data = vec![0; pixels];
            data.resize(format.buffer_len(width, height), 128);
            data
        }
    };

    let mut envelope = FrameEnvelope::new(
        CapturedFrame::new(width, height, format, data),
        0,
        FrameOrigin::Synthesized,
    );
    envelope.overlay = Some(OverlayStamp {
        mode: CompositingMode::Blackout,
        alpha: OPAQUE,
    });
    envelope
}

fn validate(frame: &CapturedFrame) -> Result<(), CompositeError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(CompositeError::InvalidGeometry {
            width: frame.width,
            height: frame.height,
        });
    }
    let expected = frame.format.buffer_len(frame.width, frame.height);
    if frame.data.len() != expected {
        return Err(CompositeError::BufferSize {
            expected,
            actual: frame.data.len(),
        });
    }
    Ok(())
}

/// Blend solid black at `alpha` over the frame in place
fn blend_black(frame: &mut CapturedFrame, alpha: u8) {
    if alpha == 0 {
        return;
    }
    let keep = (OPAQUE - alpha) as u32;
    let scale = |c: u8| ((c as u32 * keep + 127) / 255) as u8;
    // Chroma fades toward neutral grey rather than zero
    let scale_chroma = |c: u8| (128 + (c as i32 - 128) * keep as i32 / 255) as u8;

    if frame.format.is_yuv() {
        let luma = frame.width as usize * frame.height as usize;
        let (y_plane, chroma_planes) = frame.data.split_at_mut(luma);
        for y in y_plane {
            *y = scale(*y);
        }
        for c in chroma_planes {
            *c = scale_chroma(*c);
        }
    } else if frame.format.has_alpha() {
        for px in frame.data.chunks_exact_mut(4) {
            for c in &mut px[..3] {
                *c = scale(*c);
            }
        }
    } else {
        for c in frame.data.iter_mut() {
            *c = scale(*c);
        }
    }
}
