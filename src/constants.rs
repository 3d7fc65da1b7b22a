// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Capture framerate used when a device does not advertise one
pub const DEFAULT_FPS: u32 = 15;

/// Alpha removed (fade-in) or added (fade-out) per delivered frame
pub const DEFAULT_FADE_STEP: u8 = 70;

/// Alpha of a fully opaque overlay
pub const OPAQUE: u8 = 255;

/// Capacity of the informational event broadcast
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Format selection preferences
pub mod formats {
    use crate::backends::camera::PixelFormat;

    /// Minimum width for the preferred capture format
    pub const PREFERRED_MIN_WIDTH: u32 = 1080;

    /// Pixel layout preferred by the compositor (no conversion needed)
    pub const PREFERRED_PIXEL_FORMAT: PixelFormat = PixelFormat::BGRA;
}

pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Wait before re-enumerating after a hot-plug, slow devices take a
    /// moment to show up
    pub const ENUMERATION_SETTLE_MS: u64 = 1500;

    /// Granularity of stop-signal checks inside paced capture loops
    pub const LOOP_POLL_INTERVAL: Duration = Duration::from_millis(5);
}

/// Synthetic driver defaults used by the CLI demo
pub mod synthetic {
    /// Demo camera resolution
    pub const DEMO_WIDTH: u32 = 320;
    pub const DEMO_HEIGHT: u32 = 240;
}
