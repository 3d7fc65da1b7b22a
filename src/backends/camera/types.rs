// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture backends

//! Shared types for capture backends

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A selectable capture device as reported by a [`super::DeviceDirectory`]
///
/// Devices are immutable snapshots; the pipeline never owns the underlying
/// hardware through this type, it only uses the id to open a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDevice {
    /// Stable identifier used to open the device
    pub id: String,
    /// Human readable name for device pickers
    pub name: String,
    /// Whether the platform marks this device as the default camera
    pub is_default: bool,
    /// Formats the device advertises, in driver order
    pub formats: Vec<CaptureFormat>,
}

impl std::fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    pub fn as_int(&self) -> u32 {
        self.num / self.denom
    }

    /// Time between two frames, `None` for a zero rate
    pub fn frame_interval(&self) -> Option<std::time::Duration> {
        if self.num == 0 {
            return None;
        }
        let nanos = 1_000_000_000u64 * self.denom as u64 / self.num as u64;
        Some(std::time::Duration::from_nanos(nanos))
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::from_int(crate::constants::DEFAULT_FPS)
    }
}

/// Capture format: resolution, framerate and pixel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: Framerate,
    pub pixel_format: PixelFormat,
}

impl CaptureFormat {
    pub fn new(width: u32, height: u32, fps: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            framerate: Framerate::from_int(fps),
            pixel_format,
        }
    }

    /// Total pixel count, used to rank formats
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self::new(640, 480, crate::constants::DEFAULT_FPS, PixelFormat::BGRA)
    }
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps {}",
            self.width, self.height, self.framerate, self.pixel_format
        )
    }
}

/// Pixel layout of a decoded frame
///
/// Buffers are tightly packed (no row padding). Planar YUV formats store
/// the Y plane followed by the chroma plane(s) at half resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// BGRA - 32-bit with alpha (B G R A byte order), the native
    /// layout of most desktop capture stacks
    BGRA,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    NV12,
    /// I420 - Planar 4:2:0 (separate Y, U, V planes)
    I420,
}

impl PixelFormat {
    /// Y plane followed by quarter-resolution chroma
    pub fn is_yuv(&self) -> bool {
        matches!(self, Self::NV12 | Self::I420)
    }

    /// Whether the format carries an alpha byte per pixel
    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::RGBA | Self::BGRA)
    }

    /// Exact buffer length for a tightly packed frame of this format
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::RGBA | Self::BGRA => w * h * 4,
            Self::RGB24 => w * h * 3,
            Self::Gray8 => w * h,
            // Chroma planes round up for odd dimensions
            Self::NV12 | Self::I420 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RGBA => "RGBA",
            Self::BGRA => "BGRA",
            Self::RGB24 => "RGB24",
            Self::Gray8 => "GRAY8",
            Self::NV12 => "NV12",
            Self::I420 => "I420",
        };
        f.write_str(name)
    }
}

/// A decoded frame as handed over by a capture driver
///
/// The pixel buffer is owned exclusively; ownership moves through the
/// pipeline rather than being shared.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    /// Timestamp when the driver produced the frame
    pub captured_at: Instant,
}

impl CapturedFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
            captured_at: Instant::now(),
        }
    }

    /// Whether the buffer length matches the declared geometry
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.format.buffer_len(self.width, self.height)
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types reported by capture drivers and device directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Camera device not found or no longer enumerable
    DeviceNotFound(String),
    /// The environment denied access to the device (privacy settings, portal)
    PermissionDenied(String),
    /// Failed to open or start the device
    InitializationFailed(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_len_packed_formats() {
        assert_eq!(PixelFormat::BGRA.buffer_len(4, 2), 32);
        assert_eq!(PixelFormat::RGB24.buffer_len(4, 2), 24);
        assert_eq!(PixelFormat::Gray8.buffer_len(4, 2), 8);
    }

    #[test]
    fn test_buffer_len_odd_yuv() {
        // 3x3 luma + two 2x2 chroma planes
        assert_eq!(PixelFormat::I420.buffer_len(3, 3), 9 + 8);
        assert_eq!(PixelFormat::NV12.buffer_len(4, 4), 16 + 8);
    }

    #[test]
    fn test_format_layout_classes() {
        assert!(PixelFormat::NV12.is_yuv() && PixelFormat::I420.is_yuv());
        assert!(!PixelFormat::BGRA.is_yuv());
        assert!(PixelFormat::RGBA.has_alpha() && PixelFormat::BGRA.has_alpha());
        assert!(!PixelFormat::RGB24.has_alpha() && !PixelFormat::Gray8.has_alpha());
    }

    #[test]
    fn test_framerate_interval() {
        let fps = Framerate::from_int(20);
        assert_eq!(fps.frame_interval(), Some(std::time::Duration::from_millis(50)));
        assert_eq!(Framerate::from_int(0).frame_interval(), None);
        assert_eq!(Framerate::new(60000, 1001).to_string(), "59.94");
    }

    #[test]
    fn test_well_formed_frame() {
        let frame = CapturedFrame::new(2, 2, PixelFormat::BGRA, vec![0; 16]);
        assert!(frame.is_well_formed());
        let torn = CapturedFrame::new(2, 2, PixelFormat::BGRA, vec![0; 15]);
        assert!(!torn.is_well_formed());
    }
}
