// SPDX-License-Identifier: MPL-2.0

//! Capture backend abstraction
//!
//! Platform capture stacks plug into the pipeline through three small traits:
//!
//! ```text
//! ┌─────────────────────┐
//! │   DeviceDirectory   │  ← enumerate devices (hot-plug aware callers re-query)
//! └──────────┬──────────┘
//!            │ device id
//!            ▼
//! ┌─────────────────────┐
//! │   CaptureDriver     │  ← open a device with a chosen format
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   DeviceSession     │  ← start/stop, frames pushed into a FrameCallback
//! └─────────────────────┘
//! ```
//!
//! Driver calls are blocking; the pipeline runs them on tokio's blocking pool.
//! The [`synthetic`] backend implements all three traits in-process and is
//! used by the CLI demo and the test suite.

pub mod format_converters;
pub mod frame_loop;
pub mod synthetic;
pub mod types;

pub use types::*;

use crate::constants::formats;
use std::sync::Arc;
use tracing::debug;

/// Source of enumerable capture devices
pub trait DeviceDirectory: Send + Sync {
    /// Enumerate available devices, in platform order
    ///
    /// No caching contract: callers may invoke this repeatedly, e.g. after a
    /// hot-plug notification.
    fn enumerate(&self) -> Vec<CaptureDevice>;
}

/// Opens capture sessions on devices
pub trait CaptureDriver: Send + Sync {
    /// Open `device` with `format`
    ///
    /// # Returns
    /// * `Err(BackendError::PermissionDenied)` - access denied by the environment
    /// * `Err(BackendError::DeviceNotFound)` - the device disappeared
    fn open(
        &self,
        device: &CaptureDevice,
        format: &CaptureFormat,
    ) -> BackendResult<Box<dyn DeviceSession>>;
}

/// One open device handle
pub trait DeviceSession: Send {
    /// Register `callback` and begin asynchronous frame delivery
    fn start(&mut self, callback: Arc<dyn FrameCallback>) -> BackendResult<()>;

    /// Unregister the callback and release the device
    ///
    /// Must be idempotent. Callback invocations already dispatched may still
    /// run after this returns.
    fn stop(&mut self);
}

/// Receiver of driver notifications, invoked on driver threads
pub trait FrameCallback: Send + Sync {
    /// A decoded frame is available
    fn on_frame(&self, frame: CapturedFrame);

    /// The device failed while streaming; no further frames will follow
    fn on_error(&self, reason: String);
}

/// Resolve a requested device id against an enumeration
///
/// With no id, the default-flagged device wins, then the first one.
pub fn resolve_device(devices: &[CaptureDevice], device_id: Option<&str>) -> Option<CaptureDevice> {
    match device_id {
        Some(id) => devices.iter().find(|d| d.id == id).cloned(),
        None => devices
            .iter()
            .find(|d| d.is_default)
            .or_else(|| devices.first())
            .cloned(),
    }
}

/// Pick the device after `current` in enumeration order, wrapping around
///
/// Returns `None` when there is no device other than `current`.
pub fn next_device(devices: &[CaptureDevice], current: Option<&str>) -> Option<CaptureDevice> {
    let Some(current) = current else {
        return resolve_device(devices, None);
    };

    match devices.iter().position(|d| d.id == current) {
        Some(index) => {
            let next = &devices[(index + 1) % devices.len()];
            (next.id != current).then(|| next.clone())
        }
        // Current device vanished (unplugged): start over from the default
        None => resolve_device(devices, None),
    }
}

/// Select the capture format for a device
///
/// Preference order:
/// 1. BGRA at least 1080 pixels wide (largest first)
/// 2. Largest area, higher framerate breaking ties
/// 3. `fallback` when the device advertises nothing
pub fn select_preferred_format(device: &CaptureDevice, fallback: &CaptureFormat) -> CaptureFormat {
    let preferred = device
        .formats
        .iter()
        .filter(|f| {
            f.width >= formats::PREFERRED_MIN_WIDTH
                && f.pixel_format == formats::PREFERRED_PIXEL_FORMAT
        })
        .max_by_key(|f| (f.area(), f.framerate.as_int()));

    if let Some(format) = preferred {
        debug!(device = %device.id, format = %format, "Selected preferred format");
        return *format;
    }

    match device
        .formats
        .iter()
        .max_by_key(|f| (f.area(), f.framerate.as_int()))
    {
        Some(format) => {
            debug!(device = %device.id, format = %format, "Selected largest format");
            *format
        }
        None => {
            debug!(device = %device.id, format = %fallback, "Device advertises no formats, using default");
            *fallback
        }
    }
}
