// SPDX-License-Identifier: GPL-3.0-only

//! In-process capture backend producing solid-colour test frames
//!
//! The synthetic backend implements [`DeviceDirectory`] and [`CaptureDriver`]
//! without touching hardware. Each camera either produces frames on its own
//! thread at the selected format's framerate ([`FrameMode::Auto`], used by the
//! CLI demo) or only when told to ([`FrameMode::Manual`], used by tests that
//! need exact control over arrival order).
//!
//! Device behaviour can be scripted per camera: permission denial, start
//! failure, slow opens, held starts, mid-stream failure and unplugging.

use super::frame_loop::{CaptureLoopController, LoopAction};
use super::{
    BackendError, BackendResult, CaptureDevice, CaptureDriver, CaptureFormat, CapturedFrame,
    DeviceDirectory, DeviceSession, FrameCallback, PixelFormat,
};
use crate::constants::synthetic::{DEMO_HEIGHT, DEMO_WIDTH};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a synthetic camera produces frames once started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// Frames only when [`SyntheticBackend::emit_frame`] is called
    #[default]
    Manual,
    /// Frames on a producer thread at the format's framerate
    Auto,
}

/// Scripted description of one synthetic camera
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    pub device: CaptureDevice,
    /// Solid colour (RGB) of every frame
    pub color: [u8; 3],
    pub mode: FrameMode,
    pub permission_denied: bool,
    pub fail_on_start: bool,
    /// Simulated driver latency inside `open`
    pub open_delay: Duration,
}

impl SyntheticCamera {
    /// A manual-mode camera with a single tiny BGRA format
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            device: CaptureDevice {
                id: id.to_string(),
                name: name.to_string(),
                is_default: false,
                formats: vec![CaptureFormat::new(4, 4, 15, PixelFormat::BGRA)],
            },
            color: [128, 128, 128],
            mode: FrameMode::Manual,
            permission_denied: false,
            fail_on_start: false,
            open_delay: Duration::ZERO,
        }
    }

    pub fn default_device(mut self) -> Self {
        self.device.is_default = true;
        self
    }

    /// Replace the advertised formats
    pub fn with_formats(mut self, formats: Vec<CaptureFormat>) -> Self {
        self.device.formats = formats;
        self
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn auto(mut self) -> Self {
        self.mode = FrameMode::Auto;
        self
    }

    pub fn deny_permission(mut self) -> Self {
        self.permission_denied = true;
        self
    }

    pub fn fail_on_start(mut self) -> Self {
        self.fail_on_start = true;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

/// Blocks `DeviceSession::start` for one camera until released
#[derive(Debug, Default)]
pub struct StartGate {
    released: Mutex<bool>,
    condvar: Condvar,
}

impl StartGate {
    pub fn release(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        *released = true;
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut released = self.released.lock().unwrap_or_else(PoisonError::into_inner);
        while !*released {
            released = self
                .condvar
                .wait(released)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct LiveSession {
    session_id: u64,
    device_id: String,
    format: CaptureFormat,
    callback: Arc<dyn FrameCallback>,
    alive: Arc<AtomicBool>,
}

#[derive(Default)]
struct SyntheticState {
    cameras: Vec<SyntheticCamera>,
    live: Vec<LiveSession>,
    gates: HashMap<String, Arc<StartGate>>,
    next_session: u64,
}

/// Shared handle to the synthetic device world
///
/// Clones share state, so a test can keep one handle for scripting while the
/// pipeline owns another as its directory and driver.
#[derive(Clone, Default)]
pub struct SyntheticBackend {
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three auto-mode cameras with different pixel layouts
    pub fn demo() -> Self {
        Self::new()
            .with_camera(
                SyntheticCamera::new("cam-1", "Integrated Camera")
                    .default_device()
                    .with_formats(vec![CaptureFormat::new(
                        DEMO_WIDTH,
                        DEMO_HEIGHT,
                        15,
                        PixelFormat::BGRA,
                    )])
                    .with_color([40, 90, 200])
                    .auto(),
            )
            .with_camera(
                SyntheticCamera::new("cam-2", "USB Webcam")
                    .with_formats(vec![
                        CaptureFormat::new(DEMO_WIDTH / 2, DEMO_HEIGHT / 2, 30, PixelFormat::RGBA),
                        CaptureFormat::new(DEMO_WIDTH, DEMO_HEIGHT, 15, PixelFormat::NV12),
                    ])
                    .with_color([60, 180, 75])
                    .auto(),
            )
            .with_camera(
                SyntheticCamera::new("cam-3", "Capture Card")
                    .with_formats(vec![CaptureFormat::new(
                        DEMO_WIDTH,
                        DEMO_HEIGHT,
                        30,
                        PixelFormat::RGB24,
                    )])
                    .with_color([230, 140, 30])
                    .auto(),
            )
    }

    pub fn with_camera(self, camera: SyntheticCamera) -> Self {
        self.add_camera(camera);
        self
    }

    /// Plug in a camera (replaces one with the same id)
    pub fn add_camera(&self, camera: SyntheticCamera) {
        info!(device = %camera.device.id, "Synthetic camera attached");
        let mut state = self.lock();
        state.cameras.retain(|c| c.device.id != camera.device.id);
        state.cameras.push(camera);
    }

    /// Unplug a camera; streaming sessions on it fail
    pub fn remove_camera(&self, device_id: &str) -> bool {
        let removed = {
            let mut state = self.lock();
            let before = state.cameras.len();
            state.cameras.retain(|c| c.device.id != device_id);
            before != state.cameras.len()
        };
        if removed {
            info!(device = %device_id, "Synthetic camera detached");
            self.fail_device(device_id, "device removed");
        }
        removed
    }

    pub fn set_permission_denied(&self, device_id: &str, denied: bool) {
        let mut state = self.lock();
        if let Some(camera) = state.cameras.iter_mut().find(|c| c.device.id == device_id) {
            camera.permission_denied = denied;
        }
    }

    /// Make the next `start` on `device_id` block until the gate is released
    pub fn hold_start(&self, device_id: &str) -> Arc<StartGate> {
        let gate = Arc::new(StartGate::default());
        self.lock()
            .gates
            .insert(device_id.to_string(), Arc::clone(&gate));
        gate
    }

    /// Whether a started session exists for `device_id`
    pub fn is_live(&self, device_id: &str) -> bool {
        self.lock().live.iter().any(|s| s.device_id == device_id)
    }

    /// Callbacks currently registered for `device_id`
    ///
    /// Holding on to one lets a test invoke it after the session stopped,
    /// the way a late driver notification would.
    pub fn callbacks(&self, device_id: &str) -> Vec<Arc<dyn FrameCallback>> {
        self.lock()
            .live
            .iter()
            .filter(|s| s.device_id == device_id)
            .map(|s| Arc::clone(&s.callback))
            .collect()
    }

    /// Push one frame to every started session of `device_id`
    ///
    /// Returns the number of sessions that received it.
    pub fn emit_frame(&self, device_id: &str) -> usize {
        let targets: Vec<(Arc<dyn FrameCallback>, CapturedFrame)> = {
            let state = self.lock();
            let Some(camera) = state.cameras.iter().find(|c| c.device.id == device_id) else {
                return 0;
            };
            state
                .live
                .iter()
                .filter(|s| s.device_id == device_id)
                .map(|s| {
                    let frame = solid_frame(s.format.pixel_format, s.format.width, s.format.height, camera.color);
                    (Arc::clone(&s.callback), frame)
                })
                .collect()
        };

        // Invoke outside the lock, callbacks may take their time
        let count = targets.len();
        for (callback, frame) in targets {
            callback.on_frame(frame);
        }
        count
    }

    /// Simulate a runtime device failure on every session of `device_id`
    pub fn fail_device(&self, device_id: &str, reason: &str) -> usize {
        let failed: Vec<LiveSession> = {
            let mut state = self.lock();
            let (failed, keep): (Vec<LiveSession>, Vec<LiveSession>) = std::mem::take(&mut state.live)
                .into_iter()
                .partition(|s| s.device_id == device_id);
            state.live = keep;
            failed
        };

        for session in &failed {
            warn!(device = %device_id, session = session.session_id, reason, "Synthetic device failure");
            session.alive.store(false, Ordering::SeqCst);
            session.callback.on_error(reason.to_string());
        }
        failed.len()
    }

    fn lock(&self) -> MutexGuard<'_, SyntheticState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unregister(&self, session_id: u64) {
        self.lock().live.retain(|s| s.session_id != session_id);
    }
}

impl DeviceDirectory for SyntheticBackend {
    fn enumerate(&self) -> Vec<CaptureDevice> {
        self.lock()
            .cameras
            .iter()
            .map(|c| c.device.clone())
            .collect()
    }
}

impl CaptureDriver for SyntheticBackend {
    fn open(
        &self,
        device: &CaptureDevice,
        format: &CaptureFormat,
    ) -> BackendResult<Box<dyn DeviceSession>> {
        let camera = self
            .lock()
            .cameras
            .iter()
            .find(|c| c.device.id == device.id)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound(device.id.clone()))?;

        if camera.permission_denied {
            return Err(BackendError::PermissionDenied(device.id.clone()));
        }

        if !camera.open_delay.is_zero() {
            std::thread::sleep(camera.open_delay);
        }

        debug!(device = %device.id, format = %format, "Synthetic session opened");
        Ok(Box::new(SyntheticSession {
            backend: self.clone(),
            camera,
            format: *format,
            session_id: None,
            alive: Arc::new(AtomicBool::new(false)),
            producer: None,
        }))
    }
}

struct SyntheticSession {
    backend: SyntheticBackend,
    camera: SyntheticCamera,
    format: CaptureFormat,
    session_id: Option<u64>,
    alive: Arc<AtomicBool>,
    producer: Option<CaptureLoopController>,
}

impl DeviceSession for SyntheticSession {
    fn start(&mut self, callback: Arc<dyn FrameCallback>) -> BackendResult<()> {
        if self.session_id.is_some() {
            return Ok(());
        }
        if self.camera.fail_on_start {
            return Err(BackendError::InitializationFailed(format!(
                "{} refused to start",
                self.camera.device.id
            )));
        }

        let device_id = self.camera.device.id.clone();
        let gate = {
            let mut state = self.backend.lock();
            let session_id = state.next_session;
            state.next_session += 1;
            self.session_id = Some(session_id);
            self.alive.store(true, Ordering::SeqCst);
            state.live.push(LiveSession {
                session_id,
                device_id: device_id.clone(),
                format: self.format,
                callback: Arc::clone(&callback),
                alive: Arc::clone(&self.alive),
            });
            state.gates.remove(&device_id)
        };

        // Frames emitted while the gate is held reach the callback before
        // start returns, like a driver that streams during its own setup
        if let Some(gate) = gate {
            debug!(device = %device_id, "Synthetic start held");
            gate.wait();
        }

        if self.camera.mode == FrameMode::Auto {
            let interval = self
                .format
                .framerate
                .frame_interval()
                .unwrap_or(Duration::from_millis(66));
            let alive = Arc::clone(&self.alive);
            let format = self.format;
            let color = self.camera.color;
            self.producer = Some(CaptureLoopController::start_paced(
                &device_id,
                interval,
                move || {
                    if !alive.load(Ordering::SeqCst) {
                        return LoopAction::Stop;
                    }
                    callback.on_frame(solid_frame(
                        format.pixel_format,
                        format.width,
                        format.height,
                        color,
                    ));
                    LoopAction::Continue
                },
            ));
        }

        Ok(())
    }

    fn stop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(session_id) = self.session_id.take() {
            debug!(device = %self.camera.device.id, session = session_id, "Synthetic session stopped");
            self.backend.unregister(session_id);
        }
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
    }
}

impl Drop for SyntheticSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a tightly packed frame filled with one colour
pub fn solid_frame(format: PixelFormat, width: u32, height: u32, rgb: [u8; 3]) -> CapturedFrame {
    let [r, g, b] = rgb;
    let pixels = width as usize * height as usize;
    let data = match format {
        PixelFormat::RGBA => [r, g, b, 255].repeat(pixels),
        PixelFormat::BGRA => [b, g, r, 255].repeat(pixels),
        PixelFormat::RGB24 => [r, g, b].repeat(pixels),
        PixelFormat::Gray8 => vec![luma(r, g, b); pixels],
        PixelFormat::NV12 | PixelFormat::I420 => {
            let (u, v) = chroma(r, g, b);
            let chroma_len = (format.buffer_len(width, height) - pixels) / 2;
            let mut data = vec![luma(r, g, b); pixels];
            if format == PixelFormat::NV12 {
                data.extend([u, v].repeat(chroma_len));
            } else {
                data.extend(std::iter::repeat_n(u, chroma_len));
                data.extend(std::iter::repeat_n(v, chroma_len));
            }
            data
        }
    };
    CapturedFrame::new(width, height, format, data)
}

// BT.601 integer approximations
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

fn chroma(r: u8, g: u8, b: u8) -> (u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let u = ((-43 * r - 85 * g + 128 * b) >> 8) + 128;
    let v = ((128 * r - 107 * g - 21 * b) >> 8) + 128;
    (u.clamp(0, 255) as u8, v.clamp(0, 255) as u8)
}
