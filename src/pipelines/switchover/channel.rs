// SPDX-License-Identifier: GPL-3.0-only

//! One device's capture session
//!
//! A [`CaptureChannel`] wraps a driver [`DeviceSession`] with a lifecycle
//! state machine and a [`SingleSlotFrameBuffer`]. Frames are pushed from
//! driver threads into the channel's [`FrameSink`], which publishes them to
//! the slot and notifies the coordinator through the shared event intake.
//!
//! ```text
//! Idle ──start──▶ Starting ──▶ Streaming ──detach/stop──▶ Stopping ──▶ Idle
//!                     │             │
//!                     └──on_error───┴──▶ Failed (terminal)
//!
//! any ──dispose──▶ Disposed
//! ```

use super::frame::{ChannelId, FrameEnvelope, FrameOrigin};
use super::frame_slot::SingleSlotFrameBuffer;
use crate::backends::camera::{
    CaptureDevice, CaptureDriver, CaptureFormat, CapturedFrame, DeviceDirectory, DeviceSession,
    FrameCallback, resolve_device, select_preferred_format,
};
use crate::constants::timing;
use crate::errors::ChannelError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Lifecycle of a capture channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    Idle = 0,
    Starting = 1,
    Streaming = 2,
    Stopping = 3,
    Failed = 4,
    Disposed = 5,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Starting,
            2 => Self::Streaming,
            3 => Self::Stopping,
            4 => Self::Failed,
            _ => Self::Disposed,
        }
    }

    /// Whether frames from the driver are accepted
    pub fn accepts_frames(self) -> bool {
        matches!(self, Self::Starting | Self::Streaming)
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Notification from a channel to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel's slot holds a new frame
    FrameReady(ChannelId),
    /// The device failed while streaming
    Failed { channel: ChannelId, reason: String },
}

/// Sending half of the coordinator's event intake
pub type EventIntake = mpsc::UnboundedSender<ChannelEvent>;

/// State shared between a channel and its driver callback
struct ChannelShared {
    id: ChannelId,
    device_id: String,
    state: AtomicU8,
    slot: SingleSlotFrameBuffer,
    sequence: AtomicU64,
    intake: EventIntake,
    stale_frames: Arc<AtomicU64>,
}

impl ChannelShared {
    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ChannelState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Driver-facing callback of one channel
///
/// Every invocation re-checks the channel state, so callbacks that were
/// already dispatched when the channel stopped drop their frame.
struct FrameSink {
    shared: Arc<ChannelShared>,
}

impl FrameCallback for FrameSink {
    fn on_frame(&self, frame: CapturedFrame) {
        let shared = &self.shared;
        if !shared.state().accepts_frames() {
            shared.stale_frames.fetch_add(1, Ordering::Relaxed);
            trace!(channel = %shared.id, "Dropped frame from stopped channel");
            return;
        }

        let sequence = shared.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        if sequence % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                channel = %shared.id,
                device = %shared.device_id,
                sequence,
                width = frame.width,
                height = frame.height,
                "Frame received"
            );
        }

        shared.slot.publish(FrameEnvelope::new(
            frame,
            sequence,
            FrameOrigin::Channel(shared.id),
        ));
        // Coordinator gone means the pipeline is shutting down
        let _ = shared.intake.send(ChannelEvent::FrameReady(shared.id));
    }

    fn on_error(&self, reason: String) {
        let shared = &self.shared;
        let failed = shared.transition(ChannelState::Streaming, ChannelState::Failed)
            || shared.transition(ChannelState::Starting, ChannelState::Failed);
        if !failed {
            debug!(channel = %shared.id, %reason, "Ignoring error from inactive channel");
            return;
        }

        warn!(channel = %shared.id, device = %shared.device_id, %reason, "Capture device failed");
        let _ = shared.intake.send(ChannelEvent::Failed {
            channel: shared.id,
            reason,
        });
    }
}

/// Everything needed to open channels
#[derive(Clone)]
pub struct ChannelBackend {
    directory: Arc<dyn DeviceDirectory>,
    driver: Arc<dyn CaptureDriver>,
    intake: EventIntake,
    defaults: CaptureFormat,
    stale_frames: Arc<AtomicU64>,
}

impl ChannelBackend {
    /// Create a backend together with the receiving end of its intake
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        driver: Arc<dyn CaptureDriver>,
        defaults: CaptureFormat,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (intake, events) = mpsc::unbounded_channel();
        let backend = Self {
            directory,
            driver,
            intake,
            defaults,
            stale_frames: Arc::new(AtomicU64::new(0)),
        };
        (backend, events)
    }

    /// Enumerate devices on the blocking pool
    pub async fn enumerate(&self) -> Vec<CaptureDevice> {
        let directory = Arc::clone(&self.directory);
        match tokio::task::spawn_blocking(move || directory.enumerate()).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Device enumeration task failed");
                Vec::new()
            }
        }
    }

    /// Counter of frames dropped because their channel was no longer live
    pub fn stale_frames(&self) -> &Arc<AtomicU64> {
        &self.stale_frames
    }
}

/// One device's capture session
pub struct CaptureChannel {
    shared: Arc<ChannelShared>,
    device: CaptureDevice,
    format: CaptureFormat,
    session: Option<Box<dyn DeviceSession>>,
}

impl CaptureChannel {
    /// Open a device
    ///
    /// With no `device_id` the default-flagged device is used, falling back
    /// to the first enumerated one.
    ///
    /// # Errors
    /// * `DeviceNotFound` - no devices, or `device_id` does not resolve
    /// * `PermissionDenied` - the driver was denied access
    pub async fn open(
        id: ChannelId,
        backend: &ChannelBackend,
        device_id: Option<&str>,
    ) -> Result<Self, ChannelError> {
        let directory = Arc::clone(&backend.directory);
        let driver = Arc::clone(&backend.driver);
        let defaults = backend.defaults;
        let requested = device_id.map(str::to_string);

        let (device, format, session) = tokio::task::spawn_blocking(move || {
            let devices = directory.enumerate();
            let device = resolve_device(&devices, requested.as_deref()).ok_or_else(|| {
                match &requested {
                    Some(id) => ChannelError::DeviceNotFound(id.clone()),
                    None => ChannelError::DeviceNotFound("no capture devices available".into()),
                }
            })?;
            let format = select_preferred_format(&device, &defaults);
            let session = driver.open(&device, &format)?;
            Ok::<_, ChannelError>((device, format, session))
        })
        .await??;

        info!(channel = %id, device = %device.id, name = %device.name, format = %format, "Channel opened");

        Ok(Self {
            shared: Arc::new(ChannelShared {
                id,
                device_id: device.id.clone(),
                state: AtomicU8::new(ChannelState::Idle as u8),
                slot: SingleSlotFrameBuffer::new(),
                sequence: AtomicU64::new(0),
                intake: backend.intake.clone(),
                stale_frames: Arc::clone(&backend.stale_frames),
            }),
            device,
            format,
            session: Some(session),
        })
    }

    /// Register the frame sink and begin streaming
    ///
    /// Idempotent while streaming. Frames that arrive before this returns
    /// are kept in the channel's slot.
    pub async fn start(&mut self) -> Result<(), ChannelError> {
        match self.state() {
            ChannelState::Streaming => return Ok(()),
            ChannelState::Idle => {}
            state => {
                return Err(ChannelError::InvalidState(format!(
                    "cannot start a {} channel",
                    state
                )));
            }
        }
        let Some(mut session) = self.session.take() else {
            return Err(ChannelError::InvalidState(
                "device handle already released".into(),
            ));
        };

        self.shared.set_state(ChannelState::Starting);
        let sink: Arc<dyn FrameCallback> = Arc::new(FrameSink {
            shared: Arc::clone(&self.shared),
        });

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = session.start(sink);
            (session, result)
        })
        .await?;
        self.session = Some(session);

        if let Err(e) = result {
            warn!(channel = %self.id(), device = %self.device.id, error = %e, "Channel failed to start");
            self.shared.set_state(ChannelState::Failed);
            return Err(e.into());
        }

        if !self
            .shared
            .transition(ChannelState::Starting, ChannelState::Streaming)
        {
            let state = self.state();
            return Err(match state {
                ChannelState::Failed => {
                    ChannelError::StartFailed(format!("{} failed while starting", self.device.id))
                }
                _ => ChannelError::InvalidState(format!("channel became {} while starting", state)),
            });
        }

        info!(channel = %self.id(), device = %self.device.id, "Channel streaming");
        Ok(())
    }

    /// Stop accepting frames without releasing the device
    ///
    /// Cheap and non-blocking; used at promotion so the outgoing channel
    /// goes quiet immediately while the blocking release happens later.
    pub fn detach(&self) {
        let _ = self
            .shared
            .transition(ChannelState::Streaming, ChannelState::Stopping)
            || self
                .shared
                .transition(ChannelState::Starting, ChannelState::Stopping);
    }

    /// Unregister the sink and release the device handle
    ///
    /// Idempotent. May block on the driver.
    pub fn stop(&mut self) {
        let state = self.state();
        if state.accepts_frames() {
            self.shared.set_state(ChannelState::Stopping);
        }

        if let Some(mut session) = self.session.take() {
            session.stop();
            debug!(channel = %self.id(), device = %self.device.id, "Device handle released");
        }
        let _ = self.shared.slot.take();

        if matches!(self.state(), ChannelState::Stopping) {
            self.shared.set_state(ChannelState::Idle);
        }
    }

    /// Stop and mark the channel unusable
    pub fn dispose(mut self) {
        self.stop();
        self.shared.set_state(ChannelState::Disposed);
        debug!(channel = %self.id(), "Channel disposed");
    }

    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    pub fn device(&self) -> &CaptureDevice {
        &self.device
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Take the newest unconsumed frame
    pub fn take_frame(&self) -> Option<FrameEnvelope> {
        self.shared.slot.take()
    }

    /// Frames replaced in the slot before they were taken
    pub fn frames_skipped(&self) -> u64 {
        self.shared.slot.dropped()
    }
}

impl Drop for CaptureChannel {
    fn drop(&mut self) {
        if self.state() != ChannelState::Disposed {
            self.stop();
        }
    }
}

impl std::fmt::Debug for CaptureChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureChannel")
            .field("id", &self.id())
            .field("device", &self.device.id)
            .field("format", &self.format)
            .field("state", &self.state())
            .finish()
    }
}
