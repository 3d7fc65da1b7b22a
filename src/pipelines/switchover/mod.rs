// SPDX-License-Identifier: GPL-3.0-only

//! Live camera switchover
//!
//! Switches the device feeding the outgoing frame stream without stopping
//! delivery, masking the handoff with fade and blackout overlays.
//!
//! # Architecture
//!
//! ```text
//!  driver threads                 coordinator task                consumer
//! ┌──────────────┐  FrameReady   ┌─────────────────────┐
//! │ channel ch1  │──────────────▶│ active == ch1 ?     │
//! │  [slot]      │               │   take slot         │  frame   ┌──────────┐
//! └──────────────┘               │   FrameCompositor   │─────────▶│ Consumer │
//! ┌──────────────┐  FrameReady   │ incoming == ch2 ?   │          └──────────┘
//! │ channel ch2  │──────────────▶│   keep buffered     │
//! │  [slot]      │               │ otherwise: stale    │
//! └──────────────┘               └─────────────────────┘
//!                                   ▲            │ spawn
//!                     InitMessage   │            ▼
//!                               ┌─────────────────────┐
//!                               │ init task: open +   │
//!                               │ start incoming      │
//!                               └─────────────────────┘
//! ```
//!
//! A single tokio task owns the active channel, the compositing state and
//! the session queue, so promotion is a plain field swap and every frame
//! passes one identity check at dispatch.
//!
//! Switch requests are queued: a request arriving while another is in
//! flight starts once that one completes or aborts.

pub mod channel;
pub mod compositor;
pub mod consumer;
pub mod events;
pub mod frame;
pub mod frame_slot;
pub mod session;

pub use channel::{CaptureChannel, ChannelBackend, ChannelEvent, ChannelState};
pub use compositor::{CompositingMode, CompositingState, FrameCompositor, black_frame};
pub use consumer::{ChannelConsumer, FrameConsumer, SnapshotConsumer};
pub use events::PipelineEvent;
pub use frame::{ChannelId, FrameEnvelope, FrameOrigin, OverlayStamp};
pub use frame_slot::SingleSlotFrameBuffer;
pub use session::{SwitchOutcome, SwitchPhase, SwitchTarget, SwitchoverSession};

use crate::backends::camera::{
    CaptureDevice, CaptureDriver, CaptureFormat, DeviceDirectory, PixelFormat, next_device,
    resolve_device,
};
use crate::config::Config;
use crate::constants::{EVENT_CHANNEL_CAPACITY, timing};
use crate::errors::{ChannelError, SwitchError};
use session::PendingSwitch;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Snapshot of the coordinator's state
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    /// Phase of the in-flight switchover, if any
    pub switch_phase: Option<SwitchPhase>,
    pub session: Option<Uuid>,
    pub active_device: Option<CaptureDevice>,
    pub active_channel: Option<ChannelId>,
    pub channel_state: Option<ChannelState>,
    pub mode: CompositingMode,
    pub alpha: u8,
    /// Blacked out after a device failure
    pub camera_off: bool,
    pub capture: Option<CaptureFormat>,
    /// Requests waiting behind the in-flight one
    pub queued: usize,
    pub frames_delivered: u64,
    pub frames_suppressed: u64,
    pub stale_frames_dropped: u64,
    pub composite_failures: u64,
}

enum Command {
    Switch(PendingSwitch),
    RefreshDevices(oneshot::Sender<Vec<CaptureDevice>>),
    Status(oneshot::Sender<PipelineStatus>),
    Teardown(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Progress reports from an initialization task
enum InitMessage {
    Opened {
        session: Uuid,
        device: CaptureDevice,
    },
    Finished {
        session: Uuid,
        result: Result<Initialized, SwitchError>,
    },
}

enum Initialized {
    Opened(CaptureChannel),
    /// The default device resolved to the one already streaming
    AlreadyActive,
}

struct InFlight {
    session: SwitchoverSession,
    request: PendingSwitch,
}

/// Handle to a running switchover pipeline
///
/// Dropping the handle tears the pipeline down (including the terminal
/// black frame) and ends the coordinator task.
pub struct Pipeline {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<PipelineEvent>,
    task: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Start the coordinator task on the current tokio runtime
    ///
    /// Nothing is captured until the first switch request.
    pub fn spawn(
        directory: Arc<dyn DeviceDirectory>,
        driver: Arc<dyn CaptureDriver>,
        consumer: Arc<dyn FrameConsumer>,
        config: &Config,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (backend, intake) = ChannelBackend::new(directory, driver, config.default_capture);
        let (init_tx, init_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator {
            backend,
            consumer,
            events: events.clone(),
            init_tx,
            active: None,
            in_flight: None,
            queue: VecDeque::new(),
            compositing: CompositingState::new(config.fade_step),
            compositor: FrameCompositor::new(),
            camera_off: false,
            fade_out_on_switch: config.fade_out_on_switch,
            keepalive: config
                .blackout_keepalive_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            keepalive_at: None,
            settle: Duration::from_millis(config.enumeration_settle_ms),
            default_capture: config.default_capture,
            last_geometry: None,
            last_device: None,
            terminal_sent: false,
            next_channel: 1,
            frames_delivered: 0,
            frames_suppressed: 0,
            composite_failures: 0,
        };

        info!(
            fade_step = config.fade_step,
            fade_out_on_switch = config.fade_out_on_switch,
            "Switchover pipeline started"
        );
        let task = tokio::spawn(coordinator.run(command_rx, intake, init_rx));

        Self {
            commands,
            events,
            task: Some(task),
        }
    }

    /// Receive informational events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Queue a switch and return the receiver for its result
    ///
    /// The receiver errors if the pipeline shut down before answering.
    pub fn request_switch(
        &self,
        target: SwitchTarget,
    ) -> oneshot::Receiver<Result<SwitchOutcome, SwitchError>> {
        let (reply, receiver) = oneshot::channel();
        // A failed send drops the reply sender, which the receiver observes
        let _ = self
            .commands
            .send(Command::Switch(PendingSwitch { target, reply }));
        receiver
    }

    /// Switch to `device_id`, or to the default device when `None`
    pub async fn switch_to(&self, device_id: Option<&str>) -> Result<SwitchOutcome, SwitchError> {
        let target = SwitchTarget::Device(device_id.map(str::to_string));
        self.request_switch(target)
            .await
            .map_err(|_| SwitchError::PipelineClosed)?
    }

    /// Switch to the next device in enumeration order, wrapping around
    pub async fn cycle(&self) -> Result<SwitchOutcome, SwitchError> {
        self.request_switch(SwitchTarget::Next)
            .await
            .map_err(|_| SwitchError::PipelineClosed)?
    }

    /// Re-enumerate devices after the settle delay and broadcast the result
    pub async fn refresh_devices(&self) -> Result<Vec<CaptureDevice>, SwitchError> {
        self.call(Command::RefreshDevices).await
    }

    pub async fn status(&self) -> Result<PipelineStatus, SwitchError> {
        self.call(Command::Status).await
    }

    /// Stop capturing and deliver the terminal black frame
    ///
    /// The pipeline stays usable; a later switch request starts capture
    /// again.
    pub async fn teardown(&self) -> Result<(), SwitchError> {
        self.call(Command::Teardown).await
    }

    /// Tear down and end the coordinator task
    pub async fn shutdown(mut self) -> Result<(), SwitchError> {
        let result = self.call(Command::Shutdown).await;
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "Coordinator task panicked");
        }
        result
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SwitchError> {
        let (reply, receiver) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SwitchError::PipelineClosed)?;
        receiver.await.map_err(|_| SwitchError::PipelineClosed)
    }
}

/// State owned by the coordinator task
struct Coordinator {
    backend: ChannelBackend,
    consumer: Arc<dyn FrameConsumer>,
    events: broadcast::Sender<PipelineEvent>,
    init_tx: mpsc::UnboundedSender<InitMessage>,

    active: Option<CaptureChannel>,
    in_flight: Option<InFlight>,
    queue: VecDeque<PendingSwitch>,

    compositing: CompositingState,
    compositor: FrameCompositor,
    camera_off: bool,
    fade_out_on_switch: bool,
    keepalive: Option<Duration>,
    keepalive_at: Option<Instant>,
    settle: Duration,
    default_capture: CaptureFormat,
    last_geometry: Option<(u32, u32, PixelFormat)>,
    /// Most recently promoted device, kept after failure so cycling
    /// continues from it
    last_device: Option<String>,
    /// Last frame handed to the consumer was the terminal black frame
    terminal_sent: bool,

    next_channel: u64,
    frames_delivered: u64,
    frames_suppressed: u64,
    composite_failures: u64,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut intake: mpsc::UnboundedReceiver<ChannelEvent>,
        mut init_rx: mpsc::UnboundedReceiver<InitMessage>,
    ) {
        loop {
            let keepalive_at = self.keepalive_at;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Switch(request)) => {
                        debug!(target = %request.target, "Switch requested");
                        self.queue.push_back(request);
                        self.start_next_session();
                    }
                    Some(Command::RefreshDevices(reply)) => self.refresh_devices(reply),
                    Some(Command::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(Command::Teardown(reply)) => {
                        self.teardown().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = intake.recv() => self.on_channel_event(event),
                Some(message) = init_rx.recv() => self.on_init_message(message),
                _ = tokio::time::sleep_until(keepalive_at.unwrap_or_else(Instant::now)),
                    if keepalive_at.is_some() => self.emit_keepalive(),
            }
        }
        info!("Switchover pipeline stopped");
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::FrameReady(id) => {
                if let Some(active) = self.active.as_ref().filter(|c| c.id() == id) {
                    if let Some(frame) = active.take_frame() {
                        self.deliver(frame);
                    }
                } else if self.incoming_id() == Some(id) {
                    // Held in the incoming slot until promotion
                } else {
                    self.backend.stale_frames().fetch_add(1, Ordering::Relaxed);
                    debug!(channel = %id, "Dropped frame from inactive channel");
                }
            }
            ChannelEvent::Failed { channel, reason } => {
                if self.active.as_ref().is_some_and(|c| c.id() == channel) {
                    self.on_active_failed(reason);
                } else if self.incoming_id() == Some(channel) {
                    // Surfaces when the session tries to promote it
                    debug!(channel = %channel, %reason, "Incoming channel failed");
                } else {
                    debug!(channel = %channel, %reason, "Ignoring failure of retired channel");
                }
            }
        }
    }

    fn on_init_message(&mut self, message: InitMessage) {
        match message {
            InitMessage::Opened { session, device } => {
                if let Some(in_flight) = self.in_flight.as_mut().filter(|f| f.session.id == session) {
                    in_flight.session.device = Some(device);
                    in_flight.session.phase = SwitchPhase::Initializing;
                    self.emit_phase(session, SwitchPhase::Initializing);
                }
            }
            InitMessage::Finished { session, result } => {
                let Some(in_flight) = self.in_flight.take_if(|f| f.session.id == session) else {
                    // Session was cancelled by teardown while initializing
                    if let Ok(Initialized::Opened(channel)) = result {
                        debug!(channel = %channel.id(), "Releasing channel of cancelled session");
                        retire(channel);
                    }
                    return;
                };
                match result {
                    Ok(Initialized::Opened(channel)) => self.promote(in_flight, channel),
                    Ok(Initialized::AlreadyActive) => self.keep_active(in_flight),
                    Err(e) => self.abort(in_flight, e),
                }
            }
        }
    }

    fn start_next_session(&mut self) {
        while self.in_flight.is_none() {
            let Some(request) = self.queue.pop_front() else {
                return;
            };

            if let Some(outcome) = self.already_active(&request.target) {
                debug!(device = %outcome.device.id, "Requested device already active");
                self.emit_phase(outcome.session, SwitchPhase::Complete);
                request.respond(Ok(outcome));
                continue;
            }

            let incoming = ChannelId(self.next_channel);
            self.next_channel += 1;
            let session = SwitchoverSession::new(
                request.target.clone(),
                incoming,
                self.active.as_ref().map(CaptureChannel::id),
            );
            info!(session = %session.id, target = %session.target, channel = %incoming, "Switchover started");
            self.emit_phase(session.id, SwitchPhase::Validating);

            if self.fade_out_on_switch && self.active.is_some() && !self.camera_off {
                self.compositing.begin_fade_out();
            }

            tokio::spawn(initialize(
                self.backend.clone(),
                self.init_tx.clone(),
                session.id,
                incoming,
                request.target.clone(),
                self.last_device.clone(),
                self.active.as_ref().map(|c| c.device().id.clone()),
            ));
            self.in_flight = Some(InFlight { session, request });
        }
    }

    /// Outcome for a request naming the device that is already streaming
    fn already_active(&self, target: &SwitchTarget) -> Option<SwitchOutcome> {
        let SwitchTarget::Device(Some(device_id)) = target else {
            return None;
        };
        self.active_outcome(Uuid::new_v4())
            .filter(|outcome| outcome.device.id == *device_id)
    }

    /// Outcome describing the active channel, if it is streaming
    fn active_outcome(&self, session: Uuid) -> Option<SwitchOutcome> {
        let active = self.active.as_ref()?;
        (!self.camera_off && active.state() == ChannelState::Streaming).then(|| SwitchOutcome {
            session,
            device: active.device().clone(),
            channel: active.id(),
            format: active.format(),
            elapsed: Duration::ZERO,
        })
    }

    /// Complete a session whose target is the channel already streaming
    fn keep_active(&mut self, in_flight: InFlight) {
        let InFlight {
            mut session,
            request,
        } = in_flight;
        let Some(outcome) = self.active_outcome(session.id) else {
            self.abort(
                InFlight { session, request },
                SwitchError::DeviceFailed("active camera stopped during the switch".into()),
            );
            return;
        };

        self.reverse_fade_out();
        session.phase = SwitchPhase::Complete;
        self.emit_phase(session.id, SwitchPhase::Complete);
        debug!(session = %session.id, device = %outcome.device.id, "Default device already active");
        request.respond(Ok(outcome));
        self.start_next_session();
    }

    fn promote(&mut self, in_flight: InFlight, channel: CaptureChannel) {
        let InFlight {
            mut session,
            request,
        } = in_flight;

        if channel.state() != ChannelState::Streaming {
            let reason = format!("{} stopped before promotion ({})", channel.device().id, channel.state());
            retire(channel);
            self.abort(
                InFlight { session, request },
                SwitchError::DeviceFailed(reason),
            );
            return;
        }

        session.phase = SwitchPhase::Promoting;
        self.emit_phase(session.id, SwitchPhase::Promoting);

        let device = channel.device().clone();
        let format = channel.format();
        let incoming = channel.id();
        let outgoing = self.active.replace(channel);
        if let Some(outgoing) = &outgoing {
            outgoing.detach();
        }

        self.compositing.begin_fade_in();
        self.last_device = Some(device.id.clone());
        self.camera_off = false;
        self.keepalive_at = None;

        session.phase = SwitchPhase::Retiring;
        self.emit_phase(session.id, SwitchPhase::Retiring);
        if let Some(outgoing) = outgoing {
            info!(channel = %outgoing.id(), device = %outgoing.device().id, "Retiring outgoing channel");
            retire(outgoing);
        }

        session.phase = SwitchPhase::Complete;
        self.emit_phase(session.id, SwitchPhase::Complete);
        self.emit(PipelineEvent::CameraStateChanged {
            camera_on: true,
            device_id: Some(device.id.clone()),
        });

        let elapsed = session.elapsed();
        info!(
            session = %session.id,
            device = %device.id,
            channel = %incoming,
            elapsed_ms = elapsed.as_millis() as u64,
            "Switchover complete"
        );
        request.respond(Ok(SwitchOutcome {
            session: session.id,
            device,
            channel: incoming,
            format,
            elapsed,
        }));

        // Frame captured while the channel was still starting
        if let Some(frame) = self.active.as_ref().and_then(CaptureChannel::take_frame) {
            self.deliver(frame);
        }

        self.start_next_session();
    }

    /// End a session without touching the active channel
    fn abort(&mut self, in_flight: InFlight, error: SwitchError) {
        let InFlight {
            mut session,
            request,
        } = in_flight;
        session.phase = SwitchPhase::Aborted;
        self.emit_phase(session.id, SwitchPhase::Aborted);
        warn!(session = %session.id, target = %session.target, error = %error, "Switchover aborted");
        request.respond(Err(error));

        self.reverse_fade_out();
        self.start_next_session();
    }

    /// Fade back in from wherever a fade-out got to
    fn reverse_fade_out(&mut self) {
        if self.compositing.mode() == CompositingMode::FadeOut {
            let alpha = self.compositing.alpha();
            self.compositing.begin_fade_in_from(alpha);
        }
    }

    fn on_active_failed(&mut self, reason: String) {
        let Some(channel) = self.active.take() else {
            return;
        };
        let device_id = channel.device().id.clone();
        error!(channel = %channel.id(), device = %device_id, %reason, "Active camera failed, blacking out");

        self.compositing.blackout();
        self.camera_off = true;
        self.keepalive_at = self.keepalive.map(|period| Instant::now() + period);
        retire(channel);

        self.emit(PipelineEvent::CameraFailed {
            device_id: device_id.clone(),
            reason,
        });
        self.emit(PipelineEvent::CameraStateChanged {
            camera_on: false,
            device_id: Some(device_id),
        });

        let black = self.black_frame();
        self.deliver(black);
    }

    fn emit_keepalive(&mut self) {
        self.keepalive_at = match (self.camera_off, self.keepalive) {
            (true, Some(period)) => Some(Instant::now() + period),
            _ => None,
        };
        if self.camera_off {
            let black = self.black_frame();
            self.deliver(black);
        }
    }

    /// Composite and hand one frame to the consumer
    fn deliver(&mut self, frame: FrameEnvelope) {
        let sequence = frame.sequence;
        match self.compositor.apply(frame, &mut self.compositing) {
            Ok(Some(frame)) => {
                self.last_geometry = Some((frame.width(), frame.height(), frame.format()));
                self.frames_delivered += 1;
                self.terminal_sent = false;
                if self.frames_delivered % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        delivered = self.frames_delivered,
                        mode = %self.compositing.mode(),
                        "Frames delivered"
                    );
                }
                self.consumer.consume(frame);
            }
            Ok(None) => self.frames_suppressed += 1,
            Err(e) => {
                self.composite_failures += 1;
                warn!(sequence, error = %e, "Dropping frame that failed compositing");
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(InFlight {
            mut session,
            request,
        }) = self.in_flight.take()
        {
            session.phase = SwitchPhase::Aborted;
            self.emit_phase(session.id, SwitchPhase::Aborted);
            request.respond(Err(SwitchError::Cancelled));
        }
        for request in self.queue.drain(..) {
            request.respond(Err(SwitchError::Cancelled));
        }

        let stopped_device = self.active.as_ref().map(|c| c.device().id.clone());
        if let Some(channel) = self.active.take() {
            channel.detach();
            if let Err(e) = tokio::task::spawn_blocking(move || channel.dispose()).await {
                warn!(error = %e, "Channel release task failed");
            }
        }

        if !self.terminal_sent {
            // Bypasses the compositor so a finished fade-out can't swallow it
            let black = self.black_frame();
            self.frames_delivered += 1;
            self.terminal_sent = true;
            self.consumer.consume(black);
        }

        self.compositing.reset();
        self.camera_off = false;
        self.keepalive_at = None;

        info!(device = ?stopped_device, "Pipeline torn down");
        self.emit(PipelineEvent::CameraStateChanged {
            camera_on: false,
            device_id: None,
        });
    }

    fn refresh_devices(&self, reply: oneshot::Sender<Vec<CaptureDevice>>) {
        let backend = self.backend.clone();
        let events = self.events.clone();
        let settle = self.settle;
        tokio::spawn(async move {
            // Freshly plugged devices take a moment to become enumerable
            tokio::time::sleep(settle).await;
            let devices = backend.enumerate().await;
            debug!(count = devices.len(), "Devices re-enumerated");
            let _ = events.send(PipelineEvent::DevicesChanged(devices.clone()));
            let _ = reply.send(devices);
        });
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            switch_phase: self.in_flight.as_ref().map(|f| f.session.phase),
            session: self.in_flight.as_ref().map(|f| f.session.id),
            active_device: self.active.as_ref().map(|c| c.device().clone()),
            active_channel: self.active.as_ref().map(CaptureChannel::id),
            channel_state: self.active.as_ref().map(CaptureChannel::state),
            mode: self.compositing.mode(),
            alpha: self.compositing.alpha(),
            camera_off: self.camera_off,
            capture: self.active.as_ref().map(CaptureChannel::format),
            queued: self.queue.len(),
            frames_delivered: self.frames_delivered,
            frames_suppressed: self.frames_suppressed,
            stale_frames_dropped: self.backend.stale_frames().load(Ordering::Relaxed),
            composite_failures: self.composite_failures,
        }
    }

    fn incoming_id(&self) -> Option<ChannelId> {
        self.in_flight.as_ref().map(|f| f.session.incoming)
    }

    /// Black frame in the geometry the consumer last saw
    fn black_frame(&self) -> FrameEnvelope {
        let (width, height, format) = self.last_geometry.unwrap_or((
            self.default_capture.width,
            self.default_capture.height,
            self.default_capture.pixel_format,
        ));
        black_frame(width, height, format)
    }

    fn emit_phase(&self, session: Uuid, phase: SwitchPhase) {
        self.emit(PipelineEvent::SwitchPhase { session, phase });
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Resolve, open and start the incoming channel of one session
async fn initialize(
    backend: ChannelBackend,
    init_tx: mpsc::UnboundedSender<InitMessage>,
    session: Uuid,
    id: ChannelId,
    target: SwitchTarget,
    current_device: Option<String>,
    active_device: Option<String>,
) {
    let result = open_and_start(
        &backend,
        &init_tx,
        session,
        id,
        target,
        current_device,
        active_device,
    )
    .await;
    if let Err(mpsc::error::SendError(InitMessage::Finished {
        result: Ok(Initialized::Opened(channel)),
        ..
    })) = init_tx.send(InitMessage::Finished { session, result })
    {
        // Coordinator is gone
        retire(channel);
    }
}

async fn open_and_start(
    backend: &ChannelBackend,
    init_tx: &mpsc::UnboundedSender<InitMessage>,
    session: Uuid,
    id: ChannelId,
    target: SwitchTarget,
    current_device: Option<String>,
    active_device: Option<String>,
) -> Result<Initialized, SwitchError> {
    let device_id = match target {
        SwitchTarget::Device(Some(device_id)) => Some(device_id),
        SwitchTarget::Device(None) => {
            let Some(active) = active_device.as_deref() else {
                return open_channel(backend, init_tx, session, id, None).await;
            };
            let devices = backend.enumerate().await;
            match resolve_device(&devices, None) {
                Some(default) if default.id == active => return Ok(Initialized::AlreadyActive),
                Some(default) => Some(default.id),
                None => None,
            }
        }
        SwitchTarget::Next => {
            let devices = backend.enumerate().await;
            if devices.is_empty() {
                return Err(ChannelError::DeviceNotFound("no capture devices available".into()).into());
            }
            // With nothing streaming, a lone device may be reopened
            let next = next_device(&devices, current_device.as_deref())
                .or_else(|| {
                    active_device
                        .is_none()
                        .then(|| resolve_device(&devices, current_device.as_deref()))
                        .flatten()
                })
                .ok_or(SwitchError::NoOtherDevice)?;
            Some(next.id)
        }
    };

    open_channel(backend, init_tx, session, id, device_id.as_deref()).await
}

async fn open_channel(
    backend: &ChannelBackend,
    init_tx: &mpsc::UnboundedSender<InitMessage>,
    session: Uuid,
    id: ChannelId,
    device_id: Option<&str>,
) -> Result<Initialized, SwitchError> {
    let mut channel = CaptureChannel::open(id, backend, device_id).await?;
    let _ = init_tx.send(InitMessage::Opened {
        session,
        device: channel.device().clone(),
    });
    channel.start().await?;
    Ok(Initialized::Opened(channel))
}

/// Stop and dispose a channel on the blocking pool
fn retire(channel: CaptureChannel) {
    channel.detach();
    tokio::task::spawn_blocking(move || channel.dispose());
}
