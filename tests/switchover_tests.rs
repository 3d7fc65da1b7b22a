// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the switchover pipeline
//!
//! Cameras run in manual mode so every frame is emitted explicitly and
//! arrival order is deterministic.

use camera_handoff::backends::camera::PixelFormat;
use camera_handoff::backends::camera::synthetic::{SyntheticBackend, SyntheticCamera, solid_frame};
use camera_handoff::pipelines::switchover::{
    ChannelConsumer, ChannelId, CompositingMode, FrameEnvelope, FrameOrigin, Pipeline,
    PipelineEvent, SwitchPhase, SwitchTarget,
};
use camera_handoff::{Config, SwitchError};
use futures::StreamExt;
use futures::channel::mpsc::UnboundedReceiver;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    backend: SyntheticBackend,
    pipeline: Pipeline,
    frames: UnboundedReceiver<FrameEnvelope>,
}

impl Harness {
    fn new(backend: SyntheticBackend, config: Config) -> Self {
        let (consumer, frames) = ChannelConsumer::new();
        let pipeline = Pipeline::spawn(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(consumer),
            &config,
        );
        Self {
            backend,
            pipeline,
            frames,
        }
    }

    async fn next_frame(&mut self) -> FrameEnvelope {
        timeout(TIMEOUT, self.frames.next())
            .await
            .expect("frame within timeout")
            .expect("frame stream open")
    }

    /// Emit one frame on `device` and wait for what the consumer receives
    async fn emit(&mut self, device: &str) -> FrameEnvelope {
        assert_eq!(self.backend.emit_frame(device), 1, "{} not streaming", device);
        self.next_frame().await
    }

    /// Run the fade-in after a switch down to Normal
    async fn finish_fade(&mut self, device: &str) {
        for _ in 0..5 {
            let frame = self.emit(device).await;
            assert_eq!(stamp(&frame).0, CompositingMode::FadeIn);
        }
    }

    fn assert_no_pending_frame(&mut self) {
        assert!(
            self.frames.try_next().is_err(),
            "unexpected frame delivered"
        );
    }
}

fn test_config() -> Config {
    Config {
        enumeration_settle_ms: 10,
        ..Default::default()
    }
}

fn cameras() -> SyntheticBackend {
    SyntheticBackend::new()
        .with_camera(
            SyntheticCamera::new("cam-1", "Front")
                .default_device()
                .with_color([200, 30, 30]),
        )
        .with_camera(SyntheticCamera::new("cam-2", "Rear").with_color([30, 200, 30]))
        .with_camera(SyntheticCamera::new("cam-3", "Capture Card").with_color([30, 30, 200]))
}

fn stamp(frame: &FrameEnvelope) -> (CompositingMode, u8) {
    let overlay = frame.overlay.expect("delivered frames carry an overlay stamp");
    (overlay.mode, overlay.alpha)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition within timeout");
}

#[tokio::test]
async fn test_switch_cam1_to_cam2_fades_in() {
    let mut h = Harness::new(cameras(), test_config());

    let first = h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    assert_eq!(first.device.id, "cam-1");
    h.finish_fade("cam-1").await;

    // cam-1 streams Normal frames
    for _ in 1..=5 {
        let frame = h.emit("cam-1").await;
        assert_eq!(frame.channel(), Some(first.channel));
        assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
    }

    let second = h.pipeline.switch_to(Some("cam-2")).await.unwrap();
    assert_eq!(second.device.id, "cam-2");
    assert_ne!(second.channel, first.channel);

    let mut alphas = Vec::new();
    for _ in 0..5 {
        // Late cam-1 frames never reach the consumer
        h.backend.emit_frame("cam-1");
        let frame = h.emit("cam-2").await;
        assert_eq!(frame.channel(), Some(second.channel));
        assert_eq!(stamp(&frame).0, CompositingMode::FadeIn);
        alphas.push(stamp(&frame).1);
    }
    assert_eq!(alphas, vec![255, 185, 115, 45, 0]);

    for _ in 0..3 {
        h.backend.emit_frame("cam-1");
        let frame = h.emit("cam-2").await;
        assert_eq!(frame.channel(), Some(second.channel));
        assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
    }

    let status = h.pipeline.status().await.unwrap();
    assert_eq!(status.active_channel, Some(second.channel));
    assert_eq!(status.mode, CompositingMode::Normal);
    assert!(!status.camera_off);
}

#[tokio::test]
async fn test_incoming_frames_held_until_promotion() {
    let mut h = Harness::new(cameras(), test_config());
    let first = h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.finish_fade("cam-1").await;

    let gate = h.backend.hold_start("cam-2");
    let reply = h
        .pipeline
        .request_switch(SwitchTarget::Device(Some("cam-2".into())));
    let backend = h.backend.clone();
    wait_until(|| backend.is_live("cam-2")).await;

    // cam-2 produces while still starting; only cam-1 reaches the consumer
    assert_eq!(h.backend.emit_frame("cam-2"), 1);
    let frame = h.emit("cam-1").await;
    assert_eq!(frame.channel(), Some(first.channel));
    assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));

    let status = h.pipeline.status().await.unwrap();
    assert_eq!(status.active_channel, Some(first.channel));
    assert!(matches!(
        status.switch_phase,
        Some(SwitchPhase::Validating | SwitchPhase::Initializing)
    ));

    gate.release();
    let outcome = timeout(TIMEOUT, reply).await.unwrap().unwrap().unwrap();

    // The frame captured during start is the first one delivered
    let buffered = h.next_frame().await;
    assert_eq!(buffered.channel(), Some(outcome.channel));
    assert_eq!(buffered.sequence, 1);
    assert_eq!(stamp(&buffered), (CompositingMode::FadeIn, 255));

    let frame = h.emit("cam-2").await;
    assert_eq!(frame.sequence, 2);
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 185));
}

#[tokio::test]
async fn test_permission_denied_switch_is_non_destructive() {
    let mut h = Harness::new(cameras(), test_config());
    let first = h.pipeline.switch_to(None).await.unwrap();
    assert_eq!(first.device.id, "cam-1");
    h.finish_fade("cam-1").await;

    h.backend.set_permission_denied("cam-2", true);
    let result = h.pipeline.switch_to(Some("cam-2")).await;
    assert!(matches!(result, Err(SwitchError::PermissionDenied(_))));

    for _ in 0..3 {
        let frame = h.emit("cam-1").await;
        assert_eq!(frame.channel(), Some(first.channel));
        assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
    }

    let status = h.pipeline.status().await.unwrap();
    assert_eq!(status.active_channel, Some(first.channel));
    assert_eq!(status.mode, CompositingMode::Normal);
    assert!(!status.camera_off);
    assert!(status.switch_phase.is_none());
}

#[tokio::test]
async fn test_unknown_device_aborts() {
    let mut h = Harness::new(cameras(), test_config());
    let first = h.pipeline.switch_to(Some("cam-1")).await.unwrap();

    let result = h.pipeline.switch_to(Some("cam-9")).await;
    assert_eq!(result.unwrap_err(), SwitchError::DeviceNotFound("cam-9".into()));

    // Still fading in on cam-1, untouched by the failed switch
    let frame = h.emit("cam-1").await;
    assert_eq!(frame.channel(), Some(first.channel));
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 255));

    let empty = Harness::new(SyntheticBackend::new(), test_config());
    assert!(matches!(
        empty.pipeline.switch_to(None).await,
        Err(SwitchError::DeviceNotFound(_))
    ));
    assert!(matches!(
        empty.pipeline.cycle().await,
        Err(SwitchError::DeviceNotFound(_))
    ));
}

#[tokio::test]
async fn test_start_failure_is_non_destructive() {
    let backend = cameras().with_camera(SyntheticCamera::new("broken", "Broken").fail_on_start());
    let mut h = Harness::new(backend, test_config());
    let first = h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.finish_fade("cam-1").await;

    let result = h.pipeline.switch_to(Some("broken")).await;
    assert!(matches!(result, Err(SwitchError::InitializationFailed(_))));
    assert!(!h.backend.is_live("broken"));

    let frame = h.emit("cam-1").await;
    assert_eq!(frame.channel(), Some(first.channel));
    assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
}

#[tokio::test]
async fn test_incoming_failure_during_start_aborts() {
    let mut h = Harness::new(cameras(), test_config());
    let first = h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.finish_fade("cam-1").await;

    let gate = h.backend.hold_start("cam-2");
    let reply = h
        .pipeline
        .request_switch(SwitchTarget::Device(Some("cam-2".into())));
    let backend = h.backend.clone();
    wait_until(|| backend.is_live("cam-2")).await;

    h.backend.fail_device("cam-2", "unplugged during start");
    gate.release();

    let result = timeout(TIMEOUT, reply).await.unwrap().unwrap();
    assert!(matches!(result, Err(SwitchError::InitializationFailed(_))));

    let frame = h.emit("cam-1").await;
    assert_eq!(frame.channel(), Some(first.channel));
    assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
    assert!(!h.pipeline.status().await.unwrap().camera_off);
}

#[tokio::test]
async fn test_device_failure_blacks_out_until_next_switch() {
    let mut h = Harness::new(cameras(), test_config());
    let mut events = h.pipeline.subscribe();
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.finish_fade("cam-1").await;

    h.backend.fail_device("cam-1", "usb reset");

    let black = h.next_frame().await;
    assert_eq!(black.origin, FrameOrigin::Synthesized);
    assert_eq!(stamp(&black), (CompositingMode::Blackout, 255));
    assert!(black.is_black());
    assert_eq!((black.width(), black.height()), (4, 4));

    let failed = timeout(TIMEOUT, async {
        loop {
            if let PipelineEvent::CameraFailed { device_id, reason } = events.recv().await.unwrap() {
                return (device_id, reason);
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(failed, ("cam-1".to_string(), "usb reset".to_string()));

    let status = h.pipeline.status().await.unwrap();
    assert!(status.camera_off);
    assert_eq!(status.mode, CompositingMode::Blackout);
    assert!(status.active_channel.is_none());
    assert_eq!(h.backend.emit_frame("cam-1"), 0);

    // A failed switch doesn't lift the blackout
    h.backend.set_permission_denied("cam-2", true);
    assert!(h.pipeline.switch_to(Some("cam-2")).await.is_err());
    let status = h.pipeline.status().await.unwrap();
    assert_eq!(status.mode, CompositingMode::Blackout);
    assert!(status.camera_off);
    h.assert_no_pending_frame();

    h.backend.set_permission_denied("cam-2", false);
    let outcome = h.pipeline.switch_to(Some("cam-2")).await.unwrap();
    let frame = h.emit("cam-2").await;
    assert_eq!(frame.channel(), Some(outcome.channel));
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 255));
    assert!(!h.pipeline.status().await.unwrap().camera_off);
}

#[tokio::test]
async fn test_blackout_keepalive() {
    let config = Config {
        blackout_keepalive_ms: Some(20),
        ..test_config()
    };
    let mut h = Harness::new(cameras(), config);
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.emit("cam-1").await;

    h.backend.fail_device("cam-1", "crashed");
    for _ in 0..3 {
        let frame = h.next_frame().await;
        assert_eq!(frame.origin, FrameOrigin::Synthesized);
        assert_eq!(stamp(&frame), (CompositingMode::Blackout, 255));
    }

    let outcome = h.pipeline.cycle().await.unwrap();
    assert_eq!(outcome.device.id, "cam-2");
    assert_eq!(h.backend.emit_frame("cam-2"), 1);

    // Keepalive frames queued before promotion come first
    let frame = loop {
        let frame = h.next_frame().await;
        if frame.origin == FrameOrigin::Synthesized {
            assert_eq!(stamp(&frame), (CompositingMode::Blackout, 255));
            continue;
        }
        break frame;
    };
    assert_eq!(frame.channel(), Some(outcome.channel));
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 255));

    // No more keepalives once the camera is back
    tokio::time::sleep(Duration::from_millis(60)).await;
    h.assert_no_pending_frame();
}

#[tokio::test]
async fn test_teardown_delivers_one_black_frame_mid_fade() {
    let mut h = Harness::new(cameras(), test_config());
    let mut events = h.pipeline.subscribe();
    h.pipeline.switch_to(Some("cam-3")).await.unwrap();
    h.emit("cam-3").await;
    h.emit("cam-3").await;

    h.pipeline.teardown().await.unwrap();
    let terminal = h.next_frame().await;
    assert!(terminal.is_black());
    assert_eq!(terminal.origin, FrameOrigin::Synthesized);
    assert_eq!(stamp(&terminal), (CompositingMode::Blackout, 255));
    h.assert_no_pending_frame();

    // Nothing left streaming and a second teardown adds nothing
    let backend = h.backend.clone();
    wait_until(|| !backend.is_live("cam-3")).await;
    h.pipeline.teardown().await.unwrap();
    h.assert_no_pending_frame();

    let status = h.pipeline.status().await.unwrap();
    assert!(status.active_channel.is_none());
    assert_eq!(status.mode, CompositingMode::Normal);

    let mut saw_off = false;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::CameraStateChanged {
            camera_on: false, ..
        } = event
        {
            saw_off = true;
        }
    }
    assert!(saw_off);
}

#[tokio::test]
async fn test_teardown_without_capture_uses_default_geometry() {
    let mut h = Harness::new(cameras(), test_config());
    h.pipeline.teardown().await.unwrap();

    let terminal = h.next_frame().await;
    assert_eq!((terminal.width(), terminal.height()), (640, 480));
    assert_eq!(terminal.format(), PixelFormat::BGRA);
    assert!(terminal.is_black());
    h.assert_no_pending_frame();
}

#[tokio::test]
async fn test_pipeline_restarts_after_teardown() {
    let mut h = Harness::new(cameras(), test_config());
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.emit("cam-1").await;
    h.pipeline.teardown().await.unwrap();
    assert!(h.next_frame().await.is_black());

    let outcome = h.pipeline.switch_to(Some("cam-2")).await.unwrap();
    let frame = h.emit("cam-2").await;
    assert_eq!(frame.channel(), Some(outcome.channel));
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 255));

    h.pipeline.teardown().await.unwrap();
    assert!(h.next_frame().await.is_black());
}

#[tokio::test]
async fn test_teardown_cancels_in_flight_and_queued() {
    let mut h = Harness::new(cameras(), test_config());
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();

    let gate = h.backend.hold_start("cam-2");
    let in_flight = h
        .pipeline
        .request_switch(SwitchTarget::Device(Some("cam-2".into())));
    let queued = h.pipeline.request_switch(SwitchTarget::Next);
    let backend = h.backend.clone();
    wait_until(|| backend.is_live("cam-2")).await;

    h.pipeline.teardown().await.unwrap();
    assert_eq!(
        timeout(TIMEOUT, in_flight).await.unwrap().unwrap().unwrap_err(),
        SwitchError::Cancelled
    );
    assert_eq!(
        timeout(TIMEOUT, queued).await.unwrap().unwrap().unwrap_err(),
        SwitchError::Cancelled
    );
    assert!(h.next_frame().await.is_black());

    // The cancelled channel is released once its start returns
    gate.release();
    let backend = h.backend.clone();
    wait_until(|| !backend.is_live("cam-2")).await;
    assert_eq!(h.backend.emit_frame("cam-2"), 0);
    h.assert_no_pending_frame();
}

#[tokio::test]
async fn test_requests_are_queued_in_order() {
    let h = Harness::new(cameras(), test_config());
    let mut events = h.pipeline.subscribe();
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();

    let gate = h.backend.hold_start("cam-2");
    let first = h
        .pipeline
        .request_switch(SwitchTarget::Device(Some("cam-2".into())));
    let second = h
        .pipeline
        .request_switch(SwitchTarget::Device(Some("cam-3".into())));

    let status = h.pipeline.status().await.unwrap();
    assert_eq!(status.queued, 1);
    assert!(status.switch_phase.is_some());

    gate.release();
    let first = timeout(TIMEOUT, first).await.unwrap().unwrap().unwrap();
    let second = timeout(TIMEOUT, second).await.unwrap().unwrap().unwrap();
    assert_eq!(first.device.id, "cam-2");
    assert_eq!(second.device.id, "cam-3");
    assert!(first.channel < second.channel);

    let status = h.pipeline.status().await.unwrap();
    assert_eq!(status.active_device.map(|d| d.id), Some("cam-3".to_string()));
    assert_eq!(status.queued, 0);

    // Sessions never overlap: each one ends before the next begins
    let mut phases = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::SwitchPhase { session, phase } = event {
            phases.push((session, phase));
        }
    }
    let first_done = phases
        .iter()
        .position(|(s, p)| *s == first.session && *p == SwitchPhase::Complete)
        .unwrap();
    let second_start = phases
        .iter()
        .position(|(s, p)| *s == second.session && *p == SwitchPhase::Validating)
        .unwrap();
    assert!(first_done < second_start);
}

#[tokio::test]
async fn test_cycle_wraps_around() {
    let h = Harness::new(cameras(), test_config());
    let start = h.pipeline.switch_to(None).await.unwrap();
    assert_eq!(start.device.id, "cam-1");

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(h.pipeline.cycle().await.unwrap().device.id);
    }
    assert_eq!(order, vec!["cam-2", "cam-3", "cam-1"]);
}

#[tokio::test]
async fn test_cycle_with_single_device() {
    let backend =
        SyntheticBackend::new().with_camera(SyntheticCamera::new("only", "Only").default_device());
    let h = Harness::new(backend, test_config());

    // Nothing streaming yet: cycling opens the device
    assert_eq!(h.pipeline.cycle().await.unwrap().device.id, "only");
    assert_eq!(
        h.pipeline.cycle().await.unwrap_err(),
        SwitchError::NoOtherDevice
    );
}

#[tokio::test]
async fn test_switch_to_active_device_is_a_no_op() {
    let mut h = Harness::new(cameras(), test_config());
    let first = h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.finish_fade("cam-1").await;

    let again = h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    assert_eq!(again.channel, first.channel);

    let frame = h.emit("cam-1").await;
    assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
}

#[tokio::test]
async fn test_switch_to_default_when_default_active_is_a_no_op() {
    let mut h = Harness::new(cameras(), test_config());
    let mut events = h.pipeline.subscribe();
    let first = h.pipeline.switch_to(None).await.unwrap();
    assert_eq!(first.device.id, "cam-1");
    h.finish_fade("cam-1").await;

    let again = h.pipeline.switch_to(None).await.unwrap();
    assert_eq!(again.device.id, "cam-1");
    assert_eq!(again.channel, first.channel);
    assert_eq!(h.backend.callbacks("cam-1").len(), 1, "device opened twice");

    // No fade restart
    let frame = h.emit("cam-1").await;
    assert_eq!(frame.channel(), Some(first.channel));
    assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));

    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::SwitchPhase { session, phase } = event {
            assert_ne!(
                (session, phase),
                (again.session, SwitchPhase::Promoting),
                "no-op session promoted a channel"
            );
            completed |= session == again.session && phase == SwitchPhase::Complete;
        }
    }
    assert!(completed);

    // From another device the default request is a real switch
    h.pipeline.switch_to(Some("cam-2")).await.unwrap();
    let back = h.pipeline.switch_to(None).await.unwrap();
    assert_eq!(back.device.id, "cam-1");
    assert!(back.channel > again.channel);
    let frame = h.emit("cam-1").await;
    assert_eq!(frame.channel(), Some(back.channel));
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 255));
}

#[tokio::test]
async fn test_default_request_reverses_fade_out_when_already_active() {
    let config = Config {
        fade_out_on_switch: true,
        ..test_config()
    };
    let mut h = Harness::new(cameras(), config);
    let first = h.pipeline.switch_to(None).await.unwrap();
    h.finish_fade("cam-1").await;

    let again = h.pipeline.switch_to(None).await.unwrap();
    assert_eq!(again.channel, first.channel);

    let frame = h.emit("cam-1").await;
    assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
    assert_eq!(h.pipeline.status().await.unwrap().frames_suppressed, 0);
}

#[tokio::test]
async fn test_late_callback_from_retired_channel_is_dropped() {
    let mut h = Harness::new(cameras(), test_config());
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    let late = h.backend.callbacks("cam-1").pop().unwrap();

    let outcome = h.pipeline.switch_to(Some("cam-2")).await.unwrap();
    late.on_frame(solid_frame(PixelFormat::BGRA, 4, 4, [255, 255, 255]));

    let frame = h.emit("cam-2").await;
    assert_eq!(frame.channel(), Some(outcome.channel));
    assert!(h.pipeline.status().await.unwrap().stale_frames_dropped >= 1);
}

#[tokio::test]
async fn test_fade_out_drains_outgoing_camera() {
    let config = Config {
        fade_out_on_switch: true,
        ..test_config()
    };
    let mut h = Harness::new(cameras(), config);
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.finish_fade("cam-1").await;

    let gate = h.backend.hold_start("cam-2");
    let reply = h
        .pipeline
        .request_switch(SwitchTarget::Device(Some("cam-2".into())));
    let backend = h.backend.clone();
    wait_until(|| backend.is_live("cam-2")).await;

    let mut alphas = Vec::new();
    for _ in 0..5 {
        let frame = h.emit("cam-1").await;
        assert_eq!(stamp(&frame).0, CompositingMode::FadeOut);
        alphas.push(stamp(&frame).1);
    }
    assert_eq!(alphas, vec![0, 70, 140, 210, 255]);

    // Fully faded: further outgoing frames are suppressed
    h.backend.emit_frame("cam-1");
    h.backend.emit_frame("cam-1");
    let mut suppressed = 0;
    for _ in 0..100 {
        suppressed = h.pipeline.status().await.unwrap().frames_suppressed;
        if suppressed == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(suppressed, 2);
    h.assert_no_pending_frame();

    gate.release();
    let outcome = timeout(TIMEOUT, reply).await.unwrap().unwrap().unwrap();
    let frame = h.emit("cam-2").await;
    assert_eq!(frame.channel(), Some(outcome.channel));
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 255));
}

#[tokio::test]
async fn test_failed_switch_reverses_fade_out() {
    let config = Config {
        fade_out_on_switch: true,
        ..test_config()
    };
    let mut h = Harness::new(cameras(), config);
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.finish_fade("cam-1").await;

    h.backend.set_permission_denied("cam-2", true);
    let result = h.pipeline.switch_to(Some("cam-2")).await;
    assert!(matches!(result, Err(SwitchError::PermissionDenied(_))));

    // No frame was faded yet, so the stream is back to Normal at once
    let frame = h.emit("cam-1").await;
    assert_eq!(stamp(&frame), (CompositingMode::Normal, 0));
}

#[tokio::test]
async fn test_malformed_frame_is_dropped() {
    let mut h = Harness::new(cameras(), test_config());
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    let callback = h.backend.callbacks("cam-1").pop().unwrap();

    let mut torn = solid_frame(PixelFormat::BGRA, 4, 4, [1, 2, 3]);
    torn.data.truncate(7);
    callback.on_frame(torn);

    let frame = h.emit("cam-1").await;
    assert!(frame.frame.is_well_formed());
    // The dropped frame did not advance the fade
    assert_eq!(stamp(&frame), (CompositingMode::FadeIn, 255));
    assert_eq!(h.pipeline.status().await.unwrap().composite_failures, 1);
}

#[tokio::test]
async fn test_refresh_devices_reports_hot_plug() {
    let h = Harness::new(cameras(), test_config());
    let mut events = h.pipeline.subscribe();

    h.backend
        .add_camera(SyntheticCamera::new("cam-4", "Document Camera"));
    let devices = h.pipeline.refresh_devices().await.unwrap();
    assert_eq!(devices.len(), 4);

    let event = timeout(TIMEOUT, events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, PipelineEvent::DevicesChanged(list) if list.len() == 4));
}

#[tokio::test]
async fn test_shutdown_ends_frame_stream() {
    let mut h = Harness::new(cameras(), test_config());
    h.pipeline.switch_to(Some("cam-1")).await.unwrap();
    h.emit("cam-1").await;

    let Harness {
        backend,
        pipeline,
        mut frames,
    } = h;
    pipeline.shutdown().await.unwrap();

    let terminal = timeout(TIMEOUT, frames.next()).await.unwrap().unwrap();
    assert!(terminal.is_black());
    assert!(timeout(TIMEOUT, frames.next()).await.unwrap().is_none());
    wait_until(|| !backend.is_live("cam-1")).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_authority_with_free_running_cameras() {
    let backend = SyntheticBackend::new()
        .with_camera(
            SyntheticCamera::new("cam-1", "One")
                .default_device()
                .with_formats(vec![camera_handoff::CaptureFormat::new(
                    4,
                    4,
                    500,
                    PixelFormat::BGRA,
                )])
                .auto(),
        )
        .with_camera(
            SyntheticCamera::new("cam-2", "Two")
                .with_formats(vec![camera_handoff::CaptureFormat::new(
                    4,
                    4,
                    500,
                    PixelFormat::NV12,
                )])
                .auto(),
        );
    let (consumer, mut frames) = ChannelConsumer::new();
    let pipeline = Pipeline::spawn(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(consumer),
        &test_config(),
    );

    let collector = tokio::spawn(async move {
        let mut origins = Vec::new();
        while let Some(frame) = frames.next().await {
            origins.push((frame.origin, frame.sequence));
        }
        origins
    });

    let mut promoted = Vec::new();
    promoted.push(pipeline.switch_to(None).await.unwrap().channel);
    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(15)).await;
        promoted.push(pipeline.cycle().await.unwrap().channel);
    }
    tokio::time::sleep(Duration::from_millis(15)).await;
    pipeline.shutdown().await.unwrap();

    let origins = timeout(TIMEOUT, collector).await.unwrap().unwrap();
    let channels: Vec<(ChannelId, u64)> = origins
        .iter()
        .filter_map(|(origin, sequence)| match origin {
            FrameOrigin::Channel(id) => Some((*id, *sequence)),
            FrameOrigin::Synthesized => None,
        })
        .collect();
    assert!(!channels.is_empty());

    // Once a channel's frames stop, they never come back
    let mut finished: Vec<ChannelId> = Vec::new();
    let mut current: Option<(ChannelId, u64)> = None;
    for &(id, sequence) in &channels {
        match current {
            Some((active, last)) if active == id => {
                assert!(sequence > last, "{} reordered", id);
            }
            _ => {
                assert!(!finished.contains(&id), "{} delivered after retirement", id);
                if let Some((previous, _)) = current {
                    finished.push(previous);
                }
            }
        }
        current = Some((id, sequence));
    }

    // Channels appear in promotion order
    let mut seen: Vec<ChannelId> = channels.iter().map(|(id, _)| *id).collect();
    seen.dedup();
    assert!(seen.iter().all(|id| promoted.contains(id)));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));

    // Terminal frame last
    assert_eq!(origins.last().map(|(o, _)| *o), Some(FrameOrigin::Synthesized));
}
