// SPDX-License-Identifier: GPL-3.0-only

//! Informational notifications for observers (UI, logging)
//!
//! Events carry no control authority: dropping or ignoring them never
//! changes pipeline behavior.

use super::session::SwitchPhase;
use crate::backends::camera::CaptureDevice;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The active device failed while streaming; output is blacked out
    CameraFailed { device_id: String, reason: String },
    /// Live capture started or stopped reaching the consumer
    CameraStateChanged {
        camera_on: bool,
        device_id: Option<String>,
    },
    /// A switchover session moved to a new phase
    SwitchPhase { session: Uuid, phase: SwitchPhase },
    /// Result of a device re-enumeration
    DevicesChanged(Vec<CaptureDevice>),
}
