// SPDX-License-Identifier: GPL-3.0-only

//! Switchover session bookkeeping

use super::frame::ChannelId;
use crate::backends::camera::{CaptureDevice, CaptureFormat};
use crate::errors::SwitchError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Progress of one device change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchPhase {
    /// Resolving the requested device
    Validating,
    /// Opening and starting the incoming channel
    Initializing,
    /// Making the incoming channel authoritative
    Promoting,
    /// Releasing the outgoing channel
    Retiring,
    Complete,
    Aborted,
}

impl SwitchPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Aborted)
    }
}

impl std::fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Initializing => "initializing",
            Self::Promoting => "promoting",
            Self::Retiring => "retiring",
            Self::Complete => "complete",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What a switch request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchTarget {
    /// A specific device, or the default one when `None`
    Device(Option<String>),
    /// The device after the active one in enumeration order
    Next,
}

impl std::fmt::Display for SwitchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device(Some(id)) => f.write_str(id),
            Self::Device(None) => f.write_str("<default>"),
            Self::Next => f.write_str("<next>"),
        }
    }
}

/// One in-flight device change
#[derive(Debug, Clone)]
pub struct SwitchoverSession {
    pub id: Uuid,
    pub target: SwitchTarget,
    /// Resolved device, known once the incoming channel opened
    pub device: Option<CaptureDevice>,
    pub incoming: ChannelId,
    pub outgoing: Option<ChannelId>,
    pub phase: SwitchPhase,
    pub started_at: Instant,
}

impl SwitchoverSession {
    pub fn new(target: SwitchTarget, incoming: ChannelId, outgoing: Option<ChannelId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            device: None,
            incoming,
            outgoing,
            phase: SwitchPhase::Validating,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Result of a completed switch
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub session: Uuid,
    pub device: CaptureDevice,
    pub channel: ChannelId,
    pub format: CaptureFormat,
    pub elapsed: Duration,
}

pub type SwitchReply = oneshot::Sender<Result<SwitchOutcome, SwitchError>>;

/// A request waiting for its turn
#[derive(Debug)]
pub struct PendingSwitch {
    pub target: SwitchTarget,
    pub reply: SwitchReply,
}

impl PendingSwitch {
    /// Answer the requester; a dropped receiver is not an error
    pub fn respond(self, result: Result<SwitchOutcome, SwitchError>) {
        let _ = self.reply.send(result);
    }
}
