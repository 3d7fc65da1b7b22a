// SPDX-License-Identifier: MPL-2.0

//! Camera Handoff - live camera hot-swap for video publishers
//!
//! This library switches the capture device feeding an outgoing frame
//! stream without interrupting delivery, masking the handoff with fade and
//! blackout overlays.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: capture driver traits and the synthetic driver
//! - [`pipelines`]: the switchover coordinator and its building blocks
//! - [`config`]: user configuration handling
//! - [`errors`]: error types
//!
//! # Example
//!
//! ```ignore
//! let backend = Arc::new(SyntheticBackend::demo());
//! let (consumer, frames) = ChannelConsumer::new();
//! let pipeline = Pipeline::spawn(backend.clone(), backend, Arc::new(consumer), &Config::default());
//! pipeline.switch_to(Some("cam-2")).await?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;

// Re-export commonly used types
pub use backends::camera::{CaptureDevice, CaptureFormat, PixelFormat};
pub use config::Config;
pub use errors::{AppError, AppResult, ChannelError, CompositeError, ConfigError, SwitchError};
pub use pipelines::switchover::{
    CompositingMode, FrameConsumer, FrameEnvelope, Pipeline, PipelineEvent, PipelineStatus,
    SwitchOutcome, SwitchPhase, SwitchTarget,
};
