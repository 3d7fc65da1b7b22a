// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture pipeline

use crate::backends::camera::BackendError;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error used by the command line front end
#[derive(Debug, Clone)]
pub enum AppError {
    /// Switchover failures
    Switch(SwitchError),
    /// Configuration errors
    Config(ConfigError),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Errors raised while opening or starting a capture channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No enumerable device matches the id, or no device exists at all
    DeviceNotFound(String),
    /// The environment denied capture access
    PermissionDenied(String),
    /// Device opened but could not start streaming
    StartFailed(String),
    /// Operation not valid in the channel's current lifecycle state
    InvalidState(String),
    /// Driver or runtime failure not covered above
    Driver(String),
}

/// Errors surfaced to the caller of a switch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// Requested device does not resolve
    DeviceNotFound(String),
    /// Capture access denied for the requested device
    PermissionDenied(String),
    /// Incoming channel could not be opened or started
    InitializationFailed(String),
    /// Incoming channel failed before it could be promoted
    DeviceFailed(String),
    /// Cycling needs at least one other device
    NoOtherDevice,
    /// Session was aborted by teardown before completing
    Cancelled,
    /// The coordinator task is gone
    PipelineClosed,
}

/// Compositing failures; the affected frame is dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    /// Buffer length does not match width/height/format
    BufferSize { expected: usize, actual: usize },
    /// Frame geometry cannot be composited
    InvalidGeometry { width: u32, height: u32 },
}

/// Configuration load/save errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// No platform config directory
    NoConfigDir,
    /// Reading or writing the config file failed
    Io(String),
    /// Config file is not valid JSON for [`crate::Config`]
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Switch(e) => write!(f, "Switch error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            ChannelError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            ChannelError::StartFailed(msg) => write!(f, "Failed to start capture: {}", msg),
            ChannelError::InvalidState(msg) => write!(f, "Invalid channel state: {}", msg),
            ChannelError::Driver(msg) => write!(f, "Driver error: {}", msg),
        }
    }
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            SwitchError::PermissionDenied(msg) => {
                write!(f, "The app was denied access to the camera: {}", msg)
            }
            SwitchError::InitializationFailed(msg) => {
                write!(f, "Camera initialization failed: {}", msg)
            }
            SwitchError::DeviceFailed(msg) => write!(f, "Camera failed: {}", msg),
            SwitchError::NoOtherDevice => write!(f, "Only one camera available, cannot switch"),
            SwitchError::Cancelled => write!(f, "Switch cancelled"),
            SwitchError::PipelineClosed => write!(f, "Pipeline is shut down"),
        }
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeError::BufferSize { expected, actual } => write!(
                f,
                "Frame buffer has {} bytes, expected {}",
                actual, expected
            ),
            CompositeError::InvalidGeometry { width, height } => {
                write!(f, "Invalid frame geometry {}x{}", width, height)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoConfigDir => write!(f, "No configuration directory available"),
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid config file: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for ChannelError {}
impl std::error::Error for SwitchError {}
impl std::error::Error for CompositeError {}
impl std::error::Error for ConfigError {}

impl From<BackendError> for ChannelError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DeviceNotFound(msg) => ChannelError::DeviceNotFound(msg),
            BackendError::PermissionDenied(msg) => ChannelError::PermissionDenied(msg),
            BackendError::InitializationFailed(msg) => ChannelError::StartFailed(msg),
        }
    }
}

impl From<ChannelError> for SwitchError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::DeviceNotFound(msg) => SwitchError::DeviceNotFound(msg),
            ChannelError::PermissionDenied(msg) => SwitchError::PermissionDenied(msg),
            ChannelError::StartFailed(msg)
            | ChannelError::InvalidState(msg)
            | ChannelError::Driver(msg) => SwitchError::InitializationFailed(msg),
        }
    }
}

impl From<tokio::task::JoinError> for ChannelError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChannelError::Driver(format!("driver task did not complete: {}", err))
    }
}

impl From<SwitchError> for AppError {
    fn from(err: SwitchError) -> Self {
        AppError::Switch(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
