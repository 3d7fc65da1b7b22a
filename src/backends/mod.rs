// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! - [`camera`]: device enumeration, driver traits and the synthetic backend

pub mod camera;
