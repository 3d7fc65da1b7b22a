// SPDX-License-Identifier: MPL-2.0

//! Frame processing pipelines
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────┐     ┌──────────────┐
//! │ Capture      │ ──▶ │ Switchover Pipeline │ ──▶ │ Consumer     │
//! │ channels     │     │  - single authority │     │ (publisher,  │
//! │ (per device) │     │  - fade / blackout  │     │  snapshots)  │
//! └──────────────┘     └─────────────────────┘     └──────────────┘
//! ```
//!
//! # Design Principles
//!
//! 1. **Non-blocking**: device I/O runs on the blocking pool, never on the
//!    coordinator task
//! 2. **Latest frame wins**: slow consumers skip frames instead of queueing
//! 3. **Non-destructive**: a failed switch leaves the running stream alone
//!
//! # Modules
//!
//! - [`switchover`]: device hot-swap with fade and blackout compositing

pub mod switchover;
