// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for producer loops
//!
//! Drivers that push frames from their own thread (the synthetic backend in
//! auto mode, file or test-pattern sources) run the loop through a
//! [`CaptureLoopController`] so start/stop and thread joining behave the same
//! everywhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::constants::timing;

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a producer loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let controller = CaptureLoopController::start_paced("cam-1", interval, move || {
///     callback.on_frame(next_frame());
///     LoopAction::Continue
/// });
///
/// // Later, stop the loop and wait for the thread
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl CaptureLoopController {
    /// Start a loop that calls `loop_fn` once per `interval`
    ///
    /// The wait between iterations is sliced so a stop request is noticed
    /// within [`timing::LOOP_POLL_INTERVAL`] rather than a full interval.
    pub fn start_paced<F>(name: &str, interval: Duration, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, ?interval, "Starting capture loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Capture loop thread started");
            let mut next_deadline = Instant::now();

            loop {
                if !wait_until(next_deadline, &stop_signal_clone) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }
                next_deadline += interval;
                // Don't try to catch up after a stall, just resume pacing
                let now = Instant::now();
                if next_deadline < now {
                    next_deadline = now;
                }

                match loop_fn() {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }
            }

            info!(name = %name_clone, "Capture loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            // A loop callback may stop its own controller from the loop thread
            if handle.thread().id() == thread::current().id() {
                return;
            }
            debug!(name = %self.name, "Waiting for capture loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

/// Sleep until `deadline` in short slices; false if stopped meanwhile
fn wait_until(deadline: Instant, stop_signal: &AtomicBool) -> bool {
    loop {
        if stop_signal.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(timing::LOOP_POLL_INTERVAL));
    }
}
