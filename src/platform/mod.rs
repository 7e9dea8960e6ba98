//! Platform abstraction layer
//!
//! Handles browser/native differences for time: the presence controller's
//! retry loop runs on animation frames, the lifecycle coordinator's settle
//! waits run on timers. Both go through [`Scheduler`] so tests can step time
//! by hand.

pub mod manual;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use manual::ManualScheduler;

/// Deferred work
pub type Task = Box<dyn FnOnce()>;

/// Source of deferred execution on the page's single event loop
pub trait Scheduler {
    /// Run `task` on the next animation frame. False if the frame could not
    /// be requested; the task is dropped.
    fn next_frame(&self, task: Task) -> bool;

    /// Run `task` after `delay_ms`
    fn after(&self, delay_ms: u32, task: Task);
}
