//! Beacon is:
//! * a synchronous, in-process event target: listeners register per event
//!   type and any holder of the target can dispatch events to them.
//! * re-entrant: a listener may add or remove listeners, or dispatch further
//!   events, on the same target while it is being invoked.
//! * a small synchronization library providing the re-entrant spin lock the
//!   target is guarded by.
#[macro_use]
extern crate lazy_static;

#[macro_use]
mod logging;

pub mod config;
pub mod error;
pub mod event;
pub mod sync;
pub mod utils;

pub use logging::Logger;
