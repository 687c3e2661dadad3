//! Per-instance configuration for event targets and their locks.
//!
//! Nothing in here is process-wide: every [EventTarget] and every
//! [ReentrantLock] carries its own copy, supplied when it is built.
//!
//! [EventTarget]: crate::event::target::EventTarget
//! [ReentrantLock]: crate::sync::reentrant::ReentrantLock
use crate::error::Fatal;
use crate::logging::Logger;

use std::time::Duration;

pub const DEFAULT_MAX_RECURSION: usize = 8;
pub const DEFAULT_DEADLOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do when a lock is not acquired in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeadlockPolicy {
  /// Wait for as long as it takes.
  Wait,
  /// Treat failing to acquire the lock within the timeout as a deadlock.
  Detect(Duration),
}

impl DeadlockPolicy {
  pub fn detect() -> Self {
    DeadlockPolicy::Detect(DEFAULT_DEADLOCK_TIMEOUT)
  }

  pub fn timeout(&self) -> Option<Duration> {
    match self {
      DeadlockPolicy::Wait => None,
      DeadlockPolicy::Detect(timeout) => Some(*timeout),
    }
  }
}

impl Default for DeadlockPolicy {
  fn default() -> Self {
    DeadlockPolicy::Wait
  }
}

/// How a [Fatal] condition terminates execution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FatalPolicy {
  /// Unwind the current thread with the [Fatal] value as panic payload.
  Panic,
  /// Log the condition and exit the process with the given code.
  Exit(i32),
}

impl Default for FatalPolicy {
  fn default() -> Self {
    FatalPolicy::Panic
  }
}

impl FatalPolicy {
  /// Terminates with `fatal`. `Exit` reports it through `logger` first, and
  /// on stderr when the global logger would drop it.
  pub fn raise(&self, logger: &Logger, fatal: Fatal) -> ! {
    match self {
      FatalPolicy::Panic => std::panic::panic_any(fatal),
      FatalPolicy::Exit(code) => {
        let current = std::thread::current();
        let name = current.name().unwrap_or("unknown");
        if logger.is_global() && !log::log_enabled!(log::Level::Error) {
          eprintln!("fatal condition on thread '{}': {}", name, fatal);
        }
        log_error!(logger, "fatal condition on thread '{}': {}", name, fatal);
        std::process::exit(*code);
      }
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LockConfig {
  pub deadlock: DeadlockPolicy,
  /// Bound on same-thread re-entry, `0` for unbounded.
  pub max_recursion: usize,
  pub fatal: FatalPolicy,
}

impl Default for LockConfig {
  fn default() -> Self {
    LockConfig {
      deadlock: DeadlockPolicy::Wait,
      max_recursion: 0,
      fatal: FatalPolicy::Panic,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetConfig {
  /// Bound on nested dispatches of one target, `0` for unbounded.
  pub max_recursion: usize,
  pub lock: LockConfig,
}

impl Default for TargetConfig {
  fn default() -> Self {
    TargetConfig {
      max_recursion: DEFAULT_MAX_RECURSION,
      lock: LockConfig::default(),
    }
  }
}
