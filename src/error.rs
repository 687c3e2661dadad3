use std::time::Duration;

use thiserror::Error;

/// Conditions that indicate a programming error rather than a recoverable
/// situation. Raised through a [FatalPolicy](crate::config::FatalPolicy); a
/// dispatch boundary never swallows them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fatal {
  #[error("max dispatch recursion reached: depth {depth} exceeds {max}")]
  RecursionOverflow { depth: usize, max: usize },
  #[error("max lock recursion reached: depth {depth} exceeds {max}")]
  LockRecursion { depth: usize, max: usize },
  #[error("deadlock timeout: lock not acquired after {waited:?}")]
  Deadlock { waited: Duration },
}

/// Error reported by a fallible listener. Any error type converts into it, so
/// handlers can use `?` freely.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

pub type ListenerResult = Result<(), ListenerError>;
