use super::spinlock::SpinLock;
use crate::config::LockConfig;
use crate::error::Fatal;
use crate::logging::Logger;

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

thread_local! {
  static TOKEN: usize = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// A token identifying the calling thread, never `0`.
pub fn current_thread_token() -> usize {
  TOKEN.with(|token| *token)
}

/// A mutual exclusion lock which the owning thread may acquire again
/// without blocking.
///
/// Only shared access is handed out, since several guards of the same
/// thread can be alive at once; use interior mutability (`Cell`, `RefCell`)
/// for the protected state and never keep a borrow across a call that may
/// re-enter.
///
/// # Example
/// ```
/// use beacon::sync::reentrant::ReentrantLock;
/// use std::cell::Cell;
///
/// let lock = ReentrantLock::new(Cell::new(0));
/// let outer = lock.lock();
/// {
///   let inner = lock.lock(); // same thread, does not block
///   inner.set(inner.get() + 1);
///   assert_eq!(lock.recursion(), 2);
/// }
/// assert_eq!(outer.get(), 1);
/// ```
pub struct ReentrantLock<T> {
  raw: SpinLock,
  owner: AtomicUsize,
  recursion: AtomicUsize,
  config: LockConfig,
  logger: Logger,
  inner: T,
}

// Only the owning thread can reach `inner`, one thread at a time.
unsafe impl<T: Send> Send for ReentrantLock<T> {}
unsafe impl<T: Send> Sync for ReentrantLock<T> {}

pub struct ReentrantLockGuard<'a, T> {
  lock: &'a ReentrantLock<T>,
  _not_send: PhantomData<*const ()>,
}

impl<'a, T> Deref for ReentrantLockGuard<'a, T> {
  type Target = T;

  fn deref(&self) -> &Self::Target {
    &self.lock.inner
  }
}

impl<'a, T> Drop for ReentrantLockGuard<'a, T> {
  fn drop(&mut self) {
    self.lock.release();
  }
}

unsafe impl<T: Sync> Sync for ReentrantLockGuard<'_, T> {}

impl<T> ReentrantLock<T> {
  pub fn new(value: T) -> Self {
    Self::with_config(value, LockConfig::default())
  }

  pub fn with_config(value: T, config: LockConfig) -> Self {
    Self::with_logger(value, config, Logger::global())
  }

  /// Like [with_config](Self::with_config), reporting deadlocks and fatal
  /// conditions to `logger`.
  pub fn with_logger(value: T, config: LockConfig, logger: Logger) -> Self {
    ReentrantLock {
      raw: SpinLock::new(),
      owner: AtomicUsize::new(0),
      recursion: AtomicUsize::new(0),
      config,
      logger,
      inner: value,
    }
  }

  /// Acquires the lock, blocking while another thread holds it.
  ///
  /// # Panics
  ///
  /// With the default fatal policy, panics with a [Fatal] payload when the
  /// configured re-entry bound is exceeded or a deadlock is detected.
  pub fn lock(&self) -> ReentrantLockGuard<'_, T> {
    let me = current_thread_token();
    if self.owner.load(Ordering::Relaxed) == me {
      return self.reenter();
    }
    if let Err(waited) = self.raw.lock(self.config.deadlock.timeout()) {
      log_error!(
        self.logger,
        "deadlock timeout on lock {:p} after {:?}",
        self,
        waited
      );
      self.config.fatal.raise(&self.logger, Fatal::Deadlock { waited });
    }
    self.acquired(me)
  }

  /// Acquires the lock if it is free or already owned by this thread.
  ///
  /// # Panics
  ///
  /// Same-thread re-entry is bounded as in [lock](Self::lock).
  pub fn try_lock(&self) -> Option<ReentrantLockGuard<'_, T>> {
    let me = current_thread_token();
    if self.owner.load(Ordering::Relaxed) == me {
      Some(self.reenter())
    } else if self.raw.try_lock() {
      Some(self.acquired(me))
    } else {
      None
    }
  }

  pub fn owned_by_current_thread(&self) -> bool {
    self.owner.load(Ordering::Relaxed) == current_thread_token()
  }

  pub fn is_locked(&self) -> bool {
    self.raw.is_locked()
  }

  /// The current re-entry count, `0` when unlocked.
  pub fn recursion(&self) -> usize {
    self.recursion.load(Ordering::Relaxed)
  }

  pub fn config(&self) -> &LockConfig {
    &self.config
  }

  fn reenter(&self) -> ReentrantLockGuard<'_, T> {
    let depth = self.recursion.fetch_add(1, Ordering::Relaxed) + 1;
    let max = self.config.max_recursion;
    if max > 0 && depth > max {
      self.recursion.fetch_sub(1, Ordering::Relaxed);
      self
        .config
        .fatal
        .raise(&self.logger, Fatal::LockRecursion { depth, max });
    }
    self.guard()
  }

  fn acquired(&self, me: usize) -> ReentrantLockGuard<'_, T> {
    self.owner.store(me, Ordering::Relaxed);
    self.recursion.store(1, Ordering::Relaxed);
    self.guard()
  }

  fn guard(&self) -> ReentrantLockGuard<'_, T> {
    ReentrantLockGuard {
      lock: self,
      _not_send: PhantomData,
    }
  }

  fn release(&self) {
    if self.recursion.fetch_sub(1, Ordering::Relaxed) == 1 {
      self.owner.store(0, Ordering::Relaxed);
      self.raw.unlock();
    }
  }
}

impl<T> fmt::Debug for ReentrantLock<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReentrantLock")
      .field("locked", &self.is_locked())
      .field("recursion", &self.recursion())
      .field("config", &self.config)
      .field("logger", &self.logger)
      .finish()
  }
}
