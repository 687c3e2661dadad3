use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::distributions::{Distribution, Uniform};

const MAX_BACKOFF: u32 = 10;

lazy_static! {
  static ref MULTICORE: bool = num_cpus::get() > 1;
}

/// The raw exclusive flag underneath [ReentrantLock](super::reentrant::ReentrantLock).
///
/// Contended acquisition spins with randomized exponential backoff. Once the
/// backoff saturates, or on a single core machine where spinning cannot
/// help, the waiting thread yields instead.
pub(super) struct SpinLock {
  flag: AtomicBool,
}

impl SpinLock {
  pub(super) fn new() -> Self {
    SpinLock {
      flag: AtomicBool::new(false),
    }
  }

  pub(super) fn try_lock(&self) -> bool {
    self
      .flag
      .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
      .is_ok()
  }

  /// Acquires the flag, giving up once `deadline` has elapsed. Returns the
  /// time spent waiting on failure.
  pub(super) fn lock(&self, deadline: Option<Duration>) -> Result<(), Duration> {
    if self.try_lock() {
      return Ok(());
    }
    let start = Instant::now();
    let mut backoff = 1u32;
    let mut rng = rand::thread_rng();
    loop {
      if *MULTICORE && backoff < MAX_BACKOFF {
        let uniform = Uniform::from(0..(2u32.pow(backoff) - 1).max(1));
        for _ in 0..uniform.sample(&mut rng) {
          std::hint::spin_loop();
        }
        backoff += 1;
      } else {
        std::thread::yield_now();
      }
      if !self.is_locked() && self.try_lock() {
        return Ok(());
      }
      if let Some(deadline) = deadline {
        let waited = start.elapsed();
        if waited >= deadline {
          return Err(waited);
        }
      }
    }
  }

  pub(super) fn is_locked(&self) -> bool {
    self.flag.load(Ordering::Relaxed)
  }

  pub(super) fn unlock(&self) {
    self.flag.store(false, Ordering::Release);
  }
}
