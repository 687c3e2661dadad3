use log::{Level, Log, Metadata, Record};

use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `f` on a helper thread and panics if it has not returned within `d`.
///
/// A panic inside `f` is passed through to the caller.
pub fn fail_after<T, F>(d: Duration, f: F) -> T
where
  T: Send + 'static,
  F: FnOnce() -> T + Send + 'static,
{
  let (done_tx, done_rx) = mpsc::channel();
  let handle = thread::Builder::new()
    .name("testing-thread".to_owned())
    .spawn(move || {
      let val = f();
      let _ = done_tx.send(());
      val
    })
    .expect("failed to spawn testing thread");
  match done_rx.recv_timeout(d) {
    Ok(_) => handle.join().expect("testing thread panicked"),
    Err(mpsc::RecvTimeoutError::Timeout) => {
      panic!("testing thread did not finish within {:?}", d)
    }
    Err(mpsc::RecvTimeoutError::Disconnected) => match handle.join() {
      Ok(val) => val,
      Err(payload) => std::panic::resume_unwind(payload),
    },
  }
}

/// Fails the calling test if `f` appears to deadlock.
pub fn no_deadlock<T, F>(f: F) -> T
where
  T: Send + 'static,
  F: FnOnce() -> T + Send + 'static,
{
  fail_after(DEFAULT_TIMEOUT, f)
}

/// A `log` sink that keeps every record it is given.
///
/// # Example
/// ```
/// use beacon::event::target::{EventTargetBuilder, Target};
/// use beacon::event::BasicEvent;
/// use beacon::utils::testing::CaptureLog;
/// use beacon::Logger;
/// use std::sync::Arc;
///
/// let capture = Arc::new(CaptureLog::new());
/// let target = EventTargetBuilder::new()
///   .logger(Logger::new(capture.clone()))
///   .build();
/// target.dispatch_event(&mut BasicEvent::new("z", &target));
/// assert!(capture.messages().contains(&"No listener[s] found: type=z".to_owned()));
/// ```
pub struct CaptureLog {
  level: Level,
  records: Mutex<Vec<(Level, String)>>,
}

impl Default for CaptureLog {
  fn default() -> Self {
    Self::with_level(Level::Trace)
  }
}

impl CaptureLog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Only keeps records at `level` or more severe.
  pub fn with_level(level: Level) -> Self {
    CaptureLog {
      level,
      records: Mutex::new(Vec::new()),
    }
  }

  pub fn records(&self) -> Vec<(Level, String)> {
    self.lock().clone()
  }

  pub fn messages(&self) -> Vec<String> {
    self.lock().iter().map(|(_, message)| message.clone()).collect()
  }

  pub fn count(&self, level: Level) -> usize {
    self.lock().iter().filter(|(at, _)| *at == level).count()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Level, String)>> {
    self
      .records
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl Log for CaptureLog {
  fn enabled(&self, metadata: &Metadata<'_>) -> bool {
    metadata.level() <= self.level
  }

  fn log(&self, record: &Record<'_>) {
    if self.enabled(record.metadata()) {
      self.lock().push((record.level(), record.args().to_string()));
    }
  }

  fn flush(&self) {}
}
