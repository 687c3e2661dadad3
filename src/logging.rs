use log::{Level, Log, Metadata, Record};

use std::fmt;
use std::sync::Arc;

pub(crate) const TARGET: &str = "beacon";

/// The sink an [EventTarget](crate::event::target::EventTarget) writes its
/// diagnostics to.
///
/// By default records go through the global `log` facade. A dedicated sink
/// can be injected instead, in which case the global logger and maximum level
/// are bypassed entirely.
#[derive(Clone, Default)]
pub struct Logger {
  sink: Option<Arc<dyn Log>>,
}

impl Logger {
  pub fn global() -> Self {
    Logger { sink: None }
  }

  pub fn new(sink: Arc<dyn Log>) -> Self {
    Logger { sink: Some(sink) }
  }

  pub fn is_global(&self) -> bool {
    self.sink.is_none()
  }

  pub(crate) fn log(&self, level: Level, args: fmt::Arguments<'_>) {
    let sink: &dyn Log = match &self.sink {
      Some(sink) => sink.as_ref(),
      None => {
        if level > log::max_level() {
          return;
        }
        log::logger()
      }
    };
    let metadata = Metadata::builder().level(level).target(TARGET).build();
    if sink.enabled(&metadata) {
      sink.log(
        &Record::builder()
          .metadata(metadata)
          .args(args)
          .module_path_static(Some(module_path!()))
          .build(),
      );
    }
  }
}

impl fmt::Debug for Logger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_global() {
      write!(f, "Logger(global)")
    } else {
      write!(f, "Logger(injected)")
    }
  }
}

macro_rules! log_debug {
  ($logger:expr, $($arg:tt)+) => {
    $logger.log(log::Level::Debug, format_args!($($arg)+))
  };
}

macro_rules! log_error {
  ($logger:expr, $($arg:tt)+) => {
    $logger.log(log::Level::Error, format_args!($($arg)+))
  };
}
