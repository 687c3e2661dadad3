use super::target::{Target, TargetRef};
use super::{Event, EventBase};

use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub const ERROR: &str = "error";

/// Dispatched when an error causes an operation to fail.
#[derive(Clone, Debug)]
pub struct ErrorEvent {
  base: EventBase,
  pub name: String,
  pub error: Arc<dyn Error + Send + Sync>,
}

impl ErrorEvent {
  pub fn new<S, E>(
    event_type: impl Into<String>,
    source: &Arc<S>,
    name: impl Into<String>,
    error: E,
  ) -> Self
  where
    S: Target + 'static,
    E: Into<Box<dyn Error + Send + Sync>>,
  {
    let error: Box<dyn Error + Send + Sync> = error.into();
    ErrorEvent {
      base: EventBase::new(event_type, Some(TargetRef::new(source))),
      name: name.into(),
      error: Arc::from(error),
    }
  }

  pub fn detached<E>(
    event_type: impl Into<String>,
    name: impl Into<String>,
    error: E,
  ) -> Self
  where
    E: Into<Box<dyn Error + Send + Sync>>,
  {
    let error: Box<dyn Error + Send + Sync> = error.into();
    ErrorEvent {
      base: EventBase::new(event_type, None),
      name: name.into(),
      error: Arc::from(error),
    }
  }
}

impl Event for ErrorEvent {
  fn base(&self) -> &EventBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut EventBase {
    &mut self.base
  }

  fn clone_event(&self) -> Box<dyn Event> {
    Box::new(ErrorEvent {
      base: self.base.fresh(),
      name: self.name.clone(),
      error: self.error.clone(),
    })
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl Display for ErrorEvent {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "[ErrorEvent type={} name={} message={}]",
      self.event_type(),
      self.name,
      self.error
    )
  }
}
