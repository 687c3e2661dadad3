use super::target::{Target, TargetRef};
use super::{Event, EventBase};

use std::any::Any;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub const TIMER: &str = "timer";
pub const TIMER_COMPLETE: &str = "timer-complete";

/// Dispatched whenever a timer reaches its interval, or completes.
#[derive(Clone, Debug)]
pub struct TimerEvent {
  base: EventBase,
}

impl TimerEvent {
  pub fn new<S>(event_type: impl Into<String>, source: &Arc<S>) -> Self
  where
    S: Target + 'static,
  {
    TimerEvent {
      base: EventBase::new(event_type, Some(TargetRef::new(source))),
    }
  }

  pub fn detached(event_type: impl Into<String>) -> Self {
    TimerEvent {
      base: EventBase::new(event_type, None),
    }
  }
}

impl Event for TimerEvent {
  fn base(&self) -> &EventBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut EventBase {
    &mut self.base
  }

  fn clone_event(&self) -> Box<dyn Event> {
    Box::new(TimerEvent {
      base: self.base.fresh(),
    })
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl Display for TimerEvent {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "[TimerEvent type={}]", self.event_type())
  }
}
