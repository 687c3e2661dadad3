//! This module contains beacon's event system. The module is organized into
//! the following sub modules:
//! * `target` which implements the [EventTarget](target::EventTarget), the
//!   hub listeners are registered on and events are dispatched through.
//! * `listener` which implements the [Listener](listener::Listener)
//!   registration object and the [Handler](listener::Handler) trait.
//! * `collection` which implements the per event type listener collection
//!   that stays walkable while listeners come and go.
//! * `error`, `timer`, `net_status` which implement the payload carrying
//!   event kinds.
//!
//! This module itself defines the [Event] contract and the [BasicEvent].
pub mod collection;
pub mod error;
pub mod listener;
pub mod net_status;
pub mod target;
pub mod timer;

use target::{Target, TargetRef};

use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Generic event types.
pub mod types {
  pub const ACTIVATE: &str = "activate";
  pub const ADDED: &str = "added";
  pub const CANCEL: &str = "cancel";
  pub const CHANGE: &str = "change";
  pub const CLEAR: &str = "clear";
  pub const CLOSE: &str = "close";
  pub const COMPLETE: &str = "complete";
  pub const CONNECT: &str = "connect";
  pub const DEACTIVATE: &str = "deactivate";
  pub const IDLE: &str = "idle";
  pub const INIT: &str = "init";
  pub const OPEN: &str = "open";
  pub const RELEASE: &str = "release";
  pub const REMOVED: &str = "removed";
}

/// Outcome of a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventResult {
  /// No listener stopped propagation.
  NotCanceled,
  /// A listener stopped propagation.
  CanceledByEventHandler,
  /// A default handler acted on the event. This is a convention between
  /// callers and is never produced by a dispatch itself.
  CanceledByDefaultEventHandler,
  /// A listener failed; listeners after it did not run.
  AbortedByFault,
}

impl EventResult {
  pub fn is_canceled(&self) -> bool {
    matches!(
      self,
      EventResult::CanceledByEventHandler
        | EventResult::CanceledByDefaultEventHandler
    )
  }
}

/// State shared by every event kind.
#[derive(Clone, Debug)]
pub struct EventBase {
  event_type: String,
  source: Option<TargetRef>,
  dispatch_point: Option<TargetRef>,
  propagation_stopped: bool,
}

impl EventBase {
  pub fn new(event_type: impl Into<String>, source: Option<TargetRef>) -> Self {
    EventBase {
      event_type: event_type.into(),
      source,
      dispatch_point: None,
      propagation_stopped: false,
    }
  }

  /// A re-dispatchable copy: same type and source, nothing left over from
  /// any delivery of `self`.
  pub fn fresh(&self) -> Self {
    EventBase::new(self.event_type.clone(), self.source.clone())
  }

  pub fn event_type(&self) -> &str {
    &self.event_type
  }

  pub fn set_type(&mut self, event_type: impl Into<String>) {
    self.event_type = event_type.into();
  }

  pub fn source(&self) -> Option<&TargetRef> {
    self.source.as_ref()
  }

  pub fn dispatch_point(&self) -> Option<&TargetRef> {
    self.dispatch_point.as_ref()
  }

  pub fn set_dispatch_point(&mut self, target: TargetRef) {
    self.dispatch_point = Some(target);
  }

  pub fn stop_propagation(&mut self) {
    self.propagation_stopped = true;
  }

  pub fn propagation_stopped(&self) -> bool {
    self.propagation_stopped
  }
}

/// The contract every event kind satisfies. Implementors provide access to
/// their [EventBase] and a way to copy themselves; everything else is
/// derived from the base.
pub trait Event: Display + Debug + Send + Sync + 'static {
  fn base(&self) -> &EventBase;
  fn base_mut(&mut self) -> &mut EventBase;

  /// Produces an independent copy of the same kind, carrying the same type,
  /// source and payload, with propagation reset and no dispatch point.
  fn clone_event(&self) -> Box<dyn Event>;

  fn as_any(&self) -> &dyn Any;

  fn event_type(&self) -> &str {
    self.base().event_type()
  }

  /// The target the event originated from, if it is still alive.
  fn source(&self) -> Option<Arc<dyn Target>> {
    self.base().source().and_then(TargetRef::upgrade)
  }

  /// The target currently delivering the event, if it is still alive.
  fn dispatch_point(&self) -> Option<Arc<dyn Target>> {
    self.base().dispatch_point().and_then(TargetRef::upgrade)
  }

  fn set_dispatch_point(&mut self, target: TargetRef) {
    self.base_mut().set_dispatch_point(target);
  }

  fn stop_propagation(&mut self) {
    self.base_mut().stop_propagation();
  }

  fn propagation_stopped(&self) -> bool {
    self.base().propagation_stopped()
  }
}

impl dyn Event {
  pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
    self.as_any().downcast_ref::<T>()
  }

  pub fn is<T: Event>(&self) -> bool {
    self.as_any().is::<T>()
  }
}

/// The plain event kind, carrying nothing beyond its type and source.
#[derive(Clone, Debug)]
pub struct BasicEvent {
  base: EventBase,
}

impl BasicEvent {
  pub fn new<S>(event_type: impl Into<String>, source: &Arc<S>) -> Self
  where
    S: Target + 'static,
  {
    BasicEvent {
      base: EventBase::new(event_type, Some(TargetRef::new(source))),
    }
  }

  pub fn detached(event_type: impl Into<String>) -> Self {
    BasicEvent {
      base: EventBase::new(event_type, None),
    }
  }
}

impl Event for BasicEvent {
  fn base(&self) -> &EventBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut EventBase {
    &mut self.base
  }

  fn clone_event(&self) -> Box<dyn Event> {
    Box::new(BasicEvent {
      base: self.base.fresh(),
    })
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl Display for BasicEvent {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "[Event type={}]", self.event_type())
  }
}

#[cfg(test)]
mod test {
  use super::target::EventTarget;
  use super::*;

  #[test]
  fn event_result_is_canceled_test() {
    assert!(!EventResult::NotCanceled.is_canceled());
    assert!(EventResult::CanceledByEventHandler.is_canceled());
    assert!(EventResult::CanceledByDefaultEventHandler.is_canceled());
    assert!(!EventResult::AbortedByFault.is_canceled());
  }

  #[test]
  fn basic_event_new_test() {
    let target = EventTarget::new();
    let event = BasicEvent::new(types::OPEN, &target);
    assert_eq!(event.event_type(), "open");
    assert!(event.base().source().unwrap().is(&target));
    assert!(event.dispatch_point().is_none());
    assert!(!event.propagation_stopped());
    assert_eq!(event.to_string(), "[Event type=open]");
  }

  #[test]
  fn stop_propagation_is_sticky_test() {
    let mut event = BasicEvent::detached(types::CLOSE);
    event.stop_propagation();
    event.stop_propagation();
    assert!(event.propagation_stopped());
  }

  #[test]
  fn basic_event_clone_resets_transient_state_test() {
    let target = EventTarget::new();
    let mut event = BasicEvent::new(types::CHANGE, &target);
    event.set_dispatch_point(target.handle());
    event.stop_propagation();
    let cloned = event.clone_event();
    assert!(cloned.is::<BasicEvent>());
    assert_eq!(cloned.event_type(), types::CHANGE);
    assert!(!cloned.propagation_stopped());
    assert!(cloned.base().dispatch_point().is_none());
    assert!(cloned.base().source().unwrap().is(&target));
    assert!(event.propagation_stopped());
  }

  #[test]
  fn set_type_test() {
    let mut base = EventBase::new(types::INIT, None);
    base.set_type(types::IDLE);
    assert_eq!(base.event_type(), "idle");
  }

  #[test]
  fn source_dropped_with_target_test() {
    let target = EventTarget::new();
    let event = BasicEvent::new(types::RELEASE, &target);
    assert!(event.source().is_some());
    drop(target);
    assert!(event.source().is_none());
  }
}
