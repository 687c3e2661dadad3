use super::collection::ListenerCollection;
use super::listener::Listener;
use super::{Event, EventResult};
use crate::config::{DeadlockPolicy, FatalPolicy, TargetConfig};
use crate::error::{Fatal, ListenerError};
use crate::logging::Logger;
use crate::sync::reentrant::ReentrantLock;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Anything listeners can be registered on and events dispatched through.
///
/// [EventTarget] is the implementation; types that embed one implement this
/// trait by delegating to it.
pub trait Target: Send + Sync {
  fn add_event_listener(&self, event_type: &str, listener: &Arc<Listener>);
  fn remove_event_listener(&self, event_type: &str, listener: &Arc<Listener>);
  fn dispatch_event(&self, event: &mut dyn Event) -> EventResult;
}

/// A non-owning reference to a [Target], held by events for their source and
/// dispatch point.
#[derive(Clone)]
pub struct TargetRef(Weak<dyn Target>);

impl TargetRef {
  pub fn new<S>(target: &Arc<S>) -> Self
  where
    S: Target + 'static,
  {
    let weak: Weak<S> = Arc::downgrade(target);
    TargetRef(weak)
  }

  pub fn upgrade(&self) -> Option<Arc<dyn Target>> {
    self.0.upgrade()
  }

  /// Whether this refers to `target`.
  pub fn is<S>(&self, target: &Arc<S>) -> bool
  where
    S: Target + ?Sized,
  {
    self.0.as_ptr() as *const () == Arc::as_ptr(target) as *const ()
  }

  /// Whether both refer to the same target.
  pub fn same(&self, other: &TargetRef) -> bool {
    self.0.as_ptr() as *const () == other.0.as_ptr() as *const ()
  }
}

impl Debug for TargetRef {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "TargetRef({:p})", self.0.as_ptr() as *const ())
  }
}

/// State guarded by the target's lock. Borrows of `listeners` are never held
/// while a listener runs.
#[derive(Default)]
struct Registry {
  listeners: RefCell<HashMap<String, ListenerCollection>>,
  recursion: Cell<usize>,
  tombstoned: RefCell<BTreeSet<String>>,
}

impl Registry {
  fn reap(&self) {
    let tombstoned = std::mem::take(&mut *self.tombstoned.borrow_mut());
    let mut listeners = self.listeners.borrow_mut();
    for event_type in tombstoned.iter() {
      if let Some(collection) = listeners.get_mut(event_type) {
        collection.reap_tombstones();
        if collection.is_empty() {
          listeners.remove(event_type);
        }
      }
    }
  }
}

/// Tracks one level of dispatch recursion. Leaving the outermost level reaps
/// every tombstone left behind by the dispatch.
struct Depth<'a> {
  registry: &'a Registry,
}

impl<'a> Depth<'a> {
  fn enter(registry: &'a Registry) -> (Self, usize) {
    let depth = registry.recursion.get() + 1;
    registry.recursion.set(depth);
    (Depth { registry }, depth)
  }
}

impl<'a> Drop for Depth<'a> {
  fn drop(&mut self) {
    let depth = self.registry.recursion.get() - 1;
    self.registry.recursion.set(depth);
    if depth == 0 {
      self.registry.reap();
    }
  }
}

/// Keeps a once listener tombstoned while it runs, so nested dispatches skip
/// it. Unless the invocation succeeds, the listener is revived on drop.
struct Consume<'a> {
  registry: &'a Registry,
  event_type: &'a str,
  listener: &'a Arc<Listener>,
  succeeded: bool,
}

impl<'a> Consume<'a> {
  fn succeed(&mut self) {
    self.succeeded = true;
  }
}

impl<'a> Drop for Consume<'a> {
  fn drop(&mut self) {
    if self.succeeded {
      return;
    }
    if let Ok(mut listeners) = self.registry.listeners.try_borrow_mut() {
      if let Some(collection) = listeners.get_mut(self.event_type) {
        collection.add(self.listener);
      }
    }
  }
}

enum Fault {
  Error(ListenerError),
  Panic(Box<dyn Any + Send>),
}

/// The event hub: a registry of listeners per event type, guarded by a
/// re-entrant lock so that listeners can call back into it.
///
/// Listeners of one type run in registration order. Removing a listener while
/// a dispatch is in flight only tombstones it; it does not run again, and it
/// is unlinked once the outermost dispatch returns.
///
/// # Example
/// ```
/// use beacon::event::listener::Listener;
/// use beacon::event::target::{EventTarget, Target};
/// use beacon::event::{types, BasicEvent, EventResult};
///
/// let target = EventTarget::new();
/// target.add_event_listener(types::CLOSE, &Listener::new(|event| {
///   event.stop_propagation();
/// }));
/// target.add_event_listener(types::CLOSE, &Listener::new(|_| {
///   unreachable!("propagation was stopped");
/// }));
/// let result = target.dispatch_event(&mut BasicEvent::new(types::CLOSE, &target));
/// assert_eq!(result, EventResult::CanceledByEventHandler);
/// ```
pub struct EventTarget {
  lock: ReentrantLock<Registry>,
  config: TargetConfig,
  logger: Logger,
  this: Weak<EventTarget>,
}

impl EventTarget {
  pub fn new() -> Arc<Self> {
    EventTargetBuilder::new().build()
  }

  /// A reference to this target, as stamped on events it dispatches.
  pub fn handle(&self) -> TargetRef {
    let weak: Weak<dyn Target> = self.this.clone();
    TargetRef(weak)
  }

  pub fn config(&self) -> &TargetConfig {
    &self.config
  }

  /// Whether a live listener is registered for `event_type`.
  pub fn has_event_listener(&self, event_type: &str) -> bool {
    self.listener_count(event_type) > 0
  }

  pub fn listener_count(&self, event_type: &str) -> usize {
    let registry = self.lock.lock();
    let listeners = registry.listeners.borrow();
    listeners
      .get(event_type)
      .map(ListenerCollection::len)
      .unwrap_or(0)
  }

  /// Whether `listener` is live on `event_type`.
  pub fn contains(&self, event_type: &str, listener: &Listener) -> bool {
    let registry = self.lock.lock();
    let listeners = registry.listeners.borrow();
    listeners
      .get(event_type)
      .map(|collection| collection.contains(listener.id()))
      .unwrap_or(false)
  }

  /// Number of dispatches of this target currently in flight.
  pub fn recursion_depth(&self) -> usize {
    self.lock.lock().recursion.get()
  }

  fn remove_locked(
    &self,
    registry: &Registry,
    event_type: &str,
    listener: &Listener,
  ) {
    let immediate = registry.recursion.get() == 0;
    let removed = {
      let mut listeners = registry.listeners.borrow_mut();
      match listeners.get_mut(event_type) {
        Some(collection) => {
          let live = collection.remove(listener, immediate);
          let empty = collection.is_empty();
          if immediate && empty {
            listeners.remove(event_type);
          }
          Some(live)
        }
        None => None,
      }
    };
    // The logger may call back into this target, so no borrow is held here.
    let live = match removed {
      Some(live) => live,
      None => {
        log_debug!(self.logger, "No listener[s] found: type={}", event_type);
        return;
      }
    };
    log_debug!(
      self.logger,
      "Removing event listener: type={}, listener={:?}, immediate={}",
      event_type,
      listener.id(),
      immediate
    );
    if live && !immediate {
      registry.tombstoned.borrow_mut().insert(event_type.to_owned());
    }
  }

  fn walk(
    &self,
    registry: &Registry,
    event_type: &str,
    event: &mut dyn Event,
  ) -> Result<EventResult, ListenerError> {
    let first = registry
      .listeners
      .borrow()
      .get(event_type)
      .map(ListenerCollection::first);
    let mut next = match first {
      Some(first) => first,
      None => {
        log_debug!(self.logger, "No listener[s] found: type={}", event_type);
        return Ok(EventResult::NotCanceled);
      }
    };
    while let Some((cursor, listener)) = next {
      if listener.options().once {
        self.remove_locked(registry, event_type, &listener);
        let mut consume = Consume {
          registry,
          event_type,
          listener: &listener,
          succeeded: false,
        };
        listener.invoke(event)?;
        consume.succeed();
      } else {
        listener.invoke(event)?;
      }
      if event.propagation_stopped() {
        log_debug!(self.logger, "Propagation stopped: type={}", event_type);
        return Ok(EventResult::CanceledByEventHandler);
      }
      next = registry
        .listeners
        .borrow()
        .get(event_type)
        .and_then(|collection| collection.next(cursor));
    }
    Ok(EventResult::NotCanceled)
  }

  fn fault(&self, event_type: &str, fault: Fault) -> EventResult {
    match fault {
      Fault::Error(error) => {
        log_error!(
          self.logger,
          "Failed to handle event: type={}, {}",
          event_type,
          error
        );
      }
      Fault::Panic(payload) => {
        if payload.is::<Fatal>() {
          panic::resume_unwind(payload);
        }
        let message = payload
          .downcast_ref::<&str>()
          .map(|message| message.to_string())
          .or_else(|| payload.downcast_ref::<String>().cloned())
          .unwrap_or_else(|| "unknown panic".to_owned());
        log_error!(
          self.logger,
          "Failed to handle event: type={}, listener panicked: {}",
          event_type,
          message
        );
      }
    }
    EventResult::AbortedByFault
  }
}

impl Target for EventTarget {
  fn add_event_listener(&self, event_type: &str, listener: &Arc<Listener>) {
    if event_type.is_empty() {
      log_debug!(
        self.logger,
        "Event type not present: listener={:?}",
        listener.id()
      );
      return;
    }
    let registry = self.lock.lock();
    log_debug!(
      self.logger,
      "Adding event listener: type={}, listener={:?}",
      event_type,
      listener.id()
    );
    registry
      .listeners
      .borrow_mut()
      .entry(event_type.to_owned())
      .or_insert_with(ListenerCollection::new)
      .add(listener);
  }

  fn remove_event_listener(&self, event_type: &str, listener: &Arc<Listener>) {
    if event_type.is_empty() {
      log_debug!(
        self.logger,
        "Event type not present: listener={:?}",
        listener.id()
      );
      return;
    }
    let registry = self.lock.lock();
    self.remove_locked(&registry, event_type, listener);
  }

  fn dispatch_event(&self, event: &mut dyn Event) -> EventResult {
    let registry = self.lock.lock();
    event.set_dispatch_point(self.handle());
    let event_type = event.event_type().to_owned();
    log_debug!(self.logger, "Dispatching event: {}", event);

    let (_depth, depth) = Depth::enter(&registry);
    let max = self.config.max_recursion;
    if max > 0 && depth > max {
      log_error!(
        self.logger,
        "Max recursion reached: type={}, depth={}",
        event_type,
        depth
      );
      self
        .config
        .lock
        .fatal
        .raise(&self.logger, Fatal::RecursionOverflow { depth, max });
    }

    let walked = panic::catch_unwind(AssertUnwindSafe(|| {
      self.walk(&registry, &event_type, event)
    }));
    match walked {
      Ok(Ok(result)) => result,
      Ok(Err(error)) => self.fault(&event_type, Fault::Error(error)),
      Err(payload) => self.fault(&event_type, Fault::Panic(payload)),
    }
  }
}

impl Debug for EventTarget {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let types = self.lock.try_lock().map(|registry| {
      let mut types: Vec<String> =
        registry.listeners.borrow().keys().cloned().collect();
      types.sort();
      types
    });
    f.debug_struct("EventTarget")
      .field("config", &self.config)
      .field("types", &types)
      .finish()
  }
}

pub struct EventTargetBuilder {
  config: TargetConfig,
  logger: Logger,
}

impl Default for EventTargetBuilder {
  fn default() -> Self {
    EventTargetBuilder {
      config: TargetConfig::default(),
      logger: Logger::global(),
    }
  }
}

impl EventTargetBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn config(mut self, config: TargetConfig) -> Self {
    self.config = config;
    self
  }

  /// Maximum nesting of dispatches, `0` for unbounded.
  pub fn max_recursion(mut self, max: usize) -> Self {
    self.config.max_recursion = max;
    self
  }

  pub fn deadlock(mut self, deadlock: DeadlockPolicy) -> Self {
    self.config.lock.deadlock = deadlock;
    self
  }

  pub fn fatal(mut self, fatal: FatalPolicy) -> Self {
    self.config.lock.fatal = fatal;
    self
  }

  pub fn logger(mut self, logger: Logger) -> Self {
    self.logger = logger;
    self
  }

  pub fn build(self) -> Arc<EventTarget> {
    let EventTargetBuilder { config, logger } = self;
    Arc::new_cyclic(|this| EventTarget {
      lock: ReentrantLock::with_logger(
        Registry::default(),
        config.lock,
        logger.clone(),
      ),
      config,
      logger,
      this: this.clone(),
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::event::BasicEvent;
  use crate::utils::testing::{no_deadlock, CaptureLog};

  use log::{Level, Log, Metadata, Record};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  fn recorder(
    log: &Arc<Mutex<Vec<&'static str>>>,
    name: &'static str,
  ) -> Arc<Listener> {
    let log = log.clone();
    Listener::new(move |_| log.lock().unwrap().push(name))
  }

  #[test]
  fn target_builder_test() {
    let target = EventTargetBuilder::new()
      .max_recursion(3)
      .deadlock(DeadlockPolicy::detect())
      .build();
    assert_eq!(target.config().max_recursion, 3);
    assert_eq!(target.config().lock.deadlock, DeadlockPolicy::detect());
    assert!(target.handle().is(&target));
    assert_eq!(target.recursion_depth(), 0);
  }

  #[test]
  fn empty_type_is_ignored_test() {
    let capture = Arc::new(CaptureLog::new());
    let target = EventTargetBuilder::new()
      .logger(Logger::new(capture.clone()))
      .build();
    let listener = Listener::new(|_| {});
    target.add_event_listener("", &listener);
    target.remove_event_listener("", &listener);
    assert!(!target.has_event_listener(""));
    assert_eq!(capture.count(Level::Debug), 2);
  }

  #[test]
  fn registration_order_test() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let target = EventTarget::new();
    target.add_event_listener("x", &recorder(&log, "a"));
    target.add_event_listener("x", &recorder(&log, "b"));
    target.add_event_listener("x", &recorder(&log, "c"));
    target.add_event_listener("y", &recorder(&log, "other"));
    target.dispatch_event(&mut BasicEvent::new("x", &target));
    assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
  }

  #[test]
  fn dispatch_point_is_stamped_test() {
    let first = EventTarget::new();
    let second = EventTarget::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cloned = seen.clone();
    let listener = Listener::new(move |event| {
      cloned
        .lock()
        .unwrap()
        .push(event.base().dispatch_point().unwrap().clone());
    });
    first.add_event_listener("x", &listener);
    second.add_event_listener("x", &listener);
    let mut event = BasicEvent::new("x", &first);
    first.dispatch_event(&mut event);
    second.dispatch_event(&mut event);
    let seen = seen.lock().unwrap();
    assert!(seen[0].is(&first));
    assert!(seen[1].is(&second));
    assert!(event.base().source().unwrap().is(&first));
    assert!(seen[1].same(&second.handle()));
    assert!(!seen[0].same(&seen[1]));
  }

  #[test]
  fn remove_outside_dispatch_is_immediate_test() {
    let target = EventTarget::new();
    let listener = Listener::new(|_| {});
    target.add_event_listener("x", &listener);
    assert!(target.contains("x", &listener));
    target.remove_event_listener("x", &listener);
    assert!(!target.contains("x", &listener));
    assert!(!format!("{:?}", target).contains("\"x\""));
  }

  #[test]
  fn remove_unknown_type_is_logged_test() {
    let capture = Arc::new(CaptureLog::new());
    let target = EventTargetBuilder::new()
      .logger(Logger::new(capture.clone()))
      .build();
    target.remove_event_listener("x", &Listener::new(|_| {}));
    assert!(capture
      .messages()
      .iter()
      .any(|message| message == "No listener[s] found: type=x"));
  }

  #[test]
  fn removal_of_later_listener_mid_dispatch_test() {
    no_deadlock(|| {
      let log = Arc::new(Mutex::new(Vec::new()));
      let target = EventTarget::new();
      let later = recorder(&log, "later");
      let weak = Arc::downgrade(&target);
      let removed = later.clone();
      let cloned = log.clone();
      target.add_event_listener(
        "x",
        &Listener::new(move |_| {
          cloned.lock().unwrap().push("first");
          let target = weak.upgrade().unwrap();
          target.remove_event_listener("x", &removed);
          assert_eq!(target.listener_count("x"), 1);
        }),
      );
      target.add_event_listener("x", &later);
      target.dispatch_event(&mut BasicEvent::new("x", &target));
      target.dispatch_event(&mut BasicEvent::new("x", &target));
      assert_eq!(*log.lock().unwrap(), ["first", "first"]);
      assert!(!target.contains("x", &later));
    });
  }

  #[test]
  fn added_during_dispatch_runs_in_same_pass_test() {
    no_deadlock(|| {
      let log = Arc::new(Mutex::new(Vec::new()));
      let target = EventTarget::new();
      let late = recorder(&log, "late");
      let weak = Arc::downgrade(&target);
      target.add_event_listener(
        "x",
        &Listener::once(move |_| {
          weak.upgrade().unwrap().add_event_listener("x", &late);
        }),
      );
      target.dispatch_event(&mut BasicEvent::new("x", &target));
      assert_eq!(*log.lock().unwrap(), ["late"]);
      assert_eq!(target.listener_count("x"), 1);
    });
  }

  #[test]
  fn tombstones_reaped_after_outermost_dispatch_test() {
    no_deadlock(|| {
      let target = EventTarget::new();
      let other = Listener::new(|_| {});
      target.add_event_listener("y", &other);
      let weak = Arc::downgrade(&target);
      let removed = other.clone();
      target.add_event_listener(
        "x",
        &Listener::new(move |_| {
          let target = weak.upgrade().unwrap();
          target.remove_event_listener("y", &removed);
          let registry = target.lock.lock();
          let listeners = registry.listeners.borrow();
          assert_eq!(listeners.get("y").unwrap().physical_len(), 1);
        }),
      );
      target.dispatch_event(&mut BasicEvent::new("x", &target));
      let registry = target.lock.lock();
      assert!(registry.listeners.borrow().get("y").is_none());
      assert!(registry.tombstoned.borrow().is_empty());
    });
  }

  #[test]
  fn fallible_listener_aborts_pass_test() {
    let capture = Arc::new(CaptureLog::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let target = EventTargetBuilder::new()
      .logger(Logger::new(capture.clone()))
      .build();
    target.add_event_listener("x", &recorder(&log, "before"));
    target.add_event_listener(
      "x",
      &Listener::fallible(
        |_| Err("disk full".into()),
        Default::default(),
      ),
    );
    target.add_event_listener("x", &recorder(&log, "after"));
    let result = target.dispatch_event(&mut BasicEvent::new("x", &target));
    assert_eq!(result, EventResult::AbortedByFault);
    assert_eq!(*log.lock().unwrap(), ["before"]);
    assert_eq!(target.recursion_depth(), 0);
    assert!(capture
      .records()
      .contains(&(Level::Error, "Failed to handle event: type=x, disk full".to_owned())));
  }

  #[test]
  fn panicking_listener_is_contained_test() {
    let capture = Arc::new(CaptureLog::new());
    let target = EventTargetBuilder::new()
      .logger(Logger::new(capture.clone()))
      .build();
    let panicking = Listener::new(|_| panic!("boom"));
    target.add_event_listener("x", &panicking);
    let result = target.dispatch_event(&mut BasicEvent::new("x", &target));
    assert_eq!(result, EventResult::AbortedByFault);
    assert_eq!(target.recursion_depth(), 0);
    assert!(!target.lock.is_locked());
    assert_eq!(capture.count(Level::Error), 1);
    target.remove_event_listener("x", &panicking);
    let result = target.dispatch_event(&mut BasicEvent::new("x", &target));
    assert_eq!(result, EventResult::NotCanceled);
  }

  #[test]
  fn once_listener_not_removed_after_fault_test() {
    let target = EventTarget::new();
    let failing = Listener::fallible(
      |_| Err("nope".into()),
      crate::event::listener::ListenerOptions::new().once(),
    );
    target.add_event_listener("x", &failing);
    target.dispatch_event(&mut BasicEvent::new("x", &target));
    assert!(target.contains("x", &failing));
  }

  #[test]
  fn once_listener_skipped_by_own_nested_dispatch_test() {
    no_deadlock(|| {
      let target = EventTarget::new();
      let calls = Arc::new(AtomicUsize::new(0));
      let (weak, count) = (Arc::downgrade(&target), calls.clone());
      let once = Listener::once(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
        let target = weak.upgrade().unwrap();
        let result = target.dispatch_event(&mut BasicEvent::new("x", &target));
        assert_eq!(result, EventResult::NotCanceled);
      });
      target.add_event_listener("x", &once);
      target.dispatch_event(&mut BasicEvent::new("x", &target));
      target.dispatch_event(&mut BasicEvent::new("x", &target));
      assert_eq!(calls.load(Ordering::SeqCst), 1);
      assert!(!target.contains("x", &once));
      assert_eq!(target.recursion_depth(), 0);
    });
  }

  #[test]
  fn once_listener_revived_after_panic_test() {
    let target = EventTarget::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let count = calls.clone();
    let once = Listener::once(move |_| {
      if count.fetch_add(1, Ordering::SeqCst) == 0 {
        panic!("first delivery fails");
      }
    });
    target.add_event_listener("x", &once);
    let result = target.dispatch_event(&mut BasicEvent::new("x", &target));
    assert_eq!(result, EventResult::AbortedByFault);
    assert!(target.contains("x", &once));
    let result = target.dispatch_event(&mut BasicEvent::new("x", &target));
    assert_eq!(result, EventResult::NotCanceled);
    assert!(!target.contains("x", &once));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  /// A sink that reads the target it is logging for.
  #[derive(Default)]
  struct Observer {
    target: Mutex<Weak<EventTarget>>,
    seen: Mutex<Vec<usize>>,
  }

  impl Log for Observer {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
      true
    }

    fn log(&self, _: &Record<'_>) {
      let target = self.target.lock().unwrap().upgrade();
      if let Some(target) = target {
        let count = target.listener_count("x");
        self.seen.lock().unwrap().push(count);
      }
    }

    fn flush(&self) {}
  }

  #[test]
  fn logger_may_observe_target_test() {
    no_deadlock(|| {
      let observer = Arc::new(Observer::default());
      let target = EventTargetBuilder::new()
        .logger(Logger::new(observer.clone()))
        .build();
      *observer.target.lock().unwrap() = Arc::downgrade(&target);
      let kept = Listener::new(|_| {});
      target.add_event_listener("x", &kept);
      target.add_event_listener("x", &Listener::once(|_| {}));
      target.dispatch_event(&mut BasicEvent::new("x", &target));
      target.dispatch_event(&mut BasicEvent::new("y", &target));
      target.remove_event_listener("y", &kept);
      target.remove_event_listener("x", &kept);
      let seen = observer.seen.lock().unwrap();
      assert!(!seen.is_empty());
      assert_eq!(seen.last(), Some(&0));
      assert!(!target.has_event_listener("x"));
    });
  }
}
