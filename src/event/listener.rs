use super::Event;
use crate::error::ListenerResult;

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a listener registration. Two listeners wrapping the same
/// callback still have distinct ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
  fn next() -> Self {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ListenerOptions {
  /// Remove the listener right after its first successful invocation.
  pub once: bool,
}

impl ListenerOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn once(mut self) -> Self {
    self.once = true;
    self
  }
}

/// Something that can receive an event.
pub trait Handler: Send + Sync {
  fn handle(&self, event: &mut dyn Event) -> ListenerResult;
}

impl<F> Handler for F
where
  F: Fn(&mut dyn Event) -> ListenerResult + Send + Sync,
{
  fn handle(&self, event: &mut dyn Event) -> ListenerResult {
    self(event)
  }
}

/// A registered callback together with its options.
///
/// Listeners are shared as `Arc<Listener>`; the same `Arc` is used to add the
/// listener to a target and later remove it again.
///
/// # Example
/// ```
/// use beacon::event::listener::Listener;
/// use beacon::event::target::{EventTarget, Target};
/// use beacon::event::timer::{TimerEvent, TIMER};
///
/// let target = EventTarget::new();
/// let listener = Listener::new(|event| println!("{}", event));
/// target.add_event_listener(TIMER, &listener);
/// target.dispatch_event(&mut TimerEvent::new(TIMER, &target));
/// target.remove_event_listener(TIMER, &listener);
/// ```
pub struct Listener {
  id: ListenerId,
  handler: Box<dyn Handler>,
  options: ListenerOptions,
}

impl Listener {
  pub fn new<F>(callback: F) -> Arc<Self>
  where
    F: Fn(&mut dyn Event) + Send + Sync + 'static,
  {
    Self::with_options(callback, ListenerOptions::default())
  }

  /// A listener removed after it first runs.
  pub fn once<F>(callback: F) -> Arc<Self>
  where
    F: Fn(&mut dyn Event) + Send + Sync + 'static,
  {
    Self::with_options(callback, ListenerOptions::new().once())
  }

  pub fn with_options<F>(callback: F, options: ListenerOptions) -> Arc<Self>
  where
    F: Fn(&mut dyn Event) + Send + Sync + 'static,
  {
    Self::from_handler(
      move |event: &mut dyn Event| -> ListenerResult {
        callback(event);
        Ok(())
      },
      options,
    )
  }

  /// A listener whose callback can fail. A failure aborts the rest of the
  /// dispatch it happened in.
  pub fn fallible<F>(callback: F, options: ListenerOptions) -> Arc<Self>
  where
    F: Fn(&mut dyn Event) -> ListenerResult + Send + Sync + 'static,
  {
    Self::from_handler(callback, options)
  }

  pub fn from_handler<H>(handler: H, options: ListenerOptions) -> Arc<Self>
  where
    H: Handler + 'static,
  {
    Arc::new(Listener {
      id: ListenerId::next(),
      handler: Box::new(handler),
      options,
    })
  }

  pub fn id(&self) -> ListenerId {
    self.id
  }

  pub fn options(&self) -> ListenerOptions {
    self.options
  }

  pub fn invoke(&self, event: &mut dyn Event) -> ListenerResult {
    self.handler.handle(event)
  }

  pub fn matches(&self, other: &Listener) -> bool {
    self.id == other.id
  }
}

impl Debug for Listener {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Listener")
      .field("id", &self.id)
      .field("options", &self.options)
      .finish()
  }
}
