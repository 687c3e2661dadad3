use super::listener::{Listener, ListenerId};

use std::collections::HashSet;
use std::sync::Arc;

/// Position of a walk over a [ListenerCollection].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor(usize);

/// The listeners of one event type, in registration order.
///
/// Removal comes in two flavours. Immediate removal unlinks the listener.
/// Deferred removal only tombstones it: the entry keeps its position so a
/// walk in progress is not disturbed, but walks skip it from then on. The
/// owner reaps tombstones once nothing is walking the collection any more.
///
/// While only deferred removals happen, entries never move, so a [Cursor] from
/// an earlier call remains valid. Entries appended during a walk are visited
/// by that walk.
#[derive(Default)]
pub struct ListenerCollection {
  entries: Vec<Arc<Listener>>,
  members: HashSet<ListenerId>,
  removed: HashSet<ListenerId>,
}

impl ListenerCollection {
  pub fn new() -> Self {
    Self::default()
  }

  /// Appends `listener` unless it is already present. A tombstoned listener
  /// is revived in place.
  pub fn add(&mut self, listener: &Arc<Listener>) {
    let id = listener.id();
    if self.members.insert(id) {
      self.entries.push(listener.clone());
    }
    self.removed.remove(&id);
  }

  /// Removes `listener`, returning whether it was present and live.
  pub fn remove(&mut self, listener: &Listener, immediate: bool) -> bool {
    let id = listener.id();
    if !self.members.contains(&id) {
      return false;
    }
    if !immediate {
      return self.removed.insert(id);
    }
    let live = !self.removed.remove(&id);
    self.members.remove(&id);
    self.entries.retain(|entry| entry.id() != id);
    live
  }

  pub fn first(&self) -> Option<(Cursor, Arc<Listener>)> {
    self.scan(0)
  }

  /// The next live entry after `cursor`.
  pub fn next(&self, cursor: Cursor) -> Option<(Cursor, Arc<Listener>)> {
    self.scan(cursor.0 + 1)
  }

  fn scan(&self, from: usize) -> Option<(Cursor, Arc<Listener>)> {
    self
      .entries
      .iter()
      .enumerate()
      .skip(from)
      .find(|(_, entry)| !self.removed.contains(&entry.id()))
      .map(|(idx, entry)| (Cursor(idx), entry.clone()))
  }

  /// Unlinks every tombstoned entry. Must not be called while a walk over
  /// this collection is in progress.
  pub fn reap_tombstones(&mut self) {
    if self.removed.is_empty() {
      return;
    }
    let removed = std::mem::take(&mut self.removed);
    self.entries.retain(|entry| !removed.contains(&entry.id()));
    for id in removed.iter() {
      self.members.remove(id);
    }
  }

  pub fn has_tombstones(&self) -> bool {
    !self.removed.is_empty()
  }

  /// Whether `id` is registered and not tombstoned.
  pub fn contains(&self, id: ListenerId) -> bool {
    self.members.contains(&id) && !self.removed.contains(&id)
  }

  /// Number of live listeners.
  pub fn len(&self) -> usize {
    self.members.len() - self.removed.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of entries including tombstones.
  pub fn physical_len(&self) -> usize {
    self.entries.len()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn ids(collection: &ListenerCollection) -> Vec<ListenerId> {
    let mut result = Vec::new();
    let mut next = collection.first();
    while let Some((cursor, listener)) = next {
      result.push(listener.id());
      next = collection.next(cursor);
    }
    result
  }

  #[test]
  fn add_preserves_order_and_identity_test() {
    let mut collection = ListenerCollection::new();
    let a = Listener::new(|_| {});
    let b = Listener::new(|_| {});
    collection.add(&a);
    collection.add(&b);
    collection.add(&a);
    assert_eq!(ids(&collection), vec![a.id(), b.id()]);
    assert_eq!(collection.len(), 2);
  }

  #[test]
  fn immediate_remove_test() {
    let mut collection = ListenerCollection::new();
    let a = Listener::new(|_| {});
    let b = Listener::new(|_| {});
    collection.add(&a);
    collection.add(&b);
    assert!(collection.remove(&a, true));
    assert!(!collection.remove(&a, true));
    assert_eq!(ids(&collection), vec![b.id()]);
    assert_eq!(collection.physical_len(), 1);
  }

  #[test]
  fn deferred_remove_keeps_cursor_stable_test() {
    let mut collection = ListenerCollection::new();
    let a = Listener::new(|_| {});
    let b = Listener::new(|_| {});
    let c = Listener::new(|_| {});
    collection.add(&a);
    collection.add(&b);
    collection.add(&c);
    let (cursor, first) = collection.first().unwrap();
    assert!(first.matches(&a));
    assert!(collection.remove(&a, false));
    assert!(collection.remove(&b, false));
    assert!(!collection.remove(&b, false));
    let (_, next) = collection.next(cursor).unwrap();
    assert!(next.matches(&c));
    assert_eq!(collection.len(), 1);
    assert_eq!(collection.physical_len(), 3);
    assert!(!collection.contains(b.id()));
    collection.reap_tombstones();
    assert!(!collection.has_tombstones());
    assert_eq!(collection.physical_len(), 1);
    assert_eq!(ids(&collection), vec![c.id()]);
  }

  #[test]
  fn add_revives_tombstone_in_place_test() {
    let mut collection = ListenerCollection::new();
    let a = Listener::new(|_| {});
    let b = Listener::new(|_| {});
    collection.add(&a);
    collection.add(&b);
    collection.remove(&a, false);
    collection.add(&a);
    assert!(!collection.has_tombstones());
    collection.reap_tombstones();
    assert_eq!(ids(&collection), vec![a.id(), b.id()]);
  }

  #[test]
  fn append_during_walk_is_visited_test() {
    let mut collection = ListenerCollection::new();
    let a = Listener::new(|_| {});
    let b = Listener::new(|_| {});
    collection.add(&a);
    let (cursor, _) = collection.first().unwrap();
    collection.add(&b);
    let (_, next) = collection.next(cursor).unwrap();
    assert!(next.matches(&b));
  }

  #[test]
  fn immediate_remove_of_tombstone_test() {
    let mut collection = ListenerCollection::new();
    let a = Listener::new(|_| {});
    collection.add(&a);
    collection.remove(&a, false);
    assert!(!collection.remove(&a, true));
    assert!(collection.is_empty());
    assert!(!collection.has_tombstones());
    assert_eq!(collection.physical_len(), 0);
  }
}
