//! Observer hub: publish/subscribe dispatch keyed by event kind and path.
//!
//! Every stateful object (entities, entity sets, cancel tokens) owns one hub.
//! Subscribers register either for a whole [`EventKind`] or for a kind
//! narrowed to one path (an attribute key, a client id, an operation name).
//! Publishing `kind` with `path` first calls every generic subscriber of
//! `kind`, then every subscriber registered for exactly `kind:path`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The kinds of notifications tether objects publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// An attribute changed. Path: the attribute key.
    Change,
    /// An entity joined a set. Path: the entity's client id.
    Add,
    /// An entity left a set. Path: the entity's client id.
    Remove,
    /// A set was emptied in one step.
    Reset,
    /// A set was reordered.
    Sort,
    /// A validation pass finished. Path: `"true"` or `"false"`.
    Validate,
    /// A sync operation is about to hit the transport. Path: the operation.
    Request,
    /// A sync operation completed and was reconciled. Path: the operation.
    Sync,
    /// A sync operation failed or was canceled. Path: the operation.
    Error,
    /// A cancel token was canceled.
    Cancel,
    /// A cancel token was invalidated by normal completion.
    Invalidate,
}

impl EventKind {
    /// Wire-style name of the event kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Change => "change",
            EventKind::Add => "add",
            EventKind::Remove => "remove",
            EventKind::Reset => "reset",
            EventKind::Sort => "sort",
            EventKind::Validate => "validate",
            EventKind::Request => "request",
            EventKind::Sync => "sync",
            EventKind::Error => "error",
            EventKind::Cancel => "cancel",
            EventKind::Invalidate => "invalidate",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub path: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, path: Option<&str>) -> Self {
        Self {
            kind,
            path: path.map(str::to_string),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}:{}", self.kind, path),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A subscriber callback. Receives the publishing object and the event.
///
/// Observers are compared by pointer identity, so keep the `Arc` returned by
/// [`observer`] around if you intend to unsubscribe later.
pub type Observer<T> = Arc<dyn Fn(&T, &Event) + Send + Sync>;

/// Wraps a closure as an [`Observer`].
pub fn observer<T, F>(f: F) -> Observer<T>
where
    F: Fn(&T, &Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    kind: EventKind,
    path: Option<String>,
}

impl Key {
    fn new(kind: EventKind, path: Option<&str>) -> Self {
        Self {
            kind,
            path: path.map(str::to_string),
        }
    }
}

/// Subscriber table for one observable object.
pub struct ObserverHub<T> {
    table: HashMap<Key, Vec<Observer<T>>>,
}

impl<T> ObserverHub<T> {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Registers an observer. Duplicate registrations each fire.
    pub fn subscribe(&mut self, kind: EventKind, path: Option<&str>, observer: Observer<T>) {
        self.table
            .entry(Key::new(kind, path))
            .or_default()
            .push(observer);
    }

    /// Removes every registration of `observer` under `kind`/`path`.
    pub fn unsubscribe(&mut self, kind: EventKind, path: Option<&str>, observer: &Observer<T>) {
        let key = Key::new(kind, path);
        if let Some(list) = self.table.get_mut(&key) {
            list.retain(|o| !Arc::ptr_eq(o, observer));
            if list.is_empty() {
                self.table.remove(&key);
            }
        }
    }

    /// Snapshot of the observers to call for `kind`/`path`, in dispatch order:
    /// generic subscribers first, then path-scoped ones.
    pub fn observers_for(&self, kind: EventKind, path: Option<&str>) -> Vec<Observer<T>> {
        let mut out = Vec::new();
        if let Some(list) = self.table.get(&Key::new(kind, None)) {
            out.extend(list.iter().cloned());
        }
        if path.is_some() {
            if let Some(list) = self.table.get(&Key::new(kind, path)) {
                out.extend(list.iter().cloned());
            }
        }
        out
    }

    /// Number of registrations across all keys.
    pub fn len(&self) -> usize {
        self.table.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.table.clear();
    }
}

impl<T> Default for ObserverHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObserverHub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHub")
            .field("keys", &self.table.len())
            .field("observers", &self.len())
            .finish()
    }
}

/// Implemented by everything that owns an [`ObserverHub`].
///
/// The hub is only locked long enough to snapshot or edit the table;
/// observers always run with no lock held, so they may freely call back into
/// the object that published.
pub trait Observable: Sized {
    /// The object's subscriber table.
    fn observer_hub(&self) -> &Mutex<ObserverHub<Self>>;

    fn subscribe(&self, kind: EventKind, path: Option<&str>, observer: Observer<Self>) {
        self.observer_hub().lock().subscribe(kind, path, observer);
    }

    fn unsubscribe(&self, kind: EventKind, path: Option<&str>, observer: &Observer<Self>) {
        self.observer_hub().lock().unsubscribe(kind, path, observer);
    }

    /// Subscribes a closure to every `kind` event and returns the observer
    /// handle for later removal.
    fn on<F>(&self, kind: EventKind, f: F) -> Observer<Self>
    where
        F: Fn(&Self, &Event) + Send + Sync + 'static,
    {
        let handle: Observer<Self> = Arc::new(f);
        self.subscribe(kind, None, handle.clone());
        handle
    }

    fn publish(&self, kind: EventKind, path: Option<&str>) {
        let observers = self.observer_hub().lock().observers_for(kind, path);
        if observers.is_empty() {
            return;
        }
        let event = Event::new(kind, path);
        for observer in observers {
            observer(self, &event);
        }
    }

    /// Runs `f` with the subscriber table swapped out. The original table is
    /// put back afterwards, even if `f` panics.
    fn run_silent<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Self) -> R,
    {
        let saved = std::mem::take(&mut *self.observer_hub().lock());
        let _restore = RestoreOnDrop {
            hub: self.observer_hub(),
            saved: Some(saved),
        };
        f(self)
    }
}

struct RestoreOnDrop<'a, T> {
    hub: &'a Mutex<ObserverHub<T>>,
    saved: Option<ObserverHub<T>>,
}

impl<T> Drop for RestoreOnDrop<'_, T> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.hub.lock() = saved;
        }
    }
}
