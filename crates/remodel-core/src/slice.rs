//! Model slices and scoped subscription channels.
//!
//! Each slice key gets its own [`Channel`]: current value plus a
//! subscriber list scoped to that key only. A mutation that touches key
//! `A` notifies `A`'s channel and nobody else; a consumer watching `B`
//! is never woken. The composite-state channel and every derived hook
//! reuse the same channel type, so "one subscription per concern" holds
//! across the whole engine.
//!
//! Values travel as `Rc<dyn Any>` and are treated as immutable: a
//! transform produces a new `Rc`, it never mutates in place. Pointer
//! identity therefore doubles as the cheap "did this key change" test.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

slotmap::new_key_type! {
    pub struct SubKey;
}

type Listener = Rc<dyn Fn(&Rc<dyn Any>)>;

/// A single subscribable value cell.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<ChannelInner>,
}

struct ChannelInner {
    value: RefCell<Rc<dyn Any>>,
    subs: RefCell<SlotMap<SubKey, Listener>>,
}

impl Channel {
    pub(crate) fn new(initial: Rc<dyn Any>) -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                value: RefCell::new(initial),
                subs: RefCell::new(SlotMap::with_key()),
            }),
        }
    }

    pub(crate) fn get(&self) -> Rc<dyn Any> {
        self.inner.value.borrow().clone()
    }

    /// Writes without notifying. The dispatch pipeline notifies
    /// explicitly once the registry is consistent.
    pub(crate) fn replace(&self, value: Rc<dyn Any>) {
        *self.inner.value.borrow_mut() = value;
    }

    /// Notifies every subscriber with the current value. The listener
    /// list is snapshotted first so a callback may subscribe, drop its
    /// own guard, or dispatch further mutations without tripping a
    /// borrow.
    pub(crate) fn notify(&self) {
        let listeners: Vec<Listener> = self.inner.subs.borrow().values().cloned().collect();
        let current = self.get();
        for listener in listeners {
            listener(&current);
        }
    }

    pub(crate) fn subscribe(&self, f: impl Fn(&Rc<dyn Any>) + 'static) -> Subscription {
        let key = self.inner.subs.borrow_mut().insert(Rc::new(f));
        Subscription {
            channel: Some(Rc::downgrade(&self.inner)),
            key,
        }
    }

    /// Typed subscription: values that fail the downcast are reported
    /// once per delivery and skipped.
    pub(crate) fn subscribe_typed<T: 'static>(
        &self,
        label: impl Into<String>,
        f: impl Fn(&T) + 'static,
    ) -> Subscription {
        let label = label.into();
        self.subscribe(move |value| match value.downcast_ref::<T>() {
            Some(typed) => f(typed),
            None => log::error!("{label}: subscriber expects a different value type"),
        })
    }
}

/// RAII subscriber guard; dropping it unsubscribes.
pub struct Subscription {
    channel: Option<Weak<ChannelInner>>,
    key: SubKey,
}

impl Subscription {
    /// A guard bound to nothing. Handed out when subscribing to an
    /// undeclared key so the caller's code shape stays uniform.
    pub(crate) fn inert() -> Self {
        Self {
            channel: None,
            key: SubKey::default(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(weak) = &self.channel
            && let Some(inner) = weak.upgrade()
        {
            inner.subs.borrow_mut().remove(self.key);
        }
    }
}

/// An immutable snapshot of the whole composite state, in declaration
/// order. Cloning is cheap (per-entry `Rc` clone); "updating" produces a
/// new map.
///
/// Equality is per-slice pointer identity — the same notion of "touched"
/// the dispatch pipeline uses — not a deep value comparison.
#[derive(Clone, Default)]
pub struct StateMap {
    entries: Vec<(&'static str, Rc<dyn Any>)>,
}

impl std::fmt::Debug for StateMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}

impl PartialEq for StateMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((ka, va), (kb, vb))| ka == kb && Rc::ptr_eq(va, vb))
    }
}

impl StateMap {
    pub(crate) fn from_entries(entries: Vec<(&'static str, Rc<dyn Any>)>) -> Self {
        Self { entries }
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(key, _)| *key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[(&'static str, Rc<dyn Any>)] {
        &self.entries
    }

    pub fn get_raw(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }

    /// Typed read of one slice. Unknown keys and type mismatches are
    /// configuration errors: diagnostic plus `None`, never a panic.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let Some(value) = self.get_raw(key) else {
            log::error!("state has no model `{key}`");
            return None;
        };
        match value.downcast_ref::<T>() {
            Some(typed) => Some(typed.clone()),
            None => {
                log::error!("model `{key}` holds a different type than requested");
                None
            }
        }
    }

    /// Returns a new map with `key` replaced. The key set is frozen at
    /// store construction, so an unknown key leaves the map unchanged
    /// (with a diagnostic) rather than growing it.
    pub fn with<T: 'static>(mut self, key: &'static str, value: T) -> Self {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = Rc::new(value),
            None => log::error!("state has no model `{key}`; value discarded"),
        }
        self
    }

    /// Functional single-slice update inside a whole-state transform.
    pub fn update<T: Clone + 'static>(self, key: &'static str, f: impl FnOnce(&T) -> T) -> Self {
        match self.get::<T>(key) {
            Some(current) => {
                let next = f(&current);
                self.with(key, next)
            }
            None => self,
        }
    }
}

/// The slice registry: one channel per declared key, key set immutable
/// for the store's lifetime.
pub(crate) struct Slices {
    order: Vec<&'static str>,
    channels: HashMap<&'static str, Channel>,
}

impl Slices {
    pub(crate) fn new(models: &[(&'static str, Rc<dyn Any>)]) -> Self {
        let mut order = Vec::with_capacity(models.len());
        let mut channels = HashMap::with_capacity(models.len());
        for (key, initial) in models {
            if channels
                .insert(*key, Channel::new(initial.clone()))
                .is_some()
            {
                log::error!("model `{key}` declared twice; keeping the later initial value");
            } else {
                order.push(*key);
            }
        }
        Self { order, channels }
    }

    pub(crate) fn channel(&self, key: &str) -> Option<&Channel> {
        self.channels.get(key)
    }

    /// Declared keys and their channels, in declaration order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'static str, &Channel)> + '_ {
        self.order.iter().map(|key| (*key, &self.channels[key]))
    }

    pub(crate) fn snapshot(&self) -> StateMap {
        StateMap::from_entries(
            self.order
                .iter()
                .map(|key| (*key, self.channels[key].get()))
                .collect(),
        )
    }
}
