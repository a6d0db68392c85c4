//! Derived hooks.
//!
//! A hook is a named computation over the full state, re-evaluated once
//! per completed state transition and exposed through its own channel.
//! Change detection is by `PartialEq` on the computed value: when the
//! recomputation compares equal to the cached value, the cached `Rc` is
//! kept (referential stability for readers) and the hook's subscribers
//! are not notified — a consumer of hook `A` is never woken because an
//! input of hook `B` moved.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::action::{Actions, Setter};
use crate::slice::{Channel, StateMap};

/// What a hook computes from: the post-transition composite state, the
/// store's actions, and the mutation capability.
pub struct HookCtx {
    pub state: StateMap,
    pub actions: Actions,
    pub set: Setter,
}

type Compute = Rc<dyn Fn(&HookCtx) -> Rc<dyn Any>>;
type ValueEq = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// A hook definition: the type-erased compute plus the equality used for
/// change detection, both captured from the typed closure at
/// configuration time.
#[derive(Clone)]
pub(crate) struct HookDef {
    compute: Compute,
    eq: ValueEq,
}

impl HookDef {
    pub(crate) fn new<T: PartialEq + 'static>(compute: impl Fn(&HookCtx) -> T + 'static) -> Self {
        Self {
            compute: Rc::new(move |ctx| Rc::new(compute(ctx)) as Rc<dyn Any>),
            eq: Rc::new(|a, b| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }),
        }
    }
}

struct HookEntry {
    def: HookDef,
    channel: Channel,
}

/// The hook layer of one live store. The entry set is fixed at store
/// construction.
pub(crate) struct Hooks {
    order: Vec<&'static str>,
    entries: HashMap<&'static str, HookEntry>,
}

impl Hooks {
    pub(crate) fn new(label: &str, defs: &[(&'static str, HookDef)]) -> Self {
        let mut order = Vec::with_capacity(defs.len());
        let mut entries = HashMap::with_capacity(defs.len());
        for (key, def) in defs {
            let entry = HookEntry {
                def: def.clone(),
                // Seeded with a unit placeholder until the first compute;
                // `seed` runs before the store is observable.
                channel: Channel::new(Rc::new(())),
            };
            if entries.insert(*key, entry).is_some() {
                log::error!("[{label}] hook `{key}` defined twice; keeping the later compute");
            } else {
                order.push(*key);
            }
        }
        Self { order, entries }
    }

    pub(crate) fn channel(&self, key: &str) -> Option<&Channel> {
        self.entries.get(key).map(|entry| &entry.channel)
    }

    /// Declared hook keys and their channels, in definition order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'static str, &Channel)> + '_ {
        self.order
            .iter()
            .map(|key| (*key, &self.entries[key].channel))
    }

    /// First evaluation, before anyone can have subscribed: writes
    /// without notifying.
    pub(crate) fn seed(&self, ctx: &HookCtx) {
        for key in &self.order {
            let entry = &self.entries[key];
            entry.channel.replace((entry.def.compute)(ctx));
        }
    }

    /// One re-evaluation pass per state transition. Computes run in
    /// definition order; only hooks whose value actually changed notify
    /// their channel.
    pub(crate) fn recompute(&self, ctx: &HookCtx) {
        for key in &self.order {
            let entry = &self.entries[key];
            let previous = entry.channel.get();
            let next = (entry.def.compute)(ctx);
            if (entry.def.eq)(&*previous, &*next) {
                continue;
            }
            entry.channel.replace(next);
            entry.channel.notify();
        }
    }
}
