//! Store composition.
//!
//! [`combine_models`] nests several independently-defined stores under
//! one provider and wires them to a shared [`Registry`], so each store's
//! actions can read the others' live state and invoke their actions.
//!
//! The registry is an explicit handle owned by the composing root and
//! injected into each child at mount — never a process-wide singleton —
//! which keeps two composed trees in one test fully independent.
//! Composition holds no state of its own: it only routes registration
//! events and accessor calls.
//!
//! Per child store the registry walks
//! `UNREGISTERED → REGISTERED → UNREGISTERED`: registering returns a
//! [`Dispose`] that the mount scope runs on unmount. Accessor calls for
//! a name that is not currently registered are a structural wiring fault
//! and come back as [`CombineError`] — the caller's render keeps
//! running.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::action::Actions;
use crate::env::Env;
use crate::error::CombineError;
use crate::scope::Dispose;
use crate::slice::StateMap;
use crate::store::{Store, StoreDef};

/// Live accessors one mounted store contributes to the registry. Both
/// closures read through the store, so results are always current —
/// never a snapshot taken at registration time.
#[derive(Clone)]
pub struct Registration {
    get_state: Rc<dyn Fn() -> Option<StateMap>>,
    get_actions: Rc<dyn Fn() -> Option<Actions>>,
}

impl Registration {
    pub(crate) fn new(
        get_state: Rc<dyn Fn() -> Option<StateMap>>,
        get_actions: Rc<dyn Fn() -> Option<Actions>>,
    ) -> Self {
        Self {
            get_state,
            get_actions,
        }
    }
}

/// The shared cross-store table, keyed by store name.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Rc<RefCell<HashMap<String, Registration>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a store under `name`; the returned [`Dispose`]
    /// deregisters it. At most one live registration per name: a
    /// duplicate is refused (the first registration wins) and the
    /// returned disposer is a no-op, so running it cannot evict the
    /// original.
    pub fn register(&self, name: &str, registration: Registration) -> Dispose {
        let mut table = self.inner.borrow_mut();
        if table.contains_key(name) {
            log::error!("store `{name}` is already registered; keeping the existing registration");
            return Dispose::noop();
        }
        table.insert(name.to_string(), registration);
        let weak = Rc::downgrade(&self.inner);
        let name = name.to_string();
        Dispose::new(move || {
            if let Some(table) = weak.upgrade() {
                table.borrow_mut().remove(&name);
            }
        })
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inner.borrow().contains_key(name)
    }

    /// Currently registered store names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.inner.borrow().keys().cloned().collect()
    }

    /// Live composite state of the store registered under `name`.
    pub fn model_state(&self, caller: &str, name: &str) -> Result<StateMap, CombineError> {
        let registration = self.inner.borrow().get(name).cloned();
        let Some(registration) = registration else {
            return Err(self.not_registered(caller, name));
        };
        (registration.get_state)().ok_or_else(|| self.not_registered(caller, name))
    }

    /// Live action table of the store registered under `name`.
    pub fn model_actions(&self, caller: &str, name: &str) -> Result<Actions, CombineError> {
        let registration = self.inner.borrow().get(name).cloned();
        let Some(registration) = registration else {
            return Err(self.not_registered(caller, name));
        };
        (registration.get_actions)().ok_or_else(|| self.not_registered(caller, name))
    }

    fn not_registered(&self, caller: &str, name: &str) -> CombineError {
        log::warn!("`{caller}` asked for store `{name}`, which is not registered");
        CombineError::NotRegistered {
            caller: caller.to_string(),
            name: name.to_string(),
        }
    }
}

/// Composes several store definitions into one provider.
pub fn combine_models(defs: impl IntoIterator<Item = StoreDef>) -> Combined {
    let defs: Vec<StoreDef> = defs.into_iter().collect();
    if defs.is_empty() {
        log::error!("combine_models called with no stores");
    }
    Combined { defs }
}

/// The combined provider. Mounts each child's provider nested inside the
/// previous one (so all children are live while `f` runs), shares one
/// fresh [`Registry`] across them, and tears registrations down in
/// reverse mount order when the provide closure returns.
pub struct Combined {
    defs: Vec<StoreDef>,
}

impl Combined {
    pub fn defs(&self) -> &[StoreDef] {
        &self.defs
    }

    pub fn provide<R>(&self, env: &Env, f: impl FnOnce(&Registry) -> R) -> R {
        let registry = Registry::new();
        self.mount_from(env, &registry, 0, f)
    }

    fn mount_from<R, F>(&self, env: &Env, registry: &Registry, index: usize, f: F) -> R
    where
        F: FnOnce(&Registry) -> R,
    {
        match self.defs.get(index) {
            None => f(registry),
            Some(def) => def.provide_composed(env, registry, |_store: &Store| {
                self.mount_from(env, registry, index + 1, f)
            }),
        }
    }
}
