//! The action table and the mutation capability handed to handlers.
//!
//! Actions are stateless descriptors: a name plus a handler that decides
//! how many mutations to issue through [`Setter`]. The [`Actions`]
//! handle is bound once when the store mounts and stays referentially
//! stable for the store's lifetime, so it can be passed around freely
//! without invalidating anything downstream.

use std::any::Any;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::combine::Registry;
use crate::dispatch::{Commit, Request, Transform};
use crate::error::{CombineError, DispatchError};
use crate::slice::StateMap;
use crate::store::StoreInner;

pub(crate) type ActionHandler = Rc<dyn Fn(&ActionCtx) -> Option<Commit>>;

/// Enqueues mutations against one store. Cloneable; late `set` calls
/// (issued after the handler returned, e.g. from a commit continuation)
/// join the queue in issue order.
#[derive(Clone)]
pub struct Setter {
    label: Rc<str>,
    store: Weak<StoreInner>,
}

impl Setter {
    pub(crate) fn new(label: Rc<str>, store: Weak<StoreInner>) -> Self {
        Self { label, store }
    }

    /// Enqueues a whole-state transform. The commit settles with the
    /// post-commit composite state.
    pub fn set(&self, transform: impl FnOnce(&StateMap) -> StateMap + 'static) -> Commit {
        self.dispatch(Transform::Whole {
            apply: Box::new(transform),
        })
    }

    /// Enqueues a transform scoped to one slice. The commit settles with
    /// the post-commit value of that slice only.
    pub fn set_model<T: Clone + 'static>(
        &self,
        key: &'static str,
        transform: impl FnOnce(&T) -> T + 'static,
    ) -> Commit {
        self.dispatch(Transform::Model {
            key,
            apply: Box::new(move |current| {
                current
                    .downcast_ref::<T>()
                    .map(|typed| Rc::new(transform(typed)) as Rc<dyn Any>)
            }),
        })
    }

    fn dispatch(&self, transform: Transform) -> Commit {
        let Some(store) = self.store.upgrade() else {
            log::warn!("[{}] set after the store unmounted; mutation dropped", self.label);
            return Commit::rejected(DispatchError::StoreUnmounted {
                store: self.label.to_string(),
            });
        };
        let commit = Commit::pending();
        store.dispatch(Request {
            transform,
            commit: commit.clone(),
        });
        commit
    }
}

/// The argument bundle an action handler receives: the mutation
/// capability, the payload, this store's own actions, the current
/// composite state, and — under a combined provider — the sibling
/// stores' state and actions.
pub struct ActionCtx {
    label: String,
    setter: Setter,
    actions: Actions,
    payload: Option<Rc<dyn Any>>,
    store: Weak<StoreInner>,
    registry: Option<Registry>,
}

impl ActionCtx {
    /// Whole-state mutation; see [`Setter::set`].
    pub fn set(&self, transform: impl FnOnce(&StateMap) -> StateMap + 'static) -> Commit {
        self.setter.set(transform)
    }

    /// Single-slice mutation; see [`Setter::set_model`].
    pub fn set_model<T: Clone + 'static>(
        &self,
        key: &'static str,
        transform: impl FnOnce(&T) -> T + 'static,
    ) -> Commit {
        self.setter.set_model(key, transform)
    }

    /// An owned setter, for continuations that outlive the handler call.
    pub fn setter(&self) -> Setter {
        self.setter.clone()
    }

    /// Current composite state snapshot.
    pub fn state(&self) -> StateMap {
        match self.store.upgrade() {
            Some(store) => store.snapshot(),
            None => {
                log::warn!("[{}] state read after the store unmounted", self.label);
                StateMap::default()
            }
        }
    }

    /// This store's own actions, for handlers that delegate.
    pub fn actions(&self) -> &Actions {
        &self.actions
    }

    /// The invocation payload, typed at the read site. A missing or
    /// differently-typed payload is a configuration error: diagnostic
    /// plus `None`.
    pub fn payload<P: Clone + 'static>(&self) -> Option<P> {
        let Some(payload) = &self.payload else {
            log::error!("[{}] invoked without the payload it reads", self.label);
            return None;
        };
        match payload.downcast_ref::<P>() {
            Some(typed) => Some(typed.clone()),
            None => {
                log::error!("[{}] payload holds a different type than the handler reads", self.label);
                None
            }
        }
    }

    /// Live composite state of a sibling store mounted under the same
    /// combined provider.
    pub fn model_state(&self, name: &str) -> Result<StateMap, CombineError> {
        match &self.registry {
            Some(registry) => registry.model_state(&self.label, name),
            None => Err(CombineError::NotComposed {
                caller: self.label.clone(),
            }),
        }
    }

    /// Live actions of a sibling store mounted under the same combined
    /// provider.
    pub fn model_actions(&self, name: &str) -> Result<Actions, CombineError> {
        match &self.registry {
            Some(registry) => registry.model_actions(&self.label, name),
            None => Err(CombineError::NotComposed {
                caller: self.label.clone(),
            }),
        }
    }
}

/// The bound action table of one live store.
#[derive(Clone)]
pub struct Actions {
    inner: Rc<ActionsInner>,
}

struct ActionsInner {
    label: Rc<str>,
    order: Vec<&'static str>,
    table: HashMap<&'static str, ActionHandler>,
    store: Weak<StoreInner>,
}

impl Actions {
    pub(crate) fn bind(
        label: Rc<str>,
        defs: &[(&'static str, ActionHandler)],
        store: Weak<StoreInner>,
    ) -> Self {
        let mut order = Vec::with_capacity(defs.len());
        let mut table = HashMap::with_capacity(defs.len());
        for (name, handler) in defs {
            if table.insert(*name, handler.clone()).is_some() {
                log::error!("[{label}] action `{name}` defined twice; keeping the later handler");
            } else {
                order.push(*name);
            }
        }
        Self {
            inner: Rc::new(ActionsInner {
                label,
                order,
                table,
                store,
            }),
        }
    }

    /// Declared action names, in definition order.
    pub fn names(&self) -> &[&'static str] {
        &self.inner.order
    }

    /// Invokes an action without a payload. Returns the handler's value
    /// (a commit derived from the mutations it issued, typically).
    /// Unknown names are a configuration error: diagnostic plus `None`.
    pub fn invoke(&self, name: &str) -> Option<Commit> {
        self.invoke_raw(name, None)
    }

    /// Invokes an action with a payload.
    pub fn invoke_with<P: 'static>(&self, name: &str, payload: P) -> Option<Commit> {
        self.invoke_raw(name, Some(Rc::new(payload) as Rc<dyn Any>))
    }

    fn invoke_raw(&self, name: &str, payload: Option<Rc<dyn Any>>) -> Option<Commit> {
        let Some(handler) = self.inner.table.get(name) else {
            log::error!("[{}] no action named `{name}`", self.inner.label);
            return None;
        };
        let Some(store) = self.inner.store.upgrade() else {
            log::warn!("[{}] action `{name}` invoked after the store unmounted", self.inner.label);
            return None;
        };
        let label = format!("{}.{name}", self.inner.label);
        let ctx = ActionCtx {
            setter: Setter::new(self.inner.label.clone(), self.inner.store.clone()),
            actions: self.clone(),
            payload,
            store: self.inner.store.clone(),
            registry: store.registry().cloned(),
            label,
        };
        handler(&ctx)
    }
}
