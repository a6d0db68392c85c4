//! Store construction and mounting.
//!
//! [`create_store`] turns a [`StoreConfig`] into a reusable [`StoreDef`]
//! blueprint. Each call to [`StoreDef::provide`] mounts one live
//! [`Store`] — its own slice registry, bound action table, hook layer
//! and dispatch pipeline — for the duration of the closure, binding
//! every channel into the provider [`Env`] so nested regions can shadow
//! it per slice.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::action::{ActionCtx, ActionHandler, Actions, Setter};
use crate::combine::{Registration, Registry};
use crate::dispatch::{Commit, Pipeline, Request, Transform};
use crate::env::{Bindings, Env, Slot, StoreId};
use crate::error::DispatchError;
use crate::hook::{HookCtx, HookDef, Hooks};
use crate::scope::{Scope, current_scope};
use crate::slice::{Channel, Slices, StateMap, Subscription};

thread_local! {
    static NEXT_STORE_ID: Cell<StoreId> = const { Cell::new(1) };
}

/// Declares a store: its model slices, actions, and derived hooks. All
/// three tables are frozen once the config is handed to
/// [`create_store`].
pub struct StoreConfig {
    name: String,
    models: Vec<(&'static str, Rc<dyn Any>)>,
    actions: Vec<(&'static str, ActionHandler)>,
    hooks: Vec<(&'static str, HookDef)>,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            models: Vec::new(),
            actions: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Declares one model slice with its initial value.
    pub fn model<T: 'static>(mut self, key: &'static str, initial: T) -> Self {
        self.models.push((key, Rc::new(initial)));
        self
    }

    /// Declares one action. The handler receives the full argument
    /// bundle and returns whatever commit it wants the invoker to see.
    pub fn action(
        mut self,
        name: &'static str,
        handler: impl Fn(&ActionCtx) -> Option<Commit> + 'static,
    ) -> Self {
        self.actions.push((name, Rc::new(handler)));
        self
    }

    /// Declares one derived hook. `T`'s `PartialEq` is the change
    /// detector: equal recomputations keep the cached value and notify
    /// nobody.
    pub fn hook<T: PartialEq + 'static>(
        mut self,
        key: &'static str,
        compute: impl Fn(&HookCtx) -> T + 'static,
    ) -> Self {
        self.hooks.push((key, HookDef::new(compute)));
        self
    }
}

/// Builds the reusable blueprint. A config without models is almost
/// certainly a wiring mistake; the store still constructs (degraded, not
/// fatal) so a mounted tree keeps rendering.
pub fn create_store(config: StoreConfig) -> StoreDef {
    if config.models.is_empty() {
        log::error!(
            "store `{}` declared without models; every read will come up empty",
            config.name
        );
    }
    let id = NEXT_STORE_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    StoreDef {
        inner: Rc::new(DefInner { id, config }),
    }
}

/// A store blueprint. Cloning shares the definition; every mount gets
/// fresh state.
#[derive(Clone)]
pub struct StoreDef {
    inner: Rc<DefInner>,
}

struct DefInner {
    id: StoreId,
    config: StoreConfig,
}

pub(crate) struct StoreInner {
    label: Rc<str>,
    weak_self: Weak<StoreInner>,
    slices: Slices,
    hooks: Hooks,
    pipeline: Pipeline,
    state_channel: Channel,
    pub(crate) actions: Actions,
    registry: Option<Registry>,
}

/// One live, mounted store instance.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    fn instantiate(def: &StoreDef, registry: Option<Registry>) -> Self {
        let config = &def.inner.config;
        let label: Rc<str> = Rc::from(config.name.as_str());
        let inner = Rc::new_cyclic(|weak: &Weak<StoreInner>| {
            let slices = Slices::new(&config.models);
            let state_channel = Channel::new(Rc::new(slices.snapshot()));
            StoreInner {
                label: label.clone(),
                weak_self: weak.clone(),
                hooks: Hooks::new(&config.name, &config.hooks),
                pipeline: Pipeline::new(),
                actions: Actions::bind(label.clone(), &config.actions, weak.clone()),
                slices,
                state_channel,
                registry,
            }
        });
        inner.hooks.seed(&inner.hook_ctx());
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.label
    }

    /// Current value of one slice. Undeclared keys and type mismatches
    /// are configuration errors: diagnostic plus `None`.
    pub fn model_state<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let Some(channel) = self.inner.slices.channel(key) else {
            log::error!("[{}] read of undeclared model `{key}`", self.inner.label);
            return None;
        };
        let value = channel.get();
        match value.downcast_ref::<T>() {
            Some(typed) => Some(typed.clone()),
            None => {
                log::error!(
                    "[{}] model `{key}` holds a different type than requested",
                    self.inner.label
                );
                None
            }
        }
    }

    /// Subscribes to one slice only; mutations of other keys never fire
    /// this callback. Dropping the guard unsubscribes.
    pub fn watch_model<T: 'static>(
        &self,
        key: &str,
        f: impl Fn(&T) + 'static,
    ) -> Subscription {
        let Some(channel) = self.inner.slices.channel(key) else {
            log::error!("[{}] watch of undeclared model `{key}`", self.inner.label);
            return Subscription::inert();
        };
        channel.subscribe_typed(format!("[{}] model `{key}`", self.inner.label), f)
    }

    /// The full composite state. Provided for tooling and hooks; it
    /// subscribes to every transition, so ordinary consumers should
    /// prefer [`Store::model_state`].
    pub fn state(&self) -> StateMap {
        self.inner.snapshot()
    }

    /// Subscribes to every state transition.
    pub fn watch_state(&self, f: impl Fn(&StateMap) + 'static) -> Subscription {
        self.inner
            .state_channel
            .subscribe_typed(format!("[{}] state", self.inner.label), f)
    }

    /// The bound action table. The same handle for the store's whole
    /// lifetime, so passing it down a tree never invalidates consumers.
    pub fn actions(&self) -> Actions {
        self.inner.actions.clone()
    }

    /// Latest computed value of a derived hook.
    pub fn hook_return<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let Some(channel) = self.inner.hooks.channel(key) else {
            log::error!("[{}] read of undeclared hook `{key}`", self.inner.label);
            return None;
        };
        let value = channel.get();
        match value.downcast_ref::<T>() {
            Some(typed) => Some(typed.clone()),
            None => {
                log::error!(
                    "[{}] hook `{key}` computes a different type than requested",
                    self.inner.label
                );
                None
            }
        }
    }

    /// Subscribes to one hook's output; fires only when the recomputed
    /// value is unequal to the cached one.
    pub fn watch_hook<T: 'static>(&self, key: &str, f: impl Fn(&T) + 'static) -> Subscription {
        let Some(channel) = self.inner.hooks.channel(key) else {
            log::error!("[{}] watch of undeclared hook `{key}`", self.inner.label);
            return Subscription::inert();
        };
        channel.subscribe_typed(format!("[{}] hook `{key}`", self.inner.label), f)
    }
}

impl StoreInner {
    pub(crate) fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    pub(crate) fn snapshot(&self) -> StateMap {
        self.slices.snapshot()
    }

    fn setter(&self) -> Setter {
        Setter::new(self.label.clone(), self.weak_self.clone())
    }

    fn hook_ctx(&self) -> HookCtx {
        HookCtx {
            state: self.snapshot(),
            actions: self.actions.clone(),
            set: self.setter(),
        }
    }

    /// Entry point for every mutation. Appends to the FIFO queue and
    /// drains it unless a drain is already running further up the stack
    /// (re-entrant `set` from a subscriber or continuation).
    pub(crate) fn dispatch(&self, request: Request) {
        self.pipeline.push(request);
        if !self.pipeline.begin_drain() {
            return;
        }
        while let Some(request) = self.pipeline.pop() {
            self.apply(request);
        }
        self.pipeline.end_drain();
    }

    /// Applies one request: write the registry, notify the touched
    /// keys, run the transition tail (composite channel + hooks), then
    /// settle the commit — in exactly that order, so a settled commit is
    /// always observable.
    fn apply(&self, request: Request) {
        let Request { transform, commit } = request;
        match transform {
            Transform::Model { key, apply } => {
                let Some(channel) = self.slices.channel(key) else {
                    log::error!(
                        "[{}] set targets unknown model `{key}`; mutation dropped",
                        self.label
                    );
                    commit.settle(Err(DispatchError::UnknownModel {
                        store: self.label.to_string(),
                        key,
                    }));
                    return;
                };
                let current = channel.get();
                let Some(next) = apply(&current) else {
                    log::error!(
                        "[{}] transform for model `{key}` expects a different type; mutation dropped",
                        self.label
                    );
                    commit.settle(Err(DispatchError::ModelTypeMismatch {
                        store: self.label.to_string(),
                        key,
                    }));
                    return;
                };
                // Pointer-identical result counts as "key untouched".
                let changed = !Rc::ptr_eq(&current, &next);
                channel.replace(next.clone());
                if changed {
                    channel.notify();
                    self.after_transition();
                }
                commit.settle(Ok(next));
            }
            Transform::Whole { apply } => {
                let before = self.snapshot();
                let after = apply(&before);
                let mut dirty: SmallVec<[&'static str; 4]> = SmallVec::new();
                for (key, next) in after.entries() {
                    let key = *key;
                    let Some(channel) = self.slices.channel(key) else {
                        continue;
                    };
                    if !Rc::ptr_eq(&channel.get(), next) {
                        channel.replace(next.clone());
                        dirty.push(key);
                    }
                }
                // All writes land before the first notification.
                for key in &dirty {
                    if let Some(channel) = self.slices.channel(key) {
                        channel.notify();
                    }
                }
                if !dirty.is_empty() {
                    self.after_transition();
                }
                commit.settle(Ok(Rc::new(self.snapshot()) as Rc<dyn Any>));
            }
        }
    }

    /// Tail of one state transition: refresh the composite channel, then
    /// re-evaluate hooks once.
    fn after_transition(&self) {
        let snapshot = self.snapshot();
        self.state_channel.replace(Rc::new(snapshot.clone()));
        self.state_channel.notify();
        self.hooks.recompute(&HookCtx {
            state: snapshot,
            actions: self.actions.clone(),
            set: self.setter(),
        });
    }
}

impl StoreDef {
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Mounts a fresh store for the duration of `f`. The store's
    /// channels are bound into `env`; the scope (and anything registered
    /// into it) is torn down when `f` returns.
    pub fn provide<R>(&self, env: &Env, f: impl FnOnce(&Store) -> R) -> R {
        self.provide_inner(env, None, f)
    }

    /// Like [`StoreDef::provide`], but registers the store into a
    /// cross-store registry for its mounted lifetime. Used by
    /// [`combine_models`](crate::combine_models); exposed for tests and
    /// custom composition roots.
    pub fn provide_composed<R>(
        &self,
        env: &Env,
        registry: &Registry,
        f: impl FnOnce(&Store) -> R,
    ) -> R {
        self.provide_inner(env, Some(registry.clone()), f)
    }

    fn provide_inner<R>(
        &self,
        env: &Env,
        registry: Option<Registry>,
        f: impl FnOnce(&Store) -> R,
    ) -> R {
        let store = Store::instantiate(self, registry.clone());
        let scope = match current_scope() {
            Some(parent) => parent.child(),
            None => Scope::new(),
        };
        if let Some(registry) = registry {
            let weak = Rc::downgrade(&store.inner);
            let state_weak = weak.clone();
            let registration = Registration::new(
                Rc::new(move || state_weak.upgrade().map(|inner| inner.snapshot())),
                Rc::new(move || weak.upgrade().map(|inner| inner.actions.clone())),
            );
            let dispose = registry.register(self.name(), registration);
            scope.add_dispose(dispose);
        }
        let frame = env.push(self.bindings(&store));
        let result = scope.run(|| f(&store));
        drop(frame);
        scope.dispose();
        result
    }

    fn bindings(&self, store: &Store) -> Bindings {
        let id = self.inner.id;
        let mut bindings: Bindings = HashMap::new();
        for (key, channel) in store.inner.slices.iter() {
            bindings.insert((id, Slot::Model(key)), Rc::new(channel.clone()) as Rc<dyn Any>);
        }
        for (key, channel) in store.inner.hooks.iter() {
            bindings.insert((id, Slot::Hook(key)), Rc::new(channel.clone()) as Rc<dyn Any>);
        }
        bindings.insert(
            (id, Slot::Actions),
            Rc::new(store.inner.actions.clone()) as Rc<dyn Any>,
        );
        bindings.insert(
            (id, Slot::State),
            Rc::new(store.inner.state_channel.clone()) as Rc<dyn Any>,
        );
        bindings
    }

    fn channel(&self, env: &Env, slot: Slot) -> Option<Channel> {
        match env.lookup(self.inner.id, slot) {
            Some(binding) => match binding.downcast_ref::<Channel>() {
                Some(channel) => Some(channel.clone()),
                None => {
                    log::error!(
                        "[{}] environment binding for {slot:?} holds an unexpected type",
                        self.name()
                    );
                    None
                }
            },
            None => {
                match slot {
                    Slot::Model(key) if !self.declares_model(key) => log::error!(
                        "[{}] `{key}` was not declared as a model of this store",
                        self.name()
                    ),
                    Slot::Hook(key) if !self.declares_hook(key) => log::error!(
                        "[{}] `{key}` was not declared as a hook of this store",
                        self.name()
                    ),
                    _ => log::error!(
                        "[{}] no enclosing provider for this store in the environment",
                        self.name()
                    ),
                }
                None
            }
        }
    }

    fn declares_model(&self, key: &str) -> bool {
        self.inner.config.models.iter().any(|(k, _)| *k == key)
    }

    fn declares_hook(&self, key: &str) -> bool {
        self.inner.config.hooks.iter().any(|(k, _)| *k == key)
    }

    /// Reads one slice through the nearest enclosing provider.
    pub fn use_model_state<T: Clone + 'static>(&self, env: &Env, key: &'static str) -> Option<T> {
        let channel = self.channel(env, Slot::Model(key))?;
        let value = channel.get();
        match value.downcast_ref::<T>() {
            Some(typed) => Some(typed.clone()),
            None => {
                log::error!(
                    "[{}] model `{key}` holds a different type than requested",
                    self.name()
                );
                None
            }
        }
    }

    /// Subscribes to one slice through the nearest enclosing provider.
    /// Misconfigured lookups return an inert guard.
    pub fn subscribe_model<T: 'static>(
        &self,
        env: &Env,
        key: &'static str,
        f: impl Fn(&T) + 'static,
    ) -> Subscription {
        match self.channel(env, Slot::Model(key)) {
            Some(channel) => {
                channel.subscribe_typed(format!("[{}] model `{key}`", self.name()), f)
            }
            None => Subscription::inert(),
        }
    }

    /// The nearest enclosing provider's action table.
    pub fn use_actions(&self, env: &Env) -> Option<Actions> {
        match env.lookup(self.inner.id, Slot::Actions) {
            Some(binding) => binding.downcast_ref::<Actions>().cloned().or_else(|| {
                log::error!(
                    "[{}] environment binding for actions holds an unexpected type",
                    self.name()
                );
                None
            }),
            None => {
                log::error!(
                    "[{}] no enclosing provider for this store in the environment",
                    self.name()
                );
                None
            }
        }
    }

    /// The nearest enclosing provider's full composite state.
    pub fn use_store_state(&self, env: &Env) -> Option<StateMap> {
        let channel = self.channel(env, Slot::State)?;
        let value = channel.get();
        value.downcast_ref::<StateMap>().cloned()
    }

    /// Subscribes to every state transition of the nearest enclosing
    /// provider.
    pub fn subscribe_state(&self, env: &Env, f: impl Fn(&StateMap) + 'static) -> Subscription {
        match self.channel(env, Slot::State) {
            Some(channel) => channel.subscribe_typed(format!("[{}] state", self.name()), f),
            None => Subscription::inert(),
        }
    }

    /// Reads one hook's latest value through the nearest enclosing
    /// provider.
    pub fn use_hook_return<T: Clone + 'static>(&self, env: &Env, key: &'static str) -> Option<T> {
        let channel = self.channel(env, Slot::Hook(key))?;
        let value = channel.get();
        match value.downcast_ref::<T>() {
            Some(typed) => Some(typed.clone()),
            None => {
                log::error!(
                    "[{}] hook `{key}` computes a different type than requested",
                    self.name()
                );
                None
            }
        }
    }

    /// Subscribes to one hook's output through the nearest enclosing
    /// provider.
    pub fn subscribe_hook<T: 'static>(
        &self,
        env: &Env,
        key: &'static str,
        f: impl Fn(&T) + 'static,
    ) -> Subscription {
        match self.channel(env, Slot::Hook(key)) {
            Some(channel) => channel.subscribe_typed(format!("[{}] hook `{key}`", self.name()), f),
            None => Subscription::inert(),
        }
    }
}
