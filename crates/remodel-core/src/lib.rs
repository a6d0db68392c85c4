//! # Models, Actions, and Hooks
//!
//! Remodel partitions one logical application state into named model
//! slices, each with its own subscription channel, so a consumer of one
//! slice is never re-evaluated because an unrelated slice moved. Three
//! main pieces:
//!
//! - **Models** — named slices of state, declared once, mutated only
//!   through the dispatch pipeline.
//! - **Actions** — named operations that issue mutations via `set` and
//!   get back a [`Commit`] that settles after the new value is
//!   observable.
//! - **Hooks** — derived values recomputed once per state transition,
//!   each exposed through its own channel with `PartialEq` change
//!   detection.
//!
//! ## A counter store
//!
//! ```rust
//! use remodel_core::prelude::*;
//!
//! let counter = create_store(
//!     StoreConfig::new("counter")
//!         .model("count", 0i32)
//!         .action("increment", |ctx| {
//!             Some(ctx.set_model("count", |c: &i32| c + 1))
//!         }),
//! );
//!
//! let env = Env::new();
//! counter.provide(&env, |store| {
//!     let commit = store.actions().invoke("increment").unwrap();
//!     assert_eq!(commit.value::<i32>(), Some(1));
//!     assert_eq!(store.model_state::<i32>("count"), Some(1));
//! });
//! ```
//!
//! ## The commit contract
//!
//! Every `set` enqueues exactly one mutation into a strict FIFO pipeline
//! and returns a [`Commit`]. The commit settles only after the new value
//! has been written into the slice registry and subscribers have been
//! notified — so issuing a second `set` after the first settles always
//! observes the first already applied:
//!
//! ```rust
//! use remodel_core::prelude::*;
//!
//! let def = create_store(
//!     StoreConfig::new("counter")
//!         .model("count", 0i32)
//!         .action("add_twice", |ctx| {
//!             let first = ctx.set_model("count", |c: &i32| c + 1);
//!             // read-your-own-write: the second transform sees the first
//!             let second = ctx.set_model("count", |c: &i32| c + 1);
//!             let _ = first;
//!             Some(second)
//!         }),
//! );
//!
//! let env = Env::new();
//! def.provide(&env, |store| {
//!     let commit = store.actions().invoke("add_twice").unwrap();
//!     assert_eq!(commit.value::<i32>(), Some(2));
//! });
//! ```
//!
//! ## Derived hooks
//!
//! ```rust
//! use remodel_core::prelude::*;
//!
//! let def = create_store(
//!     StoreConfig::new("counter")
//!         .model("count", 1i32)
//!         .hook("doubled", |ctx: &HookCtx| {
//!             ctx.state.get::<i32>("count").unwrap_or(0) * 2
//!         })
//!         .action("increment", |ctx| {
//!             Some(ctx.set_model("count", |c: &i32| c + 1))
//!         }),
//! );
//!
//! let env = Env::new();
//! def.provide(&env, |store| {
//!     assert_eq!(store.hook_return::<i32>("doubled"), Some(2));
//!     store.actions().invoke("increment");
//!     assert_eq!(store.hook_return::<i32>("doubled"), Some(4));
//! });
//! ```
//!
//! ## Composition
//!
//! [`combine_models`] nests several stores under one provider and wires
//! them to a shared [`Registry`], so an action in one store can read a
//! sibling's live state with `ctx.model_state("sibling")` or invoke its
//! actions with `ctx.model_actions("sibling")`. Asking for a store that
//! is not currently mounted is a structural fault ([`CombineError`]),
//! returned to the caller rather than crashing anything.
//!
//! ## Providers and environments
//!
//! Mounting happens against an explicit [`Env`]: a lexical stack of
//! binding frames with nearest-enclosing lookup. Nested provides of the
//! same definition shadow the outer mount per slice, the way nested
//! value providers shadow in a rendered tree; the host UI integration
//! only needs to forward its own provider scopes onto `Env` frames and
//! re-render on [`Subscription`] callbacks.

pub mod action;
pub mod combine;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod hook;
pub mod prelude;
pub mod scope;
pub mod slice;
pub mod store;
pub mod tests;

pub use action::{ActionCtx, Actions, Setter};
pub use combine::{Combined, Registration, Registry, combine_models};
pub use dispatch::Commit;
pub use env::{Env, Slot};
pub use error::{CombineError, DispatchError};
pub use hook::HookCtx;
pub use scope::{Dispose, Scope, current_scope, effect, on_cleanup};
pub use slice::{StateMap, Subscription};
pub use store::{Store, StoreConfig, StoreDef, create_store};
