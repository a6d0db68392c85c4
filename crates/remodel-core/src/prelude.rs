//! Convenience re-exports for store authors.

pub use crate::action::{ActionCtx, Actions, Setter};
pub use crate::combine::{Combined, Registry, combine_models};
pub use crate::dispatch::Commit;
pub use crate::env::Env;
pub use crate::error::{CombineError, DispatchError};
pub use crate::hook::HookCtx;
pub use crate::scope::{Dispose, on_cleanup};
pub use crate::slice::{StateMap, Subscription};
pub use crate::store::{Store, StoreConfig, StoreDef, create_store};
