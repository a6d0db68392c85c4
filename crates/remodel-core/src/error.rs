use thiserror::Error;

/// Why a queued mutation was dropped instead of applied.
///
/// A rejected request settles its [`Commit`](crate::Commit) with one of
/// these; the pipeline itself keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("store `{store}` has no model `{key}`")]
    UnknownModel { store: String, key: &'static str },

    #[error("model `{key}` in store `{store}` holds a different type than the transform expects")]
    ModelTypeMismatch { store: String, key: &'static str },

    #[error("store `{store}` was unmounted before the mutation could be applied")]
    StoreUnmounted { store: String },
}

/// Structural wiring faults raised by the cross-store registry.
///
/// Unlike [`DispatchError`], these are returned to the calling action or
/// hook directly; the caller decides how to degrade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombineError {
    #[error("no store named `{name}` is registered (requested by `{caller}`)")]
    NotRegistered { caller: String, name: String },

    #[error("store `{caller}` is not mounted under a combined provider")]
    NotComposed { caller: String },
}
