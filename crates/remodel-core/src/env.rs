//! Provider environment.
//!
//! Mounting a store binds its channels into an [`Env`]: an explicit
//! lexical stack of binding frames resolved by nearest-enclosing lookup.
//! Nested provider regions push their own frames, so an inner mount of
//! the same store definition shadows the outer one independently per
//! slice, the way nested value providers shadow in a rendered tree.
//!
//! The environment is a passed-down handle, not a process-wide global:
//! two independent trees in one test each get their own `Env`.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Identifies one mounted facet of a store definition inside an [`Env`]
/// frame. Keys are fixed at store construction, so the binding set of a
/// frame never changes while it is on the stack.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Slot {
    /// One model slice's subscription channel.
    Model(&'static str),
    /// One derived hook's subscription channel.
    Hook(&'static str),
    /// The store's action table handle.
    Actions,
    /// The composite-state subscription channel.
    State,
}

/// Unique per store definition; disambiguates bindings of unrelated
/// stores that happen to share slice names.
pub(crate) type StoreId = u64;

pub(crate) type Bindings = HashMap<(StoreId, Slot), Rc<dyn Any>>;

struct Frame {
    id: u64,
    bindings: Bindings,
}

#[derive(Default)]
struct EnvInner {
    frames: Vec<Frame>,
    next_frame: u64,
}

/// The scoped value environment a provider mounts into.
#[derive(Clone, Default)]
pub struct Env {
    inner: Rc<RefCell<EnvInner>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live frames; mostly useful in tests.
    pub fn depth(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    pub(crate) fn push(&self, bindings: Bindings) -> FrameGuard {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_frame;
        inner.next_frame += 1;
        inner.frames.push(Frame { id, bindings });
        FrameGuard {
            env: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Nearest-enclosing lookup.
    pub(crate) fn lookup(&self, store: StoreId, slot: Slot) -> Option<Rc<dyn Any>> {
        let inner = self.inner.borrow();
        inner
            .frames
            .iter()
            .rev()
            .find_map(|frame| frame.bindings.get(&(store, slot)).cloned())
    }
}

/// Pops its frame when dropped. Frames are removed by id, so a guard
/// dropped out of stack order cannot evict another region's bindings.
pub(crate) struct FrameGuard {
    env: Weak<RefCell<EnvInner>>,
    id: u64,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.env.upgrade() {
            inner.borrow_mut().frames.retain(|frame| frame.id != self.id);
        }
    }
}
