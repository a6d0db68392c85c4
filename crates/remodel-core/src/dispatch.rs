//! The dispatch pipeline and the asynchronous commit contract.
//!
//! Every mutation — whole-state or single-slice — travels through one
//! strict FIFO queue per store. Requests are applied one at a time,
//! never nested and never reordered: a `set` issued from inside a
//! subscriber callback or a commit continuation is appended to the same
//! queue and applied by the in-flight drain loop after everything ahead
//! of it.
//!
//! Each request settles a [`Commit`] only after the new value has been
//! written into the slice registry, key subscribers have been notified,
//! and derived hooks have re-evaluated — so a settled commit's value is
//! guaranteed to be observable by any subsequent read.
//!
//! A transform that cannot apply (unknown key, or the slice holds a
//! different type than the transform expects) is dropped with a
//! diagnostic and its commit is *rejected* with a
//! [`DispatchError`] — a pending-forever commit is not part of the
//! contract. The pipeline then continues with the next request.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::DispatchError;
use crate::slice::StateMap;

/// One queued mutation.
pub(crate) struct Request {
    pub transform: Transform,
    pub commit: Commit,
}

pub(crate) enum Transform {
    /// Scoped to a single slice. `apply` returns `None` when the stored
    /// value does not downcast to the transform's expected type.
    Model {
        key: &'static str,
        apply: Box<dyn FnOnce(&Rc<dyn Any>) -> Option<Rc<dyn Any>>>,
    },
    /// A transform over the full composite state.
    Whole {
        apply: Box<dyn FnOnce(&StateMap) -> StateMap>,
    },
}

type CommitResult = Result<Rc<dyn Any>, DispatchError>;

/// The future half of a `set` call.
///
/// Settles with the post-commit value at the affected scope: the new
/// slice value for a scoped `set`, or an `Rc<StateMap>` snapshot for a
/// whole-state `set`. Cheap to clone; all clones observe the same
/// settlement.
#[derive(Clone)]
pub struct Commit {
    inner: Rc<RefCell<CommitInner>>,
}

#[derive(Default)]
struct CommitInner {
    outcome: Option<CommitResult>,
    waiters: Vec<Box<dyn FnOnce(&CommitResult)>>,
}

impl Commit {
    pub(crate) fn pending() -> Self {
        Self {
            inner: Rc::new(RefCell::new(CommitInner::default())),
        }
    }

    pub(crate) fn rejected(err: DispatchError) -> Self {
        let commit = Self::pending();
        commit.settle(Err(err));
        commit
    }

    pub fn is_settled(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    /// `None` while still queued.
    pub fn result(&self) -> Option<CommitResult> {
        self.inner.borrow().outcome.clone()
    }

    /// The settled value, downcast to `T`. `None` if pending, rejected,
    /// or settled with a different type.
    pub fn value<T: Clone + 'static>(&self) -> Option<T> {
        match self.result() {
            Some(Ok(value)) => value.downcast_ref::<T>().cloned(),
            _ => None,
        }
    }

    /// The settled composite state of a whole-state `set`.
    pub fn state(&self) -> Option<StateMap> {
        self.value::<StateMap>()
    }

    pub fn error(&self) -> Option<DispatchError> {
        match self.result() {
            Some(Err(err)) => Some(err),
            _ => None,
        }
    }

    /// Registers a continuation; runs immediately when already settled.
    /// Continuations may issue further `set` calls — those are queued
    /// behind any in-flight drain, in issue order.
    pub fn on_settle(&self, f: impl FnOnce(&CommitResult) + 'static) {
        let settled = self.inner.borrow().outcome.clone();
        match settled {
            Some(result) => f(&result),
            None => self.inner.borrow_mut().waiters.push(Box::new(f)),
        }
    }

    pub(crate) fn settle(&self, result: CommitResult) {
        let waiters = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                log::error!("commit settled twice; second settlement ignored");
                return;
            }
            inner.outcome = Some(result.clone());
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            waiter(&result);
        }
    }
}

/// The per-store request queue. Draining is driven by the store, which
/// owns the registry the requests apply to; the pipeline only guarantees
/// FIFO order and non-reentrancy.
pub(crate) struct Pipeline {
    queue: RefCell<VecDeque<Request>>,
    draining: Cell<bool>,
}

impl Pipeline {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        }
    }

    pub(crate) fn push(&self, request: Request) {
        self.queue.borrow_mut().push_back(request);
    }

    /// Claims the drain loop. Returns `false` when a drain is already in
    /// flight higher up the stack — the request just pushed will be
    /// applied by that drain, in order.
    pub(crate) fn begin_drain(&self) -> bool {
        if self.draining.get() {
            return false;
        }
        self.draining.set(true);
        true
    }

    pub(crate) fn end_drain(&self) {
        self.draining.set(false);
    }

    pub(crate) fn pop(&self) -> Option<Request> {
        self.queue.borrow_mut().pop_front()
    }
}
