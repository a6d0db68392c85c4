//! Provider scopes.
//!
//! A [`Scope`] owns everything that must be torn down when a provider
//! region unmounts: cross-store deregistrations, effect cleanups, and any
//! disposers user code registered while the region was live. Scopes nest;
//! disposing a scope disposes its children first, then runs its own
//! disposers in reverse registration order.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

thread_local! {
    static CURRENT_SCOPE: RefCell<Option<Weak<ScopeInner>>> = const { RefCell::new(None) };
}

/// A cleanup callback that runs at most once.
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// A disposer that does nothing. Returned where registration was
    /// refused but the caller still expects a guard.
    pub fn noop() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Safe to call multiple times.
    pub fn run(&self) {
        if let Some(f) = self.0.borrow_mut().take() {
            f()
        }
    }
}

pub struct Scope {
    inner: Rc<ScopeInner>,
}

#[derive(Default)]
struct ScopeInner {
    disposers: RefCell<Vec<Dispose>>,
    children: RefCell<Vec<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner::default()),
        }
    }

    /// Runs `f` with this scope as the current scope, restoring the
    /// previous one afterwards.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        CURRENT_SCOPE.with(|current| {
            let prev = current.borrow().clone();
            *current.borrow_mut() = Some(Rc::downgrade(&self.inner));
            let result = f();
            *current.borrow_mut() = prev;
            result
        })
    }

    pub fn add_disposer(&self, disposer: impl FnOnce() + 'static) {
        self.inner
            .disposers
            .borrow_mut()
            .push(Dispose::new(disposer));
    }

    pub fn add_dispose(&self, dispose: Dispose) {
        self.inner.disposers.borrow_mut().push(dispose);
    }

    pub fn child(&self) -> Scope {
        let child = Scope::new();
        self.inner.children.borrow_mut().push(child.clone());
        child
    }

    /// Tears the scope down: children first, then own disposers, newest
    /// first.
    pub fn dispose(self) {
        self.inner.dispose_inner();
    }
}

impl ScopeInner {
    fn dispose_inner(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children.into_iter().rev() {
            child.dispose();
        }
        let disposers = std::mem::take(&mut *self.disposers.borrow_mut());
        for disposer in disposers.into_iter().rev() {
            disposer.run();
        }
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        // Last handle gone without an explicit dispose: still run cleanups.
        self.dispose_inner();
    }
}

pub fn current_scope() -> Option<Scope> {
    CURRENT_SCOPE.with(|current| {
        current
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade().map(|inner| Scope { inner }))
    })
}

/// Registers a cleanup with the current scope, to run when the enclosing
/// provider region unmounts. Outside any scope the cleanup runs never;
/// a diagnostic is emitted instead of leaking silently.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    match current_scope() {
        Some(scope) => scope.add_disposer(f),
        None => log::warn!("on_cleanup called outside a provider scope; cleanup will not run"),
    }
}

/// Runs `f` now and ties the returned [`Dispose`] to the current scope.
pub fn effect<F>(f: F) -> Dispose
where
    F: FnOnce() -> Dispose + 'static,
{
    let d = f();
    if let Some(scope) = current_scope() {
        scope.add_dispose(d.clone());
    }
    d
}
