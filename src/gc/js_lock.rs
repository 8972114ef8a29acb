//! JsLock - RAII tracking of engine entries on the lock-owning thread.
//!
//! The context mutex is reentrant: a host callback invoked from script runs
//! on the thread that already holds the lock and may call back into the same
//! context. Only the outermost entry creates a `v8::Locker`; nested entries
//! reuse the isolate registered here.

use std::cell::Cell;
use std::ptr;

/// Entry bookkeeping stored inside the context mutex.
///
/// Only the thread holding the context lock reads or writes it.
pub(crate) struct LockState {
    depth: Cell<usize>,
    isolate: Cell<*mut v8::Isolate>,
}

impl LockState {
    pub fn new() -> Self {
        Self {
            depth: Cell::new(0),
            isolate: Cell::new(ptr::null_mut()),
        }
    }

    /// Number of active entries on the lock-owning thread.
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// The isolate locked by an enclosing entry, if any.
    pub fn current(&self) -> Option<*mut v8::Isolate> {
        let isolate = self.isolate.get();
        (self.depth.get() > 0 && !isolate.is_null()).then_some(isolate)
    }
}

/// RAII guard for one engine entry.
///
/// Create this AFTER acquiring a v8::Locker (outermost entry) or with the
/// isolate returned by [`LockState::current`] (nested entry).
pub(crate) struct JsLock<'a> {
    state: &'a LockState,
    previous: *mut v8::Isolate,
}

impl<'a> JsLock<'a> {
    pub fn new(state: &'a LockState, isolate: &mut v8::Isolate) -> Self {
        let previous = state.isolate.replace(isolate as *mut _);
        state.depth.set(state.depth.get() + 1);

        Self { state, previous }
    }

    pub fn is_outermost(&self) -> bool {
        self.state.depth.get() == 1
    }
}

impl Drop for JsLock<'_> {
    fn drop(&mut self) {
        self.state.depth.set(self.state.depth.get() - 1);
        self.state.isolate.set(self.previous);
    }
}
