//! Deferred release of handles dropped on a contended context.
//!
//! A `v8::Global` must be reset while the isolate is locked by the current
//! thread. When a wrapper is dropped on a thread that cannot take the context
//! lock (another thread is running script), its handle is parked here and
//! reset by whichever thread next enters the context.
//!
//! ```ignore
//! // Any thread, without the lock
//! queue.defer(global);
//!
//! // Under the v8::Locker, before any other work
//! queue.process_all();
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased `v8::Global<T>` awaiting release.
pub(crate) struct DeferredHandle {
    ptr: *mut (),
    drop_fn: fn(*mut ()),
}

// SAFETY: the pointee is a boxed v8::Global<T>. It is only dereferenced in
// `drop`, which runs either under the owning isolate's Locker or after the
// isolate has been disposed (where Global's drop is inert).
unsafe impl Send for DeferredHandle {}

impl DeferredHandle {
    pub fn new<T: 'static>(handle: v8::Global<T>) -> Self {
        let ptr = Box::into_raw(Box::new(handle)) as *mut ();

        Self {
            ptr,
            drop_fn: |ptr| {
                // SAFETY: ptr was created from Box::into_raw of a v8::Global<T>
                let _ = unsafe { Box::from_raw(ptr as *mut v8::Global<T>) };
            },
        }
    }
}

impl Drop for DeferredHandle {
    fn drop(&mut self) {
        (self.drop_fn)(self.ptr);
    }
}

/// Per-context queue of handles whose release was deferred.
pub(crate) struct DeferredDestructionQueue {
    queue: Mutex<VecDeque<DeferredHandle>>,

    /// Lock-free emptiness check for the hot path
    pending_count: AtomicU64,
}

impl Default for DeferredDestructionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredDestructionQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            pending_count: AtomicU64::new(0),
        }
    }

    /// Park a handle until the next lock acquisition. Callable from any thread.
    pub fn defer<T: 'static>(&self, handle: v8::Global<T>) {
        let pending = {
            let mut queue = self.queue.lock();
            queue.push_back(DeferredHandle::new(handle));
            self.pending_count.store(queue.len() as u64, Ordering::Release);
            queue.len()
        };

        tracing::trace!(pending, "Deferred handle release");
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending_count.load(Ordering::Acquire) > 0
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.pending_count.load(Ordering::Acquire)
    }

    /// Release every parked handle.
    ///
    /// Must be called while holding the v8::Locker for the owning isolate, or
    /// after that isolate has been disposed. Returns the number released.
    pub fn process_all(&self) -> usize {
        if !self.has_pending() {
            return 0;
        }

        // Counter and queue change together under the queue lock; the
        // handles themselves are reset after it is released
        let handles = {
            let mut queue = self.queue.lock();
            self.pending_count.store(0, Ordering::Release);
            std::mem::take(&mut *queue)
        };

        let count = handles.len();
        drop(handles);

        if count > 0 {
            tracing::trace!(count, "Processed deferred handle releases");
        }

        count
    }
}

impl std::fmt::Debug for DeferredDestructionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredDestructionQueue")
            .field("pending_count", &self.len())
            .finish()
    }
}
