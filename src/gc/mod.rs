//! Handle bookkeeping: when and on which thread a `v8::Global` may be reset.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Context lock (parking_lot::ReentrantMutex)                 │
//! │  ├── v8::Locker on the outermost entry                      │
//! │  ├── JsLock: depth + isolate for nested entries             │
//! │  └── Processes deferred releases on acquisition             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  DeferredDestructionQueue                                   │
//! │  ├── Handles dropped while another thread holds the lock    │
//! │  └── Released on the next lock acquisition or at teardown   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod deferred_destruction;
mod js_lock;

pub(crate) use deferred_destruction::DeferredDestructionQueue;
pub(crate) use js_lock::{JsLock, LockState};

/// A `v8::Global` that may cross threads.
///
/// The wrapped handle is only dereferenced or reset under the owning
/// context's lock; see [`crate::Context`].
pub(crate) struct SendGlobal<T>(pub v8::Global<T>);

// SAFETY: every access to the inner Global goes through the context lock,
// which serializes the isolate across threads with a v8::Locker.
unsafe impl<T> Send for SendGlobal<T> {}
unsafe impl<T> Sync for SendGlobal<T> {}
