//! Isolate managed via v8::Locker (no auto-enter/exit)
//!
//! A [`Context`](crate::Context) may be driven from any thread, so the isolate
//! is created unentered and every entry goes through a `v8::Locker`.

use crate::options::ContextOptions;

/// A V8 isolate that requires explicit locking via v8::Locker
///
/// This represents the V8 engine instance (heap, GC, JIT compiler) without
/// automatic entry management. It must be locked with v8::Locker before use.
pub(crate) struct EngineIsolate {
    pub isolate: v8::UnenteredIsolate,
    pub handle: v8::IsolateHandle,
}

impl EngineIsolate {
    /// Create a new locker-managed isolate.
    ///
    /// Panics if V8 cannot allocate the isolate.
    pub fn new(options: &ContextOptions) -> Self {
        crate::platform::get_platform(&options.v8_flags);

        let (heap_initial, heap_max) = options.heap_limits();

        let params = v8::CreateParams::default()
            .heap_limits(heap_initial, heap_max)
            .allow_atomics_wait(false);

        let mut isolate = v8::Isolate::new_unentered(params);

        let handle = {
            let locker = v8::Locker::new(&mut isolate);
            locker.thread_safe_handle()
        };

        Self { isolate, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_isolates_drop_in_any_order() {
        let options = ContextOptions::default();

        let first = EngineIsolate::new(&options);
        let second = EngineIsolate::new(&options);

        drop(first);
        drop(second);
    }

    #[test]
    fn test_with_locker() {
        let mut engine = EngineIsolate::new(&ContextOptions::default());

        let mut locker = v8::Locker::new(&mut engine.isolate);

        let scope = std::pin::pin!(v8::HandleScope::new(&mut *locker));
        let _scope = scope.init();
    }

    #[test]
    fn test_terminate_without_running_script() {
        let engine = EngineIsolate::new(&ContextOptions::default());

        // Requesting termination while idle must not crash
        engine.handle.terminate_execution();
    }
}
