//! Global V8 platform initialization.
//!
//! V8 can only be initialized once per process. This module provides
//! a single entry point for platform initialization used by every context.

use std::sync::OnceLock;

static PLATFORM: OnceLock<v8::SharedRef<v8::Platform>> = OnceLock::new();

/// Get the global V8 platform, initializing it if necessary.
///
/// This is safe to call from multiple threads - the platform is only
/// initialized once and the same reference is returned to all callers.
/// `flags` are applied only by the call that performs the initialization.
pub fn get_platform(flags: &[String]) -> &'static v8::SharedRef<v8::Platform> {
    PLATFORM.get_or_init(|| {
        // Flags must be set before V8::initialize
        for flag in flags {
            v8::V8::set_flags_from_string(flag);
        }

        // On macOS, use single-threaded GC to avoid code collection issues
        #[cfg(target_os = "macos")]
        v8::V8::set_flags_from_string("--single-threaded-gc");

        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform.clone());
        v8::V8::initialize();

        log::info!(
            "Initialized V8 {} platform ({} extra flags)",
            v8::V8::get_version(),
            flags.len()
        );

        platform
    })
}

/// Whether the platform has been initialized in this process.
pub fn is_initialized() -> bool {
    PLATFORM.get().is_some()
}
