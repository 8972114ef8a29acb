//! Context configuration.

use serde::{Deserialize, Serialize};

/// Resource limits and engine flags for a [`Context`](crate::Context).
///
/// Deserializable so hosts can keep it next to the rest of their settings:
///
/// ```
/// let options: v8js::ContextOptions =
///     serde_json::from_str(r#"{ "heap_max_mb": 64 }"#).unwrap();
/// assert_eq!(options.heap_max_mb, 64);
/// assert_eq!(options.heap_initial_mb, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Initial V8 heap size in megabytes.
    pub heap_initial_mb: usize,

    /// Maximum V8 heap size in megabytes.
    pub heap_max_mb: usize,

    /// Extra V8 flags (e.g. `--expose-gc`).
    ///
    /// V8 flags are process-wide and can only be set before the platform is
    /// initialized, so only the flags of the first context opened in the
    /// process take effect.
    pub v8_flags: Vec<String>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            heap_initial_mb: 1,
            heap_max_mb: 128,
            v8_flags: Vec::new(),
        }
    }
}

impl ContextOptions {
    pub(crate) fn heap_limits(&self) -> (usize, usize) {
        (
            self.heap_initial_mb * 1024 * 1024,
            self.heap_max_mb * 1024 * 1024,
        )
    }
}
