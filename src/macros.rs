//! Common macros for engine calls.

/// Create a V8 string, mapping allocation failure to [`crate::Error`].
///
/// # Example
/// ```ignore
/// let key = js_string!(scope, "length")?;
/// ```
macro_rules! js_string {
    ($scope:expr, $value:expr) => {
        v8::String::new($scope, $value)
            .ok_or_else(|| $crate::error::Error::conversion("string exceeds the engine's size limit"))
    };
}

/// Convert the state of a `v8::TryCatch` after a failed call into an error.
///
/// # Example
/// ```ignore
/// let tc = pin!(v8::TryCatch::new(scope));
/// let tc = tc.init();
/// let result = function.call(&tc, receiver, &argv).ok_or_else(|| caught!(tc))?;
/// ```
macro_rules! caught {
    ($tc:expr) => {{
        if $tc.has_terminated() {
            $crate::error::Error::Terminated
        } else {
            $crate::error::Error::Exception(
                $tc.exception()
                    .and_then(|e| e.to_string(&$tc).map(|s| s.to_rust_string_lossy(&$tc)))
                    .unwrap_or_else(|| "unknown exception".to_string()),
            )
        }
    }};
}
