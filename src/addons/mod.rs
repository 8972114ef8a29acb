//! Host capability modules exposed to scripts.
//!
//! Each addon converts into a script object (`convert`) and can be attached
//! to a plugin as a module publishing that object as a global.

pub mod binary;
pub mod http;

pub use binary::BinaryAddon;
pub use http::{HttpAddon, HttpOptions};

use crate::callback::FunctionCallbackInfo;
use crate::error::Result;
use crate::value::JsValue;

/// A string result for a host method.
pub(crate) fn text(info: &FunctionCallbackInfo, value: &str) -> Result<Option<JsValue>> {
    Ok(info.context().new_string(value))
}

/// A string array result for a host method.
pub(crate) fn strings<S: AsRef<str>>(
    info: &FunctionCallbackInfo,
    values: &[S],
) -> Result<Option<JsValue>> {
    info.context().new_string_array(values).map(Some)
}
