//! Handle lifetime management for an embedded V8 engine.
//!
//! A [`Context`] owns one isolate and script context. Every script value the
//! host holds is a [`JsValue`], which owns one engine handle and releases it
//! exactly once: when moved into a consuming call, explicitly, or on drop.
//! Contexts can be used from any thread and closed at any time; values that
//! outlive their context become inert.
//!
//! ```no_run
//! use v8js::Context;
//!
//! let ctx = Context::new();
//! let greeting = ctx.new_string("hello").unwrap();
//! let global = ctx.global().unwrap();
//! global.set("greeting", greeting.consume()).unwrap();
//!
//! let length = ctx.run_script("greeting.length", "example.js").unwrap();
//! assert_eq!(length.int32(), 5);
//! ctx.close();
//! ```

#[macro_use]
mod macros;

pub mod addons;
mod callback;
mod context;
mod error;
mod gc;
mod isolate;
mod options;
pub mod platform;
pub mod plugin;
mod release;
mod v8_helpers;
mod value;

pub use callback::{FunctionCallback, FunctionCallbackInfo, FunctionTemplate};
pub use context::Context;
pub use error::{Error, Result};
pub use options::ContextOptions;
pub use release::{Consumed, Reusable};
pub use value::{JsValue, MAX_ARRAY_LENGTH};
