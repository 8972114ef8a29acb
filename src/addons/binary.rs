//! Binary helpers: base64 and message digests over ArrayBuffers.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use ring::digest;

use super::text;
use crate::callback::FunctionCallbackInfo;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::plugin::Module;
use crate::value::JsValue;

/// Script object with `Base64Encode`, `Base64Decode`, `Md5Sum`, `Sha1Sum`,
/// `Sha256Sum` and `Sha512Sum`.
///
/// Hashes return lowercase hex. A missing or non-buffer argument yields
/// `undefined`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryAddon;

impl BinaryAddon {
    pub fn new() -> Self {
        Self
    }

    pub fn convert(&self, ctx: &Context) -> Result<JsValue> {
        let object = ctx.new_object().ok_or(Error::ContextClosed)?;

        object.set_object_method("Base64Encode", base64_encode)?;
        object.set_object_method("Base64Decode", base64_decode)?;
        object.set_object_method("Md5Sum", |info| {
            hex_digest(info, |data| hex::encode(Md5::digest(data)))
        })?;
        object.set_object_method("Sha1Sum", |info| {
            hex_digest(info, |data| ring_digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data))
        })?;
        object.set_object_method("Sha256Sum", |info| {
            hex_digest(info, |data| ring_digest(&digest::SHA256, data))
        })?;
        object.set_object_method("Sha512Sum", |info| {
            hex_digest(info, |data| ring_digest(&digest::SHA512, data))
        })?;

        Ok(object)
    }

    /// A plugin module publishing the addon as the global `name`.
    pub fn module(name: impl Into<String>) -> Module {
        let name: Arc<str> = name.into().into();
        let global_name = name.clone();

        Module::new(name.as_ref()).on_init(move |plugin| {
            let ctx = plugin.runtime()?;
            let addon = BinaryAddon::new().convert(ctx)?;
            let global = ctx.global().ok_or(Error::ContextClosed)?;
            global.set(&global_name, addon.consume())
        })
    }
}

/// Bytes of the first argument; `None` unless it is a buffer or view.
fn buffer_arg(info: &FunctionCallbackInfo) -> Option<Vec<u8>> {
    info.get_arg(0).array_buffer_content()
}

fn base64_encode(info: &FunctionCallbackInfo) -> Result<Option<JsValue>> {
    match buffer_arg(info) {
        Some(data) => text(info, &STANDARD.encode(data)),
        None => Ok(None),
    }
}

fn base64_decode(info: &FunctionCallbackInfo) -> Result<Option<JsValue>> {
    let arg = info.get_arg(0);
    if arg.is_null_or_undefined() {
        return Ok(None);
    }

    let data = STANDARD
        .decode(arg.string())
        .map_err(|err| Error::host(format!("invalid base64: {err}")))?;

    Ok(info.context().new_array_buffer(data))
}

fn hex_digest(
    info: &FunctionCallbackInfo,
    sum: impl FnOnce(&[u8]) -> String,
) -> Result<Option<JsValue>> {
    match buffer_arg(info) {
        Some(data) => text(info, &sum(&data)),
        None => Ok(None),
    }
}

fn ring_digest(algorithm: &'static digest::Algorithm, data: &[u8]) -> String {
    hex::encode(digest::digest(algorithm, data).as_ref())
}
