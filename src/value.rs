//! Value wrapper: one engine handle plus the bookkeeping to release it safely.

use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::pin;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::gc::SendGlobal;
use crate::release::{Consumed, Reusable};

/// Longest `length` [`JsValue::array`] walks.
pub const MAX_ARRAY_LENGTH: u32 = 1 << 24;

/// What a [`JsValue`] refers to.
///
/// `null` and `undefined` need no engine handle, so they are represented
/// directly and never have to be released.
pub(crate) enum Handle {
    Heap(SendGlobal<v8::Value>),
    Null,
    Undefined,
}

/// A host-side reference to a script value.
///
/// Each wrapper owns one engine handle and releases it exactly once: when it
/// is moved into a consuming call ([`consume`](Self::consume)), by an explicit
/// [`release`](Self::release), or when dropped. Releasing twice, or after the
/// owning [`Context`] has closed, is a no-op.
///
/// Operations on a value whose context is closed return
/// [`Error::ContextClosed`]; predicates and conversions fall back to
/// `false`/zero/empty.
pub struct JsValue {
    ctx: Context,
    handle: Option<Handle>,
    no_release: bool,
}

macro_rules! predicates {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(&self) -> bool {
                self.read(|_, value| value.$name()).unwrap_or(false)
            }
        )*
    };
}

impl JsValue {
    pub(crate) fn from_parts(ctx: Context, handle: Handle, no_release: bool) -> Self {
        Self {
            ctx,
            handle: Some(handle),
            no_release,
        }
    }

    /// The context this value belongs to.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Whether [`release`](Self::release) is disabled for this wrapper
    /// (singletons and callback arguments, released by their owner).
    pub fn is_no_release(&self) -> bool {
        self.no_release
    }

    /// Release the engine handle now. Idempotent.
    pub fn release(&mut self) {
        if self.no_release {
            return;
        }

        self.release_handle();
    }

    fn release_handle(&mut self) {
        if let Some(Handle::Heap(global)) = self.handle.take() {
            self.ctx.inner.release(global.0);
        }
    }

    /// Hand this value to a consuming call, which releases it afterwards.
    pub fn consume(self) -> Consumed<'static> {
        Consumed::Owned(self)
    }

    /// Keep this value for use across many consuming calls.
    pub fn into_reusable(self) -> Reusable {
        Reusable::new(self)
    }

    /// A new, independently released wrapper for the same script value.
    pub fn duplicate(&self) -> Option<JsValue> {
        self.ctx
            .enter(|scope, _| {
                let local = self.local(scope).ok()?;
                Some(self.ctx.wrap(scope, local, false))
            })
            .flatten()
    }

    pub(crate) fn local<'s>(
        &self,
        scope: &mut v8::PinScope<'s, '_>,
    ) -> Result<v8::Local<'s, v8::Value>> {
        match self.handle.as_ref().ok_or(Error::Released)? {
            Handle::Heap(global) => Ok(v8::Local::new(scope, &global.0)),
            Handle::Null => Ok(v8::null(scope).into()),
            Handle::Undefined => Ok(v8::undefined(scope).into()),
        }
    }

    /// Like [`local`](Self::local), refusing values from another context.
    pub(crate) fn local_for<'s>(
        &self,
        ctx: &Context,
        scope: &mut v8::PinScope<'s, '_>,
    ) -> Result<v8::Local<'s, v8::Value>> {
        if !self.ctx.same(ctx) {
            return Err(Error::ForeignValue);
        }

        self.local(scope)
    }

    fn object<'s>(&self, scope: &mut v8::PinScope<'s, '_>) -> Result<v8::Local<'s, v8::Object>> {
        let value = self.local(scope)?;

        if !value.is_object() {
            return Err(Error::NotAnObject);
        }

        value.try_into().map_err(|_| Error::NotAnObject)
    }

    fn function<'s>(
        &self,
        scope: &mut v8::PinScope<'s, '_>,
    ) -> Result<v8::Local<'s, v8::Function>> {
        let value = self.local(scope)?;
        value.try_into().map_err(|_| Error::NotAFunction)
    }

    /// Pure read under the lock. Exceptions thrown by conversions are
    /// swallowed; `None` if released or closed.
    fn read<R>(&self, f: impl FnOnce(&v8::PinScope<'_, '_>, v8::Local<'_, v8::Value>) -> R) -> Option<R> {
        self.ctx
            .enter(|scope, _| {
                let value = self.local(scope).ok()?;
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();
                Some(f(&tc, value))
            })
            .flatten()
    }

    pub fn get(&self, key: &str) -> Result<JsValue> {
        self.ctx.try_enter(|scope, _| {
            let object = self.object(scope)?;
            let key = js_string!(scope, key)?;

            let value = {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();
                object.get(&tc, key.into()).ok_or_else(|| caught!(tc))?
            };

            Ok(self.ctx.wrap(scope, value, false))
        })
    }

    pub fn get_idx(&self, index: u32) -> Result<JsValue> {
        self.ctx.try_enter(|scope, _| {
            let object = self.object(scope)?;

            let value = {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();
                object.get_index(&tc, index).ok_or_else(|| caught!(tc))?
            };

            Ok(self.ctx.wrap(scope, value, false))
        })
    }

    /// Set a property. `value` is consumed whether or not the write succeeds.
    pub fn set(&self, key: &str, value: Consumed<'_>) -> Result<()> {
        self.ctx.try_enter(move |scope, _| {
            let object = self.object(scope)?;
            let key = js_string!(scope, key)?;
            let local = value.local_for(&self.ctx, scope)?;

            {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();
                object
                    .set(&tc, key.into(), local)
                    .ok_or_else(|| caught!(tc))?;
            }

            drop(value);
            Ok(())
        })
    }

    /// Set an indexed element. `value` is consumed whether or not the write
    /// succeeds.
    pub fn set_idx(&self, index: u32, value: Consumed<'_>) -> Result<()> {
        self.ctx.try_enter(move |scope, _| {
            let object = self.object(scope)?;
            let local = value.local_for(&self.ctx, scope)?;

            {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();
                object
                    .set_index(&tc, index, local)
                    .ok_or_else(|| caught!(tc))?;
            }

            drop(value);
            Ok(())
        })
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        self.ctx.try_enter(|scope, _| {
            let object = self.object(scope)?;
            let key = js_string!(scope, key)?;

            let tc = pin!(v8::TryCatch::new(scope));
            let tc = tc.init();
            object.has(&tc, key.into()).ok_or_else(|| caught!(tc))
        })
    }

    pub fn has_idx(&self, index: u32) -> Result<bool> {
        self.ctx.try_enter(|scope, _| {
            let object = self.object(scope)?;

            let tc = pin!(v8::TryCatch::new(scope));
            let tc = tc.init();
            object.has_index(&tc, index).ok_or_else(|| caught!(tc))
        })
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.ctx.try_enter(|scope, _| {
            let object = self.object(scope)?;
            let key = js_string!(scope, key)?;

            let tc = pin!(v8::TryCatch::new(scope));
            let tc = tc.init();
            object.delete(&tc, key.into()).ok_or_else(|| caught!(tc))
        })
    }

    pub fn delete_idx(&self, index: u32) -> Result<bool> {
        self.ctx.try_enter(|scope, _| {
            let object = self.object(scope)?;

            let tc = pin!(v8::TryCatch::new(scope));
            let tc = tc.init();
            object.delete_index(&tc, index).ok_or_else(|| caught!(tc))
        })
    }

    /// Invoke this function with `receiver` as `this`.
    ///
    /// Owned arguments are released right after the call returns; borrowed
    /// ones (from [`Reusable::consume`]) are left alive.
    pub fn call<'a>(
        &self,
        receiver: &JsValue,
        args: impl IntoIterator<Item = Consumed<'a>>,
    ) -> Result<JsValue> {
        let args: Vec<Consumed<'a>> = args.into_iter().collect();

        self.ctx.try_enter(move |scope, _| {
            let function = self.function(scope)?;
            let receiver = receiver.local_for(&self.ctx, scope)?;

            let mut argv = Vec::with_capacity(args.len());
            for arg in &args {
                argv.push(arg.local_for(&self.ctx, scope)?);
            }

            let result = {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();
                function
                    .call(&tc, receiver, &argv)
                    .ok_or_else(|| caught!(tc))?
            };

            drop(args);
            Ok(self.ctx.wrap(scope, result, false))
        })
    }

    /// Invoke the method `name` of this object with this object as `this`.
    pub fn method_call<'a>(
        &self,
        name: &str,
        args: impl IntoIterator<Item = Consumed<'a>>,
    ) -> Result<JsValue> {
        let method = self.get(name)?;
        method.call(self, args)
    }

    /// Install a host function as the method `name`.
    pub fn set_object_method<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: Fn(&crate::FunctionCallbackInfo) -> Result<Option<JsValue>> + Send + Sync + 'static,
    {
        let function = self.ctx.new_function(callback).ok_or(Error::ContextClosed)?;
        self.set(name, function.consume())
    }

    /// Elements `0..length`, skipping `null` and `undefined` elements.
    ///
    /// The skip means positions are not preserved: `[a, null, b]` yields two
    /// values. A `length` above [`MAX_ARRAY_LENGTH`] is a conversion error,
    /// since every index is read with the context locked.
    pub fn array(&self) -> Result<Vec<JsValue>> {
        self.ctx.try_enter(|scope, _| {
            let object = self.object(scope)?;
            let length_key = js_string!(scope, "length")?;

            let elements = {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();

                let length = object
                    .get(&tc, length_key.into())
                    .ok_or_else(|| caught!(tc))?;

                let mut elements = Vec::new();

                if !length.is_null_or_undefined() {
                    let length = length.uint32_value(&tc).unwrap_or(0);
                    if length > MAX_ARRAY_LENGTH {
                        return Err(Error::conversion(format!(
                            "array length {length} exceeds {MAX_ARRAY_LENGTH}"
                        )));
                    }

                    for index in 0..length {
                        let element = object.get_index(&tc, index).ok_or_else(|| caught!(tc))?;

                        if !element.is_null_or_undefined() {
                            elements.push(element);
                        }
                    }
                }

                elements
            };

            Ok(elements
                .into_iter()
                .map(|element| self.ctx.wrap(scope, element, false))
                .collect())
        })
    }

    /// [`array`](Self::array) converted to strings.
    pub fn string_array(&self) -> Result<Vec<String>> {
        Ok(self.array()?.iter().map(JsValue::string).collect())
    }

    predicates!(
        is_array,
        is_array_buffer,
        is_array_buffer_view,
        is_big_int,
        is_boolean,
        is_date,
        is_false,
        is_function,
        is_int32,
        is_map,
        is_native_error,
        is_null,
        is_null_or_undefined,
        is_number,
        is_object,
        is_promise,
        is_reg_exp,
        is_set,
        is_string,
        is_symbol,
        is_true,
        is_uint32,
        is_undefined,
    );

    /// `ToString` of the value; empty if it cannot be converted.
    pub fn string(&self) -> String {
        self.read(|scope, value| {
            value
                .to_string(scope)
                .map(|s| s.to_rust_string_lossy(scope))
        })
        .flatten()
        .unwrap_or_default()
    }

    /// Integer value; BigInts are truncated to their low 64 bits.
    pub fn integer(&self) -> i64 {
        self.read(|scope, value| match v8::Local::<v8::BigInt>::try_from(value) {
            Ok(big) => Some(big.i64_value().0),
            Err(_) => value.integer_value(scope),
        })
        .flatten()
        .unwrap_or(0)
    }

    pub fn int32(&self) -> i32 {
        self.read(|scope, value| value.int32_value(scope))
            .flatten()
            .unwrap_or(0)
    }

    pub fn uint32(&self) -> u32 {
        self.read(|scope, value| value.uint32_value(scope))
            .flatten()
            .unwrap_or(0)
    }

    pub fn number(&self) -> f64 {
        self.read(|scope, value| value.number_value(scope))
            .flatten()
            .unwrap_or(0.0)
    }

    pub fn boolean(&self) -> bool {
        self.read(|scope, value| value.boolean_value(scope))
            .unwrap_or(false)
    }

    /// The value of a BigInt, `None` for other values or if it does not fit
    /// in 128 bits.
    pub fn big_int(&self) -> Option<i128> {
        self.read(|_, value| {
            let big = v8::Local::<v8::BigInt>::try_from(value).ok()?;

            if big.word_count() > 2 {
                return None;
            }

            let mut words = [0u64; 2];
            let (negative, words) = big.to_words_array(&mut words);
            let magnitude = words
                .iter()
                .rev()
                .fold(0u128, |acc, word| (acc << 64) | u128::from(*word));

            if negative {
                0i128.checked_sub_unsigned(magnitude)
            } else {
                i128::try_from(magnitude).ok()
            }
        })
        .flatten()
    }

    /// Bytes of an ArrayBuffer or ArrayBuffer view.
    pub fn array_buffer_content(&self) -> Option<Vec<u8>> {
        self.read(|scope, value| crate::v8_helpers::copy_buffer_contents(scope, value))
            .flatten()
    }

    /// `SameValue` comparison. `false` across contexts or for released values.
    pub fn same_value(&self, other: &JsValue) -> bool {
        if !self.ctx.same(&other.ctx) {
            return false;
        }

        self.ctx
            .enter(|scope, _| {
                let (Ok(left), Ok(right)) = (self.local(scope), other.local(scope)) else {
                    return false;
                };
                left.same_value(right)
            })
            .unwrap_or(false)
    }

    /// `JSON.stringify` of the value.
    pub fn marshal_json(&self) -> Result<String> {
        self.ctx.try_enter(|scope, _| {
            let value = self.local(scope)?;

            let tc = pin!(v8::TryCatch::new(scope));
            let tc = tc.init();

            let json = v8::json::stringify(&tc, value).ok_or_else(|| match caught!(tc) {
                Error::Exception(message) => Error::Conversion(message),
                other => other,
            })?;

            Ok(json.to_rust_string_lossy(&tc))
        })
    }

    /// Deserialize the value through its JSON representation.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.marshal_json()?)?)
    }
}

impl Drop for JsValue {
    fn drop(&mut self) {
        self.release_handle();
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.handle {
            None => "released",
            Some(Handle::Null) => "null",
            Some(Handle::Undefined) => "undefined",
            Some(Handle::Heap(_)) => "heap",
        };

        f.debug_struct("JsValue")
            .field("handle", &kind)
            .field("no_release", &self.no_release)
            .finish()
    }
}
