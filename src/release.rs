//! Release strategies for values handed to consuming calls.
//!
//! A value passed to [`JsValue::set`], [`JsValue::set_idx`],
//! [`JsValue::call`] or [`Context::new_array`](crate::Context::new_array) is
//! released as soon as the engine call returns, unless it was only borrowed
//! from a [`Reusable`].

use std::ops::Deref;

use crate::value::JsValue;

/// A value handed to a consuming call.
#[derive(Debug)]
pub enum Consumed<'a> {
    /// Released right after the call that takes it.
    Owned(JsValue),
    /// Borrowed from a [`Reusable`]; left alive.
    Borrowed(&'a JsValue),
}

impl Consumed<'_> {
    pub fn is_owned(&self) -> bool {
        matches!(self, Consumed::Owned(_))
    }

    /// Turn back into a standalone value. A borrowed value is duplicated.
    pub fn into_value(self) -> Option<JsValue> {
        match self {
            Consumed::Owned(value) => Some(value),
            Consumed::Borrowed(value) => value.duplicate(),
        }
    }
}

impl Deref for Consumed<'_> {
    type Target = JsValue;

    fn deref(&self) -> &JsValue {
        match self {
            Consumed::Owned(value) => value,
            Consumed::Borrowed(value) => value,
        }
    }
}

impl From<JsValue> for Consumed<'static> {
    fn from(value: JsValue) -> Self {
        Consumed::Owned(value)
    }
}

impl<'a> From<&'a Reusable> for Consumed<'a> {
    fn from(reusable: &'a Reusable) -> Self {
        reusable.consume()
    }
}

/// A value shared across many consuming calls.
///
/// Typically a method function installed on every object of one kind.
/// [`consume`](Self::consume) lends it to one call;
/// [`final_consume`](Self::final_consume) hands it to the last call, which
/// releases it; [`dispose`](Self::dispose) releases it without a call.
#[derive(Debug)]
pub struct Reusable {
    value: JsValue,
}

impl Reusable {
    pub fn new(value: JsValue) -> Self {
        Self { value }
    }

    pub fn consume(&self) -> Consumed<'_> {
        Consumed::Borrowed(&self.value)
    }

    pub fn final_consume(self) -> Consumed<'static> {
        Consumed::Owned(self.value)
    }

    pub fn dispose(self) {
        let mut value = self.value;
        value.release();
    }

    pub fn value(&self) -> &JsValue {
        &self.value
    }

    pub fn into_inner(self) -> JsValue {
        self.value
    }
}
