//! Host callbacks: native function invocations marshalled to host closures.
//!
//! Every host function shares one trampoline, [`dispatch`]. The closure it
//! runs is reached through the template's `External` data, which points at a
//! [`CallbackEntry`] owned by the context's engine handles. An entry is freed
//! once the engine has collected its `External`, which no function or
//! template can reach any more by then.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::{Arc, Weak};

use crate::context::{Context, ContextInner, EngineHandles};
use crate::error::Result;
use crate::gc::SendGlobal;
use crate::value::JsValue;

/// A host function callable from script.
///
/// `Ok(Some(value))` becomes the call's result, `Ok(None)` is `undefined`,
/// and `Err` is thrown into script as an `Error`.
pub type FunctionCallback =
    Arc<dyn Fn(&FunctionCallbackInfo) -> Result<Option<JsValue>> + Send + Sync>;

pub(crate) struct CallbackEntry {
    context: Weak<ContextInner>,
    callback: FunctionCallback,
}

/// Receiver and arguments of one script-to-host call.
///
/// The wrapped values are released when the call returns; use
/// [`JsValue::duplicate`] to keep one longer.
pub struct FunctionCallbackInfo {
    context: Context,
    this: JsValue,
    args: Vec<JsValue>,
    null: JsValue,
}

impl FunctionCallbackInfo {
    fn new(
        scope: &mut v8::PinScope<'_, '_>,
        context: Context,
        args: &v8::FunctionCallbackArguments,
    ) -> Self {
        let this = context.wrap(scope, args.this().into(), true);

        let mut values = Vec::with_capacity(args.length().max(0) as usize);
        for index in 0..args.length() {
            values.push(context.wrap(scope, args.get(index), true));
        }

        Self {
            null: context.null_value(),
            context,
            this,
            args: values,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn this(&self) -> &JsValue {
        &self.this
    }

    pub fn args(&self) -> &[JsValue] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The argument at `index`, or the null singleton when out of range.
    pub fn get_arg(&self, index: usize) -> &JsValue {
        self.args.get(index).unwrap_or(&self.null)
    }
}

impl fmt::Debug for FunctionCallbackInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCallbackInfo")
            .field("args", &self.args.len())
            .finish()
    }
}

/// A function template bound to a host callback.
pub struct FunctionTemplate {
    context: Context,
    template: Option<SendGlobal<v8::FunctionTemplate>>,
}

impl FunctionTemplate {
    pub(crate) fn new(context: Context, template: v8::Global<v8::FunctionTemplate>) -> Self {
        Self {
            context,
            template: Some(SendGlobal(template)),
        }
    }

    /// Instantiate a script function from this template.
    pub fn get_function(&self) -> Option<JsValue> {
        let template = self.template.as_ref()?;

        self.context
            .enter(|scope, _| {
                let template = v8::Local::new(scope, &template.0);
                let function = template.get_function(scope)?;
                Some(self.context.wrap(scope, function.into(), false))
            })
            .flatten()
    }
}

impl Drop for FunctionTemplate {
    fn drop(&mut self) {
        if let Some(template) = self.template.take() {
            self.context.inner.release(template.0);
        }
    }
}

/// Host callbacks registered with one engine.
///
/// Lives in the engine handles and is only touched under the context lock.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    next_id: Cell<u64>,
    entries: RefCell<HashMap<u64, Registration>>,
    /// Ids whose `External` was collected, filled by weak finalizers
    collected: Rc<RefCell<Vec<u64>>>,
}

struct Registration {
    _entry: Box<CallbackEntry>,
    _data: v8::Weak<v8::External>,
}

impl CallbackRegistry {
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Free the entries of collected functions. Returns how many were freed.
    ///
    /// Must run with the context entered: dropping a closure may release the
    /// values it captured.
    pub fn sweep(&self) -> usize {
        let ids = std::mem::take(&mut *self.collected.borrow_mut());
        if ids.is_empty() {
            return 0;
        }

        let freed: Vec<Registration> = {
            let mut entries = self.entries.borrow_mut();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        let count = freed.len();
        drop(freed);

        tracing::trace!(freed = count, live = self.len(), "Swept host callbacks");
        count
    }

    /// Box `callback` and hand out the `External` pointing at it.
    fn register<'s>(
        &self,
        scope: &mut v8::PinScope<'s, '_>,
        context: &Context,
        callback: FunctionCallback,
    ) -> v8::Local<'s, v8::External> {
        self.sweep();

        let entry = Box::new(CallbackEntry {
            context: Arc::downgrade(&context.inner),
            callback,
        });
        let entry_ptr = &*entry as *const CallbackEntry as *mut c_void;
        let external = v8::External::new(scope, entry_ptr);

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let collected = self.collected.clone();
        let data = v8::Weak::with_finalizer(
            scope,
            external,
            Box::new(move |_| collected.borrow_mut().push(id)),
        );

        self.entries.borrow_mut().insert(
            id,
            Registration {
                _entry: entry,
                _data: data,
            },
        );

        external
    }
}

/// Register `callback` and build a template dispatching to it.
pub(crate) fn new_template<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    handles: &EngineHandles,
    context: &Context,
    callback: FunctionCallback,
) -> v8::Local<'s, v8::FunctionTemplate> {
    let data = handles.callbacks.register(scope, context, callback);

    v8::FunctionTemplate::builder(dispatch)
        .data(data.into())
        .build(scope)
}

/// Register `callback` and build a standalone function dispatching to it.
///
/// Unlike template instances, the function is not cached by the engine, so
/// its entry is freed once script drops it.
pub(crate) fn new_function<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    handles: &EngineHandles,
    context: &Context,
    callback: FunctionCallback,
) -> Option<v8::Local<'s, v8::Function>> {
    let data = handles.callbacks.register(scope, context, callback);

    v8::Function::builder(dispatch)
        .data(data.into())
        .build(scope)
}

fn dispatch(
    scope: &mut v8::PinScope,
    args: v8::FunctionCallbackArguments,
    mut retval: v8::ReturnValue,
) {
    let Ok(external) = v8::Local::<v8::External>::try_from(args.data()) else {
        return;
    };

    // SAFETY: the entry is boxed in the callback registry and freed only
    // after this External has been collected
    let entry = unsafe { &*(external.value() as *const CallbackEntry) };

    let Some(inner) = entry.context.upgrade() else {
        return;
    };

    let context = Context { inner };
    let info = FunctionCallbackInfo::new(scope, context.clone(), &args);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(&info)));

    match outcome {
        Ok(Ok(Some(value))) => match value.local_for(&context, scope) {
            Ok(local) => retval.set(local),
            Err(err) => throw(scope, &err.to_string()),
        },
        Ok(Ok(None)) => {}
        Ok(Err(err)) => throw(scope, &err.to_string()),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(%message, "Host callback panicked");
            throw(scope, &format!("host callback panicked: {message}"));
        }
    }
}

fn throw(scope: &mut v8::PinScope, message: &str) {
    // A terminating isolate must not have the termination replaced
    if scope.is_execution_terminating() {
        return;
    }

    let message = v8::String::new(scope, message).unwrap_or_else(|| v8::String::empty(scope));
    let exception = v8::Exception::error(scope, message);
    scope.throw_exception(exception);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
