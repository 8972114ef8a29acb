//! Engine context: one isolate and script context, its lock and teardown.
//!
//! Every operation that touches the engine goes through [`ContextInner::enter`],
//! which takes the reentrant context lock, checks that the engine is still
//! alive, and only then dereferences it. [`Context::close`] nulls the engine
//! reference under that same lock, so no thread can observe a half-closed
//! context and every release issued after close takes the no-op path.

use parking_lot::ReentrantMutex;
use std::cell::{Cell, OnceCell};
use std::fmt;
use std::pin::pin;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::callback::{self, CallbackRegistry, FunctionCallbackInfo, FunctionTemplate};
use crate::error::{Error, Result};
use crate::gc::{DeferredDestructionQueue, JsLock, LockState, SendGlobal};
use crate::isolate::EngineIsolate;
use crate::options::ContextOptions;
use crate::release::Consumed;
use crate::value::{Handle, JsValue};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handles owned by a live engine. Dropped under the Locker at teardown.
pub(crate) struct EngineHandles {
    pub context: v8::Global<v8::Context>,
    pub object_template: v8::Global<v8::ObjectTemplate>,
    pub array_constructor: OnceCell<v8::Global<v8::Function>>,
    pub callbacks: CallbackRegistry,
}

struct Engine {
    isolate: EngineIsolate,
    handles: EngineHandles,
}

/// State guarded by the context lock.
struct Slot {
    /// `None` once the context is closed
    engine: Cell<Option<NonNull<Engine>>>,
    entries: LockState,
    close_requested: Cell<bool>,
}

// SAFETY: Slot is only reachable through the ReentrantMutex, so a single
// thread touches the cells and the engine at a time. The engine's isolate is
// an UnenteredIsolate entered through v8::Locker on whichever thread holds the
// mutex.
unsafe impl Send for Slot {}

pub(crate) struct ContextInner {
    id: u64,
    slot: ReentrantMutex<Slot>,
    deferred: DeferredDestructionQueue,
    terminator: v8::IsolateHandle,
    closed: AtomicBool,
}

/// A script engine context.
///
/// Cheap to clone; all clones and every [`JsValue`] created from it share one
/// engine. The context may be used from any thread. Calls are serialized by a
/// reentrant lock, so host callbacks may call back into the same context.
///
/// The engine is torn down by [`close`](Self::close), or when the last clone
/// and the last value referencing it are dropped.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl Context {
    /// Open a context with default options.
    pub fn new() -> Self {
        Self::open(ContextOptions::default())
    }

    /// Allocate a new isolate and script context.
    ///
    /// # Panics
    ///
    /// Panics if the engine cannot allocate the isolate or context.
    pub fn open(options: ContextOptions) -> Self {
        let mut isolate = EngineIsolate::new(&options);

        let handles = {
            let mut locker = v8::Locker::new(&mut isolate.isolate);
            let scope = pin!(v8::HandleScope::new(&mut *locker));
            let scope = scope.init();

            let context = v8::Context::new(&scope, Default::default());
            let object_template = v8::ObjectTemplate::new(&scope);

            EngineHandles {
                context: v8::Global::new(scope.as_ref(), context),
                object_template: v8::Global::new(scope.as_ref(), object_template),
                array_constructor: OnceCell::new(),
                callbacks: CallbackRegistry::default(),
            }
        };

        let terminator = isolate.handle.clone();
        let engine = NonNull::from(Box::leak(Box::new(Engine { isolate, handles })));
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            context = id,
            heap_max_mb = options.heap_max_mb,
            "Opened context"
        );

        Self {
            inner: Arc::new(ContextInner {
                id,
                slot: ReentrantMutex::new(Slot {
                    engine: Cell::new(Some(engine)),
                    entries: LockState::new(),
                    close_requested: Cell::new(false),
                }),
                deferred: DeferredDestructionQueue::new(),
                terminator,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Tear the engine down. Idempotent.
    ///
    /// In-flight script execution on other threads is terminated first
    /// (their calls return [`Error::Terminated`]); then the engine reference
    /// is nulled under the lock and the isolate is disposed. Called from a
    /// host callback running on this context, teardown completes when the
    /// outermost engine call on that thread returns.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }

        self.inner.terminator.terminate_execution();

        let slot = self.inner.slot.lock();

        if slot.entries.depth() > 0 {
            slot.close_requested.set(true);
            tracing::debug!(
                context = self.inner.id,
                "Close requested from inside the context, deferring teardown"
            );
            return;
        }

        self.inner.teardown(&slot);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of handles waiting for a lock acquisition to be released.
    pub fn pending_releases(&self) -> u64 {
        self.inner.deferred.len()
    }

    /// The script global object.
    pub fn global(&self) -> Option<JsValue> {
        self.create(|scope| Some(scope.get_current_context().global(scope).into()))
    }

    /// The null singleton. It is never released by [`JsValue::release`].
    pub fn null_value(&self) -> JsValue {
        JsValue::from_parts(self.clone(), Handle::Null, true)
    }

    pub fn undefined_value(&self) -> JsValue {
        JsValue::from_parts(self.clone(), Handle::Undefined, true)
    }

    pub fn new_string(&self, value: &str) -> Option<JsValue> {
        self.create(|scope| v8::String::new(scope, value).map(Into::into))
    }

    pub fn new_int32(&self, value: i32) -> Option<JsValue> {
        self.create(|scope| Some(v8::Integer::new(scope, value).into()))
    }

    pub fn new_uint32(&self, value: u32) -> Option<JsValue> {
        self.create(|scope| Some(v8::Integer::new_from_unsigned(scope, value).into()))
    }

    /// 64-bit integers are not exactly representable as numbers, so this
    /// produces a BigInt.
    pub fn new_int64(&self, value: i64) -> Option<JsValue> {
        self.create(|scope| Some(v8::BigInt::new_from_i64(scope, value).into()))
    }

    pub fn new_number(&self, value: f64) -> Option<JsValue> {
        self.create(|scope| Some(v8::Number::new(scope, value).into()))
    }

    pub fn new_boolean(&self, value: bool) -> Option<JsValue> {
        self.create(|scope| Some(v8::Boolean::new(scope, value).into()))
    }

    pub fn new_big_int(&self, value: i128) -> Option<JsValue> {
        let magnitude = value.unsigned_abs();
        let words = [magnitude as u64, (magnitude >> 64) as u64];

        self.create(|scope| v8::BigInt::new_from_words(scope, value < 0, &words).map(Into::into))
    }

    /// A fresh instance of the context's shared object template.
    pub fn new_object(&self) -> Option<JsValue> {
        self.enter(|scope, handles| {
            let template = v8::Local::new(scope, &handles.object_template);
            let object = template.new_instance(scope)?;
            Some(self.wrap(scope, object.into(), false))
        })
        .flatten()
    }

    /// Build an array by calling the script's own `Array` constructor.
    ///
    /// Every owned value is released once the call returns. A single value is
    /// stored at index 0 rather than passed alone, where `Array(n)` would
    /// create `n` empty slots.
    pub fn new_array<'a>(&self, values: impl IntoIterator<Item = Consumed<'a>>) -> Result<JsValue> {
        let values: Vec<Consumed<'a>> = values.into_iter().collect();

        self.try_enter(move |scope, handles| {
            let constructor = array_constructor(scope, handles)?;
            let receiver: v8::Local<v8::Value> = v8::undefined(scope).into();

            let mut argv = Vec::with_capacity(values.len());
            for value in &values {
                argv.push(value.local_for(self, scope)?);
            }

            let array = {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();

                if argv.len() == 1 {
                    let array = constructor
                        .call(&tc, receiver, &[])
                        .ok_or_else(|| caught!(tc))?;
                    let object: v8::Local<v8::Object> =
                        array.try_into().map_err(|_| Error::NotAnObject)?;
                    object
                        .set_index(&tc, 0, argv[0])
                        .ok_or_else(|| caught!(tc))?;
                    array
                } else {
                    constructor
                        .call(&tc, receiver, &argv)
                        .ok_or_else(|| caught!(tc))?
                }
            };

            drop(values);
            Ok(self.wrap(scope, array, false))
        })
    }

    pub fn new_string_array<S: AsRef<str>>(&self, values: &[S]) -> Result<JsValue> {
        let mut strings = Vec::with_capacity(values.len());

        for value in values {
            let string = self.new_string(value.as_ref()).ok_or(Error::ContextClosed)?;
            strings.push(string.consume());
        }

        self.new_array(strings)
    }

    /// An ArrayBuffer holding a copy of `data`.
    pub fn new_array_buffer(&self, data: impl Into<Vec<u8>>) -> Option<JsValue> {
        let data = data.into();

        self.enter(move |scope, _| {
            let buffer = crate::v8_helpers::array_buffer_from_bytes(scope, data);
            self.wrap(scope, buffer.into(), false)
        })
    }

    /// A script function that invokes `callback`.
    ///
    /// The callback is freed after script and host both dropped the function
    /// and the engine collected it.
    pub fn new_function<F>(&self, callback: F) -> Option<JsValue>
    where
        F: Fn(&FunctionCallbackInfo) -> Result<Option<JsValue>> + Send + Sync + 'static,
    {
        let callback: callback::FunctionCallback = Arc::new(callback);

        self.enter(|scope, handles| {
            let function = callback::new_function(scope, handles, self, callback)?;
            Some(self.wrap(scope, function.into(), false))
        })
        .flatten()
    }

    /// A function template from which any number of functions sharing
    /// `callback` can be instantiated.
    ///
    /// The engine caches template instances per context, so the callback of
    /// an instantiated template lives until close.
    pub fn new_function_template<F>(&self, callback: F) -> Option<FunctionTemplate>
    where
        F: Fn(&FunctionCallbackInfo) -> Result<Option<JsValue>> + Send + Sync + 'static,
    {
        let callback: callback::FunctionCallback = Arc::new(callback);

        self.enter(|scope, handles| {
            let template = callback::new_template(scope, handles, self, callback);
            FunctionTemplate::new(self.clone(), v8::Global::new(scope.as_ref(), template))
        })
    }

    /// Compile and run `source`, reporting errors under `name`.
    pub fn run_script(&self, source: &str, name: &str) -> Result<JsValue> {
        self.try_enter(|scope, _| {
            let code = js_string!(scope, source)?;
            let resource_name = js_string!(scope, name)?;
            let origin = v8::ScriptOrigin::new(
                scope,
                resource_name.into(),
                0,
                0,
                false,
                0,
                None,
                false,
                false,
                false,
                None,
            );

            let result = {
                let tc = pin!(v8::TryCatch::new(scope));
                let tc = tc.init();

                let Some(script) = v8::Script::compile(&tc, code, Some(&origin)) else {
                    return Err(match caught!(tc) {
                        Error::Exception(message) => Error::Compile {
                            name: name.to_string(),
                            message,
                        },
                        other => other,
                    });
                };

                script.run(&tc).ok_or_else(|| caught!(tc))?
            };

            Ok(self.wrap(scope, result, false))
        })
    }

    /// Run `f` inside the engine. `None` if the context is closed.
    pub(crate) fn enter<R>(
        &self,
        f: impl FnOnce(&mut v8::PinScope<'_, '_>, &EngineHandles) -> R,
    ) -> Option<R> {
        self.inner.enter(f)
    }

    /// Like [`enter`](Self::enter), mapping a closed context to an error.
    pub(crate) fn try_enter<R>(
        &self,
        f: impl FnOnce(&mut v8::PinScope<'_, '_>, &EngineHandles) -> Result<R>,
    ) -> Result<R> {
        self.inner.enter(f).unwrap_or(Err(Error::ContextClosed))
    }

    fn create<F>(&self, f: F) -> Option<JsValue>
    where
        F: for<'s, 'i> FnOnce(&mut v8::PinScope<'s, 'i>) -> Option<v8::Local<'s, v8::Value>>,
    {
        self.enter(|scope, _| {
            let local = f(scope)?;
            Some(self.wrap(scope, local, false))
        })
        .flatten()
    }

    /// Take a persistent handle to `local`.
    pub(crate) fn wrap(
        &self,
        scope: &mut v8::PinScope<'_, '_>,
        local: v8::Local<'_, v8::Value>,
        no_release: bool,
    ) -> JsValue {
        let handle = if local.is_null() {
            Handle::Null
        } else if local.is_undefined() {
            Handle::Undefined
        } else {
            Handle::Heap(SendGlobal(v8::Global::new(scope.as_ref(), local)))
        };

        JsValue::from_parts(self.clone(), handle, no_release)
    }

    pub(crate) fn same(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("pending_releases", &self.inner.deferred.len())
            .finish()
    }
}

impl ContextInner {
    fn enter<R>(&self, f: impl FnOnce(&mut v8::PinScope<'_, '_>, &EngineHandles) -> R) -> Option<R> {
        let slot = self.slot.lock();
        let engine = slot.engine.get()?.as_ptr();

        let result = {
            let mut locker;
            let isolate: &mut v8::Isolate = match slot.entries.current() {
                // SAFETY: an enclosing entry on this thread holds the Locker
                Some(isolate) => unsafe { &mut *isolate },
                None => {
                    // SAFETY: the engine is freed only by teardown, which
                    // requires this lock and depth 0
                    locker = v8::Locker::new(unsafe { &mut (*engine).isolate.isolate });
                    self.deferred.process_all();
                    &mut locker
                }
            };

            let entry = JsLock::new(&slot.entries, isolate);

            // SAFETY: see above
            let handles = unsafe { &(*engine).handles };

            if entry.is_outermost() {
                handles.callbacks.sweep();
            }

            let scope = pin!(v8::HandleScope::new(isolate));
            let mut scope = scope.init();
            let context = v8::Local::new(&scope, &handles.context);
            let scope = &mut v8::ContextScope::new(&mut scope, context);

            f(scope, handles)
        };

        if slot.entries.depth() == 0 && slot.close_requested.get() {
            self.teardown(&slot);
        }

        Some(result)
    }

    /// Release a handle owned by this context, from any thread.
    pub(crate) fn release<T: 'static>(&self, global: v8::Global<T>) {
        if self.closed.load(Ordering::Acquire) {
            // The isolate is disposed; dropping the Global is inert
            drop(global);
            return;
        }

        match self.slot.try_lock() {
            Some(slot) => match slot.engine.get() {
                Some(_) if slot.entries.depth() > 0 => drop(global),
                Some(engine) => {
                    // SAFETY: we hold the context lock at depth 0
                    let _locker =
                        v8::Locker::new(unsafe { &mut (*engine.as_ptr()).isolate.isolate });
                    self.deferred.process_all();
                    drop(global);
                }
                // Teardown in progress on this thread (isolate still locked)
                // or already finished (Global drop is inert)
                None => drop(global),
            },
            None => {
                self.deferred.defer(global);

                if self.closed.load(Ordering::Acquire) {
                    self.deferred.process_all();
                }
            }
        }
    }

    fn teardown(&self, slot: &Slot) {
        let Some(engine) = slot.engine.take() else {
            return;
        };

        slot.close_requested.set(false);

        // SAFETY: created by Box::leak in Context::open and taken exactly once
        let Engine {
            mut isolate,
            handles,
        } = *unsafe { Box::from_raw(engine.as_ptr()) };

        let callbacks = handles.callbacks.len();

        {
            let _locker = v8::Locker::new(&mut isolate.isolate);
            drop(handles);
            self.deferred.process_all();
        }

        drop(isolate);
        self.closed.store(true, Ordering::Release);

        // Anything deferred while tearing down is now inert
        self.deferred.process_all();

        tracing::debug!(context = self.id, callbacks, "Closed context");
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            let slot = self.slot.lock();
            self.teardown(&slot);
        }
    }
}

#[cfg(test)]
impl Context {
    /// Force a full collection. The next outermost entry frees the callbacks
    /// it made unreachable.
    pub(crate) fn collect_garbage(&self) {
        self.enter(|scope, _| scope.low_memory_notification());
    }

    pub(crate) fn registered_callbacks(&self) -> usize {
        self.enter(|_, handles| handles.callbacks.len()).unwrap_or(0)
    }
}

fn array_constructor<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    handles: &EngineHandles,
) -> Result<v8::Local<'s, v8::Function>> {
    if let Some(constructor) = handles.array_constructor.get() {
        return Ok(v8::Local::new(scope, constructor));
    }

    let global = scope.get_current_context().global(scope);
    let key = js_string!(scope, "Array")?;
    let value = global.get(scope, key.into()).ok_or(Error::NotAFunction)?;
    let constructor: v8::Local<v8::Function> =
        value.try_into().map_err(|_| Error::NotAFunction)?;

    let _ = handles
        .array_constructor
        .set(v8::Global::new(scope.as_ref(), constructor));

    Ok(constructor)
}
