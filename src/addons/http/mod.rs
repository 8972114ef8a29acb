//! Outbound HTTP for scripts.
//!
//! `HTTP.New(method, url)` returns a request object whose methods are shared
//! functions looking the request up by its `id` property. Request state lives
//! host side until the object is collected, when the addon's
//! `FinalizationRegistry` calls `unload(id)`.
//!
//! `Execute` blocks the calling thread (and the context) until the response
//! arrives. It must not run on a tokio worker thread.

mod methods;
mod request;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

pub use request::{ExecuteStatus, HttpOptions, Request, Response};

use crate::callback::FunctionCallbackInfo;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::plugin::Module;
use crate::release::Reusable;
use crate::value::JsValue;
use methods::REQUEST_METHODS;

/// Builds the script object for a new request.
///
/// The object's `id` property is set after the builder returns.
pub type Builder = Arc<dyn Fn(&Context, &HttpAddon, &Request) -> Result<JsValue> + Send + Sync>;

const FINALIZATION_REGISTRY: &str = "new FinalizationRegistry((held) => { held.unload(held.id) })";

/// Attaches every request method to a plain object.
pub fn default_builder(ctx: &Context, addon: &HttpAddon, _request: &Request) -> Result<JsValue> {
    let object = ctx.new_object().ok_or(Error::ContextClosed)?;

    for (name, _) in REQUEST_METHODS {
        addon.attach(&object, name)?;
    }

    Ok(object)
}

struct AddonInner {
    options: HttpOptions,
    builder: Builder,
    requests: Mutex<HashMap<String, Arc<Mutex<Request>>>>,
    functions: Mutex<HashMap<&'static str, Arc<Reusable>>>,
}

/// The `HTTP` script object and the request table behind it.
///
/// One addon serves one context.
#[derive(Clone)]
pub struct HttpAddon {
    inner: Arc<AddonInner>,
}

impl HttpAddon {
    pub fn new(options: HttpOptions) -> Self {
        Self::with_builder(options, Arc::new(default_builder))
    }

    pub fn with_builder(options: HttpOptions, builder: Builder) -> Self {
        Self {
            inner: Arc::new(AddonInner {
                options,
                builder,
                requests: Mutex::new(HashMap::new()),
                functions: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn options(&self) -> &HttpOptions {
        &self.inner.options
    }

    /// Requests not yet unloaded.
    pub fn size(&self) -> usize {
        self.inner.requests.lock().len()
    }

    pub fn unload(&self, id: &str) {
        if self.inner.requests.lock().remove(id).is_some() {
            tracing::trace!(id, "Unloaded http request");
        }
    }

    /// Set the shared method `name` on `object`.
    pub fn attach(&self, object: &JsValue, name: &str) -> Result<()> {
        // Not held across `set`, which takes the context lock
        let function = self
            .inner
            .functions
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::host(format!("unknown request method {name}")))?;

        object.set(name, function.consume())
    }

    /// Build the `HTTP` object for `ctx`.
    pub fn convert(&self, ctx: &Context) -> Result<JsValue> {
        self.install_methods(ctx)?;

        let object = ctx.new_object().ok_or(Error::ContextClosed)?;

        let addon = self.clone();
        object.set_object_method("New", move |info| addon.new_request(info))?;
        object.set_object_method("ParseURL", parse_url)?;

        let addon = self.clone();
        object.set_object_method("unload", move |info| {
            addon.unload(&info.get_arg(0).string());
            Ok(None)
        })?;

        let addon = self.clone();
        object.set_object_method("Size", move |info| {
            Ok(info.context().new_int32(addon.size() as i32))
        })?;

        let registry = ctx.run_script(FINALIZATION_REGISTRY, "http-registry")?;
        object.set("FinalizationRegistry", registry.consume())?;

        Ok(object)
    }

    /// Release the shared methods and forget every request.
    pub fn dispose(&self) {
        let functions = std::mem::take(&mut *self.inner.functions.lock());
        dispose_all(functions);
        self.inner.requests.lock().clear();
    }

    /// A plugin module publishing the addon as the global `name`.
    ///
    /// Trusted domains come from the plugin options.
    pub fn module(name: impl Into<String>) -> Module {
        let name: Arc<str> = name.into().into();
        let global_name = name.clone();
        let slot: Arc<Mutex<Option<HttpAddon>>> = Arc::default();
        let closing = slot.clone();

        Module::new(name.as_ref())
            .on_init(move |plugin| {
                let addon = HttpAddon::new(HttpOptions::from(plugin.options()));
                let ctx = plugin.runtime()?;
                let object = addon.convert(ctx)?;
                let global = ctx.global().ok_or(Error::ContextClosed)?;
                global.set(&global_name, object.consume())?;

                *slot.lock() = Some(addon);
                Ok(())
            })
            .on_close(move |_| {
                if let Some(addon) = closing.lock().take() {
                    addon.dispose();
                }
                Ok(())
            })
    }

    fn install_methods(&self, ctx: &Context) -> Result<()> {
        let mut functions = HashMap::with_capacity(REQUEST_METHODS.len());

        for &(name, method) in REQUEST_METHODS {
            let addon = self.clone();
            let function = ctx
                .new_function(move |info| {
                    let request = addon.load(info)?;
                    let mut request = request.lock();
                    method(&addon, info, &mut request)
                })
                .ok_or(Error::ContextClosed)?;

            functions.insert(name, Arc::new(function.into_reusable()));
        }

        let previous = std::mem::replace(&mut *self.inner.functions.lock(), functions);
        dispose_all(previous);

        Ok(())
    }

    fn load(&self, info: &FunctionCallbackInfo) -> Result<Arc<Mutex<Request>>> {
        let id = info.this().get("id")?.string();

        self.inner
            .requests
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::host(format!("http request id {id} not found")))
    }

    fn new_request(&self, info: &FunctionCallbackInfo) -> Result<Option<JsValue>> {
        let ctx = info.context();
        let request = Request::new(info.get_arg(0).string(), info.get_arg(1).string());
        let id = request.id().to_string();

        let object = (self.inner.builder)(ctx, self, &request)?;

        let id_value = ctx.new_string(&id).ok_or(Error::ContextClosed)?;
        object.set("id", id_value.consume())?;

        let object = object.into_reusable();
        let held = self.held_value(ctx, info.this(), &id)?;
        let registry = info.this().get("FinalizationRegistry")?;
        registry.method_call("register", [object.consume(), held.consume()])?;

        // Only once `unload` is guaranteed to run for this id
        self.inner
            .requests
            .lock()
            .insert(id, Arc::new(Mutex::new(request)));

        Ok(Some(object.into_inner()))
    }

    /// `{ unload, id }` handed to the registry for the request `id`.
    fn held_value(&self, ctx: &Context, addon_object: &JsValue, id: &str) -> Result<JsValue> {
        let held = ctx.new_object().ok_or(Error::ContextClosed)?;
        held.set("unload", addon_object.get("unload")?.consume())?;
        held.set("id", ctx.new_string(id).ok_or(Error::ContextClosed)?.consume())?;
        Ok(held)
    }
}

impl fmt::Debug for HttpAddon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAddon")
            .field("options", &self.inner.options)
            .field("requests", &self.size())
            .finish()
    }
}

/// A method still lent to an in-flight `attach` is released by its last holder.
fn dispose_all(functions: HashMap<&'static str, Arc<Reusable>>) {
    for (_, function) in functions {
        if let Ok(function) = Arc::try_unwrap(function) {
            function.dispose();
        }
    }
}

/// Components of a URL, or `undefined` when it does not parse.
fn parse_url(info: &FunctionCallbackInfo) -> Result<Option<JsValue>> {
    let Ok(url) = Url::parse(&info.get_arg(0).string()) else {
        return Ok(None);
    };

    let ctx = info.context();
    let result = ctx.new_object().ok_or(Error::ContextClosed)?;
    let port = url.port().map(|port| port.to_string()).unwrap_or_default();

    let fields = [
        ("Host", request::authority(&url)),
        ("Hostname", url.host_str().unwrap_or_default().to_string()),
        ("Scheme", url.scheme().to_string()),
        ("Path", url.path().to_string()),
        ("Query", url.query().unwrap_or_default().to_string()),
        ("User", url.username().to_string()),
        ("Password", url.password().unwrap_or_default().to_string()),
        ("Port", port),
        ("Fragment", url.fragment().unwrap_or_default().to_string()),
    ];

    for (key, value) in fields {
        let value = ctx.new_string(&value).ok_or(Error::ContextClosed)?;
        result.set(key, value.consume())?;
    }

    Ok(Some(result))
}
