//! Plugin lifecycle: a script runtime extended by host modules.
//!
//! A [`Plugin`] moves through `init -> load -> boot -> close`:
//!
//! - `init` runs every module's init hook, then publishes the collected
//!   builtins as `globalThis[namespace]`.
//! - `load` evaluates the entry script from the plugin location.
//! - `boot` runs every module's boot hook, then the start command.
//! - `close` runs close hooks in reverse and tears the runtime down in the
//!   background.

mod module;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use module::{Module, PluginModule};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::options::ContextOptions;
use crate::value::JsValue;

/// Global property holding the builtins unless overridden.
pub const DEFAULT_NAMESPACE: &str = "system";

/// Where a plugin lives and what it may reach.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Directory the entry script is resolved against.
    pub location: PathBuf,

    /// Hosts (`host` or `host:port`) outbound HTTP may target. `*` allows any.
    pub trusted_domains: Vec<String>,
}

impl PluginOptions {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            trusted_domains: Vec::new(),
        }
    }
}

/// How a plugin is assembled.
#[derive(Default)]
pub struct Initializer {
    /// Entry script, relative to [`PluginOptions::location`].
    pub entry: Option<String>,

    /// Source evaluated at the end of boot.
    pub start_command: Option<String>,

    /// Skip publishing builtins.
    pub disable_builtin: bool,

    /// Global property for builtins; [`DEFAULT_NAMESPACE`] when unset.
    pub namespace: Option<String>,

    pub modules: Vec<Arc<dyn PluginModule>>,

    pub context: ContextOptions,
}

impl Initializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a runtime and bind it to a new plugin.
    pub fn create_plugin(self, options: PluginOptions) -> Plugin {
        let runtime = Context::open(self.context);

        Plugin {
            runtime: Some(runtime),
            options,
            entry: self.entry,
            start_command: self.start_command,
            disable_builtin: self.disable_builtin,
            namespace: self
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            modules: self.modules,
            builtin: HashMap::new(),
            phase: Phase::Created,
        }
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Initializer")
            .field("entry", &self.entry)
            .field("start_command", &self.start_command)
            .field("disable_builtin", &self.disable_builtin)
            .field("namespace", &self.namespace)
            .field("modules", &self.modules.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Initialized,
    Loaded,
    Booted,
    Closed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::Initialized => "initialized",
            Phase::Loaded => "loaded",
            Phase::Booted => "booted",
            Phase::Closed => "closed",
        }
    }
}

/// A script runtime plus the modules extending it.
pub struct Plugin {
    runtime: Option<Context>,
    options: PluginOptions,
    entry: Option<String>,
    start_command: Option<String>,
    disable_builtin: bool,
    namespace: String,
    modules: Vec<Arc<dyn PluginModule>>,
    builtin: HashMap<String, JsValue>,
    phase: Phase,
}

impl Plugin {
    pub fn runtime(&self) -> Result<&Context> {
        self.runtime.as_ref().ok_or(Error::ContextClosed)
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Register a builtin to publish under the namespace at the end of init.
    pub fn add_builtin(&mut self, name: impl Into<String>, value: JsValue) {
        if let Some(mut previous) = self.builtin.insert(name.into(), value) {
            previous.release();
        }
    }

    pub fn builtin(&self, name: &str) -> Option<&JsValue> {
        self.builtin.get(name)
    }

    pub fn init(&mut self) -> Result<()> {
        self.expect_phase(Phase::Created)?;

        for module in self.modules.clone() {
            tracing::debug!(module = module.name(), "Initializing plugin module");
            module.init(self)?;
        }

        if !self.disable_builtin {
            self.publish_builtins()?;
        }

        self.phase = Phase::Initialized;
        Ok(())
    }

    pub fn load(&mut self) -> Result<()> {
        self.expect_phase(Phase::Initialized)?;

        if let Some(entry) = self.entry.clone() {
            let path = self.options.location.join(&entry);
            let source = std::fs::read_to_string(&path)?;

            tracing::debug!(entry = %path.display(), "Loading plugin entry");
            self.runtime()?.run_script(&source, &entry)?;
        }

        self.phase = Phase::Loaded;
        Ok(())
    }

    pub fn boot(&mut self) -> Result<()> {
        self.expect_phase(Phase::Loaded)?;

        for module in self.modules.clone() {
            tracing::debug!(module = module.name(), "Booting plugin module");
            module.boot(self)?;
        }

        if let Some(command) = self.start_command.clone() {
            self.runtime()?.run_script(&command, "start")?;
        }

        self.phase = Phase::Booted;
        tracing::info!(namespace = %self.namespace, "Plugin booted");
        Ok(())
    }

    /// `init`, `load` and `boot` in a row.
    pub fn launch(&mut self) -> Result<()> {
        self.init()?;
        self.load()?;
        self.boot()
    }

    /// Run close hooks and tear the runtime down on a background thread.
    ///
    /// A failing close hook is logged and does not stop the others.
    pub fn close(&mut self) -> Result<std::thread::JoinHandle<()>> {
        let runtime = self.shutdown()?;

        let handle = std::thread::Builder::new()
            .name("v8js-plugin-close".to_string())
            .spawn(move || runtime.close())?;

        Ok(handle)
    }

    /// Like [`close`](Self::close), tearing down on the tokio blocking pool.
    pub fn close_async(&mut self) -> Result<tokio::task::JoinHandle<()>> {
        let tokio = tokio::runtime::Handle::try_current()
            .map_err(|err| Error::host(format!("no tokio runtime: {err}")))?;

        let runtime = self.shutdown()?;
        Ok(tokio.spawn_blocking(move || runtime.close()))
    }

    fn shutdown(&mut self) -> Result<Context> {
        if self.phase == Phase::Closed {
            return Err(Error::Phase {
                current: Phase::Closed.as_str(),
                expected: "open",
            });
        }

        for module in self.modules.clone().iter().rev() {
            if let Err(err) = module.close(self) {
                tracing::warn!(module = module.name(), error = %err, "Plugin module close failed");
            }
        }

        self.modules.clear();
        for (_, mut value) in self.builtin.drain() {
            value.release();
        }

        self.phase = Phase::Closed;
        self.runtime.take().ok_or(Error::ContextClosed)
    }

    fn publish_builtins(&mut self) -> Result<()> {
        let runtime = self.runtime()?.clone();
        let object = runtime.new_object().ok_or(Error::ContextClosed)?;

        for (name, value) in self.builtin.drain() {
            object.set(&name, value.consume())?;
        }

        let global = runtime.global().ok_or(Error::ContextClosed)?;
        global.set(&self.namespace, object.consume())
    }

    fn expect_phase(&self, expected: Phase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::Phase {
                current: self.phase.as_str(),
                expected: expected.as_str(),
            })
        }
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        if self.phase != Phase::Closed {
            if let Ok(runtime) = self.shutdown() {
                runtime.close();
            }
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("phase", &self.phase)
            .field("namespace", &self.namespace)
            .field("entry", &self.entry)
            .field("modules", &self.modules.len())
            .finish()
    }
}
