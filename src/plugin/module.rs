//! Plugin modules: host extensions with init/boot/close hooks.

use std::fmt;

use super::Plugin;
use crate::error::Result;

/// A host extension attached to a [`Plugin`].
///
/// Init and boot hooks run in registration order, close hooks in reverse.
pub trait PluginModule: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self, _plugin: &mut Plugin) -> Result<()> {
        Ok(())
    }

    fn boot(&self, _plugin: &mut Plugin) -> Result<()> {
        Ok(())
    }

    fn close(&self, _plugin: &mut Plugin) -> Result<()> {
        Ok(())
    }
}

type Hook = Box<dyn Fn(&mut Plugin) -> Result<()> + Send + Sync>;

/// A [`PluginModule`] assembled from closures.
///
/// ```no_run
/// use v8js::plugin::{Initializer, Module, PluginOptions};
///
/// let module = Module::new("greeter").on_init(|plugin| {
///     let ctx = plugin.runtime()?;
///     let greeting = ctx.new_string("hello").unwrap();
///     plugin.add_builtin("greeting", greeting);
///     Ok(())
/// });
///
/// let mut initializer = Initializer::new();
/// initializer.modules.push(std::sync::Arc::new(module));
/// let mut plugin = initializer.create_plugin(PluginOptions::default());
/// plugin.launch().unwrap();
/// ```
pub struct Module {
    name: String,
    init: Option<Hook>,
    boot: Option<Hook>,
    close: Option<Hook>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init: None,
            boot: None,
            close: None,
        }
    }

    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Plugin) -> Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Box::new(hook));
        self
    }

    pub fn on_boot<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Plugin) -> Result<()> + Send + Sync + 'static,
    {
        self.boot = Some(Box::new(hook));
        self
    }

    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Plugin) -> Result<()> + Send + Sync + 'static,
    {
        self.close = Some(Box::new(hook));
        self
    }
}

impl PluginModule for Module {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, plugin: &mut Plugin) -> Result<()> {
        self.init.as_ref().map_or(Ok(()), |hook| hook(plugin))
    }

    fn boot(&self, plugin: &mut Plugin) -> Result<()> {
        self.boot.as_ref().map_or(Ok(()), |hook| hook(plugin))
    }

    fn close(&self, plugin: &mut Plugin) -> Result<()> {
        self.close.as_ref().map_or(Ok(()), |hook| hook(plugin))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("init", &self.init.is_some())
            .field("boot", &self.boot.is_some())
            .field("close", &self.close.is_some())
            .finish()
    }
}
