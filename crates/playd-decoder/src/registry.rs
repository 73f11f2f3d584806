//! Ordered catalogue of decoder plugins.
//!
//! Lookups return plugins in registration order. Each lookup yields a fresh iterator,
//! so callers can walk candidates one by one and "try the next" without keeping a
//! cursor.

use std::sync::Arc;

use crate::plugin::DecoderPlugin;

#[derive(Clone, Debug, Default)]
pub struct DecoderRegistry {
    plugins: Vec<Arc<DecoderPlugin>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in Symphonia backends.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for plugin in crate::plugins::builtin_plugins() {
            registry.register(plugin);
        }
        registry
    }

    /// Append a plugin. Registering a duplicate name is allowed but only the first
    /// registration is reachable through [`by_name`](Self::by_name).
    pub fn register(&mut self, plugin: DecoderPlugin) {
        if self.by_name(plugin.name()).is_some() {
            tracing::warn!(plugin = plugin.name(), "duplicate decoder plugin name");
        }
        self.plugins.push(Arc::new(plugin));
    }

    /// Keep only the plugins whose names are listed.
    pub fn retain_named(&mut self, names: &[String]) {
        self.plugins
            .retain(|p| names.iter().any(|n| n.eq_ignore_ascii_case(p.name())));
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecoderPlugin> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    /// Plugins claiming `mime`, in registration order. `None` matches nothing.
    pub fn by_mime_type<'a>(
        &'a self,
        mime: Option<&'a str>,
    ) -> impl Iterator<Item = &'a DecoderPlugin> + 'a {
        self.iter()
            .filter(move |p| mime.is_some_and(|m| p.supports_mime_type(m)))
    }

    /// Plugins claiming `suffix`, in registration order. `None` matches nothing.
    pub fn by_suffix<'a>(
        &'a self,
        suffix: Option<&'a str>,
    ) -> impl Iterator<Item = &'a DecoderPlugin> + 'a {
        self.iter()
            .filter(move |p| suffix.is_some_and(|s| p.supports_suffix(s)))
    }

    pub fn by_name(&self, name: &str) -> Option<&DecoderPlugin> {
        self.iter().find(|p| p.name() == name)
    }
}
