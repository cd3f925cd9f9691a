// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Plugin registry
//!
//! Resolves identifiers to plugin instances, either from the built-in table or by
//! loading a dynamic module through `libloading`, and owns every instance until
//! [`PluginRegistry::unload_all`].
//!
//! The key table lock is held only to look entries up, add them or remove them.
//! Each plugin sits in its own slot, locked while its code runs, so a slow
//! `connect` stalls nothing but that plugin. Opening and closing modules is
//! serialized by a separate lock.
//!
//! Each plugin receives a bus handle scoped to it. Unloading a plugin removes its
//! subscriptions before its module is released, so no callback can outlive the code
//! it points into.

use super::builtin::{builtin_factories, Factory};
use super::{CreateFn, DestroyFn, Plugin, PluginBox, PluginType, CREATE_SYMBOL, DESTROY_SYMBOL};
use crate::bus::MessageBus;
use crate::sensor::Sensor;
use crate::tls::TlsContext;
use crate::{Error, Result};
use libloading::Library;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of dispatching a plugin on its declared type
pub enum Activation {
    /// Created but not started
    Sensor(Box<dyn Sensor>),
    Logger,
    Adapter { connected: bool },
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Sensor(sensor) => f.debug_tuple("Sensor").field(&sensor.name()).finish(),
            Activation::Logger => write!(f, "Logger"),
            Activation::Adapter { connected } => f
                .debug_struct("Adapter")
                .field("connected", connected)
                .finish(),
        }
    }
}

/// Outcome of [`PluginRegistry::activate`]
#[derive(Debug)]
pub struct Activated {
    /// Key after initialization; follows a name the plugin took from its config
    pub key: String,
    pub activation: Activation,
}

enum Instance {
    Builtin(PluginBox),
    Dynamic {
        plugin: Box<PluginBox>,
        destroy: DestroyFn,
        library: Library,
    },
}

impl Instance {
    fn plugin(&self) -> &dyn Plugin {
        match self {
            Instance::Builtin(plugin) => &**plugin,
            Instance::Dynamic { plugin, .. } => &***plugin,
        }
    }

    fn plugin_mut(&mut self) -> &mut dyn Plugin {
        match self {
            Instance::Builtin(plugin) => &mut **plugin,
            Instance::Dynamic { plugin, .. } => &mut ***plugin,
        }
    }
}

struct LoadedPlugin {
    identifier: String,
    owner: u64,
    /// None once released
    instance: Option<Instance>,
    bus: Option<MessageBus>,
    initialized: bool,
}

impl LoadedPlugin {
    fn plugin_mut(&mut self) -> Option<&mut dyn Plugin> {
        self.instance.as_mut().map(Instance::plugin_mut)
    }
}

type Slot = Arc<Mutex<LoadedPlugin>>;

struct Entry {
    key: String,
    plugin_type: PluginType,
    slot: Slot,
}

pub struct PluginRegistry {
    entries: Mutex<Vec<Entry>>,
    modules: Mutex<()>,
    builtins: HashMap<String, Factory>,
    next_owner: AtomicU64,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Registry without built-ins; every identifier is treated as a module path
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            modules: Mutex::new(()),
            builtins: HashMap::new(),
            next_owner: AtomicU64::new(1),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (identifier, factory) in builtin_factories() {
            registry.register_builtin(identifier, factory);
        }
        registry
    }

    pub fn register_builtin(&mut self, identifier: impl Into<String>, factory: Factory) {
        self.builtins.insert(identifier.into(), factory);
    }

    /// Resolve `identifier` and keep the new instance
    ///
    /// Returns the key the plugin is registered under: its declared name, suffixed
    /// with `#2`, `#3`, ... when that name is already taken.
    pub fn load(&self, identifier: &str) -> Result<String> {
        let instance = {
            let _modules = self.modules.lock();
            match self.builtins.get(identifier) {
                Some(factory) => Instance::Builtin(factory()),
                None => load_module(identifier)?,
            }
        };
        let name = instance.plugin().name().to_string();
        let plugin_type = instance.plugin().plugin_type();

        let slot = Arc::new(Mutex::new(LoadedPlugin {
            identifier: identifier.to_string(),
            owner: self.next_owner.fetch_add(1, Ordering::Relaxed),
            instance: Some(instance),
            bus: None,
            initialized: false,
        }));

        let key = {
            let mut entries = self.entries.lock();
            let taken: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
            let key = unique_key(&taken, &name);
            entries.push(Entry {
                key: key.clone(),
                plugin_type,
                slot,
            });
            key
        };

        info!(plugin = %key, identifier, plugin_type = %plugin_type, "Plugin loaded");
        Ok(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().iter().any(|e| e.key == key)
    }

    /// Keys of all loaded plugins in load order
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn plugin_type(&self, key: &str) -> Option<PluginType> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.plugin_type)
    }

    /// Run `f` against the plugin registered as `key`
    ///
    /// Waits while that plugin is being activated.
    pub fn with_plugin<R>(&self, key: &str, f: impl FnOnce(&mut dyn Plugin) -> R) -> Option<R> {
        let slot = self.slot(key)?;
        let mut loaded = slot.lock();
        loaded.plugin_mut().map(f)
    }

    fn slot(&self, key: &str) -> Option<Slot> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.key == key)
            .map(|e| Arc::clone(&e.slot))
    }

    /// Initialize the plugin and dispatch on its declared type
    ///
    /// Sensor plugins produce an unstarted sensor, Adapter plugins are connected with
    /// `tls`, Logger plugins need nothing further. A failed connect is logged and
    /// reported as `connected: false`. The plugin receives the caller's current
    /// `tracing` dispatcher before it is initialized.
    pub fn activate(
        &self,
        key: &str,
        bus: &MessageBus,
        config: &Value,
        tls: Option<&TlsContext>,
    ) -> Result<Activated> {
        let not_found = || Error::PluginNotFound(key.to_string());
        let slot = self.slot(key).ok_or_else(not_found)?;
        let mut loaded = slot.lock();

        if loaded.initialized {
            return Err(Error::Internal(format!("plugin {} already initialized", key)));
        }

        let logger = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
        let scoped = bus.scoped(loaded.owner);
        loaded.bus = Some(scoped.clone());
        {
            let plugin = loaded.plugin_mut().ok_or_else(not_found)?;
            plugin.set_logger(&logger);
            plugin.initialize(&scoped, config)?;
        }
        loaded.initialized = true;
        debug!(plugin = %key, "Plugin initialized");

        let plugin = loaded.plugin_mut().ok_or_else(not_found)?;
        let name = plugin.name().to_string();
        let activation = match plugin.plugin_type() {
            PluginType::Sensor => Activation::Sensor(plugin.create_instance(&scoped, config)?),
            PluginType::Logger => Activation::Logger,
            PluginType::Adapter => {
                let connected = match plugin.connect(tls) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(plugin = %key, "Adapter not connected: {}", e);
                        false
                    }
                };
                Activation::Adapter { connected }
            }
        };

        let key = self.rekey(&slot, key, &name);
        Ok(Activated { key, activation })
    }

    /// Move the entry to the name the plugin declares after initialization
    fn rekey(&self, slot: &Slot, key: &str, name: &str) -> String {
        let current = match key.strip_prefix(name) {
            Some(rest) => rest.is_empty() || rest.starts_with('#'),
            None => false,
        };
        if current {
            return key.to_string();
        }

        let mut entries = self.entries.lock();
        let taken: Vec<&str> = entries
            .iter()
            .filter(|e| !Arc::ptr_eq(&e.slot, slot))
            .map(|e| e.key.as_str())
            .collect();
        let renamed = unique_key(&taken, name);
        match entries.iter_mut().find(|e| Arc::ptr_eq(&e.slot, slot)) {
            Some(entry) => {
                info!(from = %key, to = %renamed, "Plugin renamed by configuration");
                entry.key = renamed.clone();
                renamed
            }
            // Unloaded while activating
            None => key.to_string(),
        }
    }

    /// Unload one plugin; returns whether it was loaded
    pub fn unload(&self, key: &str) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.iter().position(|e| e.key == key) {
                Some(index) => entries.remove(index),
                None => return false,
            }
        };
        self.release(entry);
        true
    }

    /// Shut down and release every plugin; safe to repeat
    ///
    /// A plugin that is mid-activation is released once its activation returns.
    pub fn unload_all(&self) {
        let drained: Vec<Entry> = self.entries.lock().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        let count = drained.len();
        for entry in drained {
            self.release(entry);
        }
        info!(count, "All plugins unloaded");
    }

    /// Shut down, detach from the bus, then destroy and close the module
    fn release(&self, entry: Entry) {
        let mut loaded = entry.slot.lock();
        if loaded.initialized {
            if let Some(plugin) = loaded.plugin_mut() {
                plugin.shutdown();
            }
            loaded.initialized = false;
        }
        if let Some(bus) = loaded.bus.take() {
            bus.remove_owner(loaded.owner);
        }
        let Some(instance) = loaded.instance.take() else {
            return;
        };

        let _modules = self.modules.lock();
        match instance {
            Instance::Builtin(plugin) => drop(plugin),
            Instance::Dynamic {
                plugin,
                destroy,
                library,
            } => {
                // SAFETY: the pointer came from this module's create symbol and is
                // handed back exactly once, before the module is closed
                unsafe { destroy(Box::into_raw(plugin)) };
                drop(library);
            }
        }
        info!(plugin = %entry.key, identifier = %loaded.identifier, "Plugin unloaded");
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.unload_all();
    }
}

fn unique_key(taken: &[&str], name: &str) -> String {
    let is_taken = |candidate: &str| taken.contains(&candidate);
    if !is_taken(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{}#{}", name, n))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn load_module(identifier: &str) -> Result<Instance> {
    // SAFETY: loading runs the module's initializers; modules are trusted gateway plugins
    let library = unsafe { Library::new(identifier) }
        .map_err(|e| Error::ModuleNotFound(format!("{}: {}", identifier, e)))?;

    let symbol_error = |symbol: &str| Error::SymbolNotFound {
        module: identifier.to_string(),
        symbol: symbol.to_string(),
    };

    // SAFETY: symbol types follow the module ABI documented in `plugins`
    let (create, destroy) = unsafe {
        let create: CreateFn = *library
            .get::<CreateFn>(CREATE_SYMBOL.as_bytes())
            .map_err(|_| symbol_error(CREATE_SYMBOL))?;
        let destroy: DestroyFn = *library
            .get::<DestroyFn>(DESTROY_SYMBOL.as_bytes())
            .map_err(|_| symbol_error(DESTROY_SYMBOL))?;
        (create, destroy)
    };

    // SAFETY: create takes no arguments and returns an owned pointer or null
    let raw = unsafe { create() };
    if raw.is_null() {
        return Err(Error::InstantiationFailed(format!(
            "{} returned no instance",
            identifier
        )));
    }

    Ok(Instance::Dynamic {
        // SAFETY: non-null pointer produced by Box::into_raw in the module
        plugin: unsafe { Box::from_raw(raw) },
        destroy,
        library,
    })
}
