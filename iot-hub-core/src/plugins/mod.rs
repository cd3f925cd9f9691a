// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Plugin capability model
//!
//! Every plugin declares one [`PluginType`]. The registry routes on that tag alone:
//! Sensor plugins are asked for a [`Sensor`] instance, Adapter plugins are connected,
//! and Logger plugins are only initialized.
//!
//! # Module ABI
//!
//! A dynamically loaded module exports exactly two symbols, normally generated with
//! [`declare_plugin!`](crate::declare_plugin):
//!
//! - `iot_hub_create_plugin() -> *mut PluginBox`
//! - `iot_hub_destroy_plugin(*mut PluginBox)`
//!
//! The boxed trait object crosses the boundary as a thin pointer, so a module must be
//! built by the same compiler against the same `iot-hub-core` version as the host.

pub mod builtin;
pub mod registry;

pub use builtin::{FileSinkPlugin, LinSensorPlugin, LoggingPlugin};
pub use registry::{Activated, Activation, PluginRegistry};

use crate::bus::MessageBus;
use crate::sensor::Sensor;
use crate::tls::TlsContext;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Capability a plugin provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum PluginType {
    /// Produces messages through [`Sensor`] instances
    Sensor,
    /// Consumes messages for side effects only
    Logger,
    /// Bridges the bus to an external transport
    Adapter,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginType::Sensor => write!(f, "Sensor"),
            PluginType::Logger => write!(f, "Logger"),
            PluginType::Adapter => write!(f, "Adapter"),
        }
    }
}

/// Loadable unit of functionality
///
/// `initialize` is called exactly once before any other lifecycle call and
/// `shutdown` exactly once during teardown. Plugins are never re-initialized.
pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn plugin_type(&self) -> PluginType;

    fn initialize(&mut self, bus: &MessageBus, config: &Value) -> Result<()>;

    fn shutdown(&mut self);

    /// Sensor factory; the returned instance is not started
    fn create_instance(&self, _bus: &MessageBus, _config: &Value) -> Result<Box<dyn Sensor>> {
        Err(Error::Unsupported(format!(
            "{} plugin '{}' does not create sensors",
            self.plugin_type(),
            self.name()
        )))
    }

    /// Establish the external session, if the plugin has one
    fn connect(&mut self, _tls: Option<&TlsContext>) -> Result<()> {
        Ok(())
    }

    /// Host log subscriber, handed over before `initialize`
    ///
    /// Built-in plugins share the host's `tracing` and ignore it. A dynamically
    /// loaded module links its own `tracing` copy with no subscriber installed, so it
    /// must emit its events under `logger` (see [`tracing::dispatcher::with_default`]).
    fn set_logger(&mut self, _logger: &tracing::Dispatch) {}
}

/// What crosses the module boundary
pub type PluginBox = Box<dyn Plugin>;

pub const CREATE_SYMBOL: &str = "iot_hub_create_plugin";
pub const DESTROY_SYMBOL: &str = "iot_hub_destroy_plugin";

#[allow(improper_ctypes_definitions)]
pub type CreateFn = unsafe extern "C" fn() -> *mut PluginBox;

#[allow(improper_ctypes_definitions)]
pub type DestroyFn = unsafe extern "C" fn(*mut PluginBox);

/// Export a plugin type from a `cdylib` crate
///
/// The type must implement [`Plugin`] and [`Default`].
///
/// ```ignore
/// #[derive(Default)]
/// pub struct Counter { /* ... */ }
///
/// impl iot_hub_core::Plugin for Counter { /* ... */ }
///
/// iot_hub_core::declare_plugin!(Counter);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn iot_hub_create_plugin() -> *mut $crate::plugins::PluginBox {
            let plugin: $crate::plugins::PluginBox = Box::new(<$plugin_type>::default());
            Box::into_raw(Box::new(plugin))
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn iot_hub_destroy_plugin(ptr: *mut $crate::plugins::PluginBox) {
            if !ptr.is_null() {
                drop(Box::from_raw(ptr));
            }
        }
    };
}
