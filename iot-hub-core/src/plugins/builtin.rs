// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Plugins compiled into the gateway

use super::{Plugin, PluginBox, PluginType};
use crate::adapters::{HttpAdapter, MqttAdapter};
use crate::bus::MessageBus;
use crate::lin::{LinGatewaySensor, LinSensorSettings};
use crate::message::Message;
use crate::sensor::Sensor;
use crate::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Constructor registered under a built-in identifier
pub type Factory = fn() -> PluginBox;

/// Built-in identifiers and their constructors
pub fn builtin_factories() -> Vec<(&'static str, Factory)> {
    vec![
        ("LoggingPlugin", new_logging as Factory),
        ("FileSinkPlugin", new_file_sink as Factory),
        ("LinSensor", new_lin_sensor as Factory),
        ("MQTTAdapter", new_mqtt as Factory),
        ("HTTPAdapter", new_http as Factory),
    ]
}

fn new_logging() -> PluginBox {
    Box::new(LoggingPlugin::default())
}

fn new_file_sink() -> PluginBox {
    Box::new(FileSinkPlugin::default())
}

fn new_lin_sensor() -> PluginBox {
    Box::new(LinSensorPlugin::default())
}

fn new_mqtt() -> PluginBox {
    Box::new(MqttAdapter::default())
}

fn new_http() -> PluginBox {
    Box::new(HttpAdapter::default())
}

fn configured_name(config: &Value) -> Option<String> {
    config.get("name").and_then(Value::as_str).map(str::to_string)
}

/// Logs every message at INFO
pub struct LoggingPlugin {
    name: String,
    active: Arc<AtomicBool>,
}

impl Default for LoggingPlugin {
    fn default() -> Self {
        Self {
            name: "LoggingPlugin".to_string(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Plugin for LoggingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Logger
    }

    fn initialize(&mut self, bus: &MessageBus, config: &Value) -> Result<()> {
        if let Some(name) = configured_name(config) {
            self.name = name;
        }
        self.active.store(true, Ordering::Release);

        let active = Arc::clone(&self.active);
        let name = self.name.clone();
        bus.subscribe(move |msg: &Message| {
            if active.load(Ordering::Acquire) {
                info!(
                    plugin = %name,
                    source = %msg.source_id(),
                    topic = %msg.topic(),
                    payload = %msg.payload(),
                    "Message received"
                );
            }
        });
        Ok(())
    }

    fn shutdown(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Appends `<source_id>: <payload-json>` lines to a file
pub struct FileSinkPlugin {
    name: String,
    path: Option<PathBuf>,
    file: Arc<Mutex<Option<File>>>,
}

impl Default for FileSinkPlugin {
    fn default() -> Self {
        Self {
            name: "FileSinkPlugin".to_string(),
            path: None,
            file: Arc::new(Mutex::new(None)),
        }
    }
}

impl FileSinkPlugin {
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

impl Plugin for FileSinkPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Logger
    }

    fn initialize(&mut self, bus: &MessageBus, config: &Value) -> Result<()> {
        if let Some(name) = configured_name(config) {
            self.name = name;
        }
        let path = config
            .get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or_else(|| Error::Config(format!("{}: 'path' is required", self.name)))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        *self.file.lock() = Some(file);
        info!(plugin = %self.name, path = %path.display(), "File sink opened");
        self.path = Some(path);

        let sink = Arc::clone(&self.file);
        let name = self.name.clone();
        bus.subscribe(move |msg: &Message| {
            let mut guard = sink.lock();
            let Some(file) = guard.as_mut() else {
                return;
            };
            if let Err(e) = writeln!(file, "{}: {}", msg.source_id(), msg.payload()) {
                warn!(plugin = %name, topic = %msg.topic(), "File sink write failed: {}", e);
            }
        });
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut file) = self.file.lock().take() {
            if let Err(e) = file.flush() {
                warn!(plugin = %self.name, "File sink flush failed: {}", e);
            }
        }
    }
}

/// Factory for scheduled LIN gateway sensors
pub struct LinSensorPlugin {
    name: String,
}

impl Default for LinSensorPlugin {
    fn default() -> Self {
        Self {
            name: "LinSensor".to_string(),
        }
    }
}

impl Plugin for LinSensorPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Sensor
    }

    fn initialize(&mut self, _bus: &MessageBus, config: &Value) -> Result<()> {
        LinSensorSettings::from_value(config)?;
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn create_instance(&self, bus: &MessageBus, config: &Value) -> Result<Box<dyn Sensor>> {
        let settings = LinSensorSettings::from_value(config)?;
        Ok(Box::new(LinGatewaySensor::from_settings(bus.clone(), settings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_identifiers_unique() {
        let factories = builtin_factories();
        let mut ids: Vec<_> = factories.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), factories.len());

        for (id, factory) in factories {
            let plugin = factory();
            assert_eq!(plugin.name(), id);
        }
    }

    #[test]
    fn test_file_sink_writes_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out/messages.log");
        let bus = MessageBus::new();

        let mut sink = FileSinkPlugin::default();
        sink.initialize(&bus, &json!({"path": path.to_str().unwrap()}))
            .unwrap();
        bus.publish(Message::new("LIN_GATEWAY", "lin/16/signals", json!({"t": 1})));
        bus.publish(Message::new("uplink", "cmd/x", json!("on")));
        sink.shutdown();
        bus.publish(Message::new("late", "t", json!(null)));

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "LIN_GATEWAY: {\"t\":1}\nuplink: \"on\"\n");
    }

    #[test]
    fn test_file_sink_requires_path() {
        let mut sink = FileSinkPlugin::default();
        let result = sink.initialize(&MessageBus::new(), &json!({}));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_logging_plugin_takes_configured_name() {
        let bus = MessageBus::new();
        let mut plugin = LoggingPlugin::default();
        plugin.initialize(&bus, &json!({"name": "audit"})).unwrap();
        assert_eq!(plugin.name(), "audit");
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(Message::new("s", "t", json!(1)));
        plugin.shutdown();
    }

    #[test]
    fn test_lin_plugin_creates_stopped_sensor() {
        let bus = MessageBus::new();
        let config = json!({
            "schedule": [{"id": 16, "period_ms": 100}],
            "signals": [{"frame_id": 16, "name": "temp_c", "byte": 0, "type": "u8"}]
        });

        let mut plugin = LinSensorPlugin::default();
        plugin.initialize(&bus, &config).unwrap();
        let sensor = plugin.create_instance(&bus, &config).unwrap();
        assert_eq!(sensor.name(), "LIN_GATEWAY");
        assert!(!sensor.is_running());
    }

    #[test]
    fn test_lin_plugin_rejects_bad_schedule() {
        let mut plugin = LinSensorPlugin::default();
        let result = plugin.initialize(
            &MessageBus::new(),
            &json!({"schedule": [{"id": 16, "period_ms": 0}]}),
        );
        assert!(result.is_err());
    }
}
