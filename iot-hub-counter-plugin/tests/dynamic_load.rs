// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! The counter loaded as a shared library through the registry

use iot_hub_core::plugins::{Activation, PluginRegistry};
use iot_hub_core::{Message, MessageBus, PluginType};
use parking_lot::Mutex;
use serde_json::json;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The cdylib cargo builds alongside this test binary
fn plugin_library() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap().to_path_buf();
    let file = libloading::library_filename("iot_hub_counter_plugin");
    let candidates = [deps.join(&file), deps.parent().unwrap().join(&file)];
    candidates
        .iter()
        .find(|path| path.exists())
        .cloned()
        .unwrap_or_else(|| panic!("{:?} not found near {}", file, deps.display()))
}

#[test]
fn load_activate_publish_and_unload() {
    let captured = Captured::default();
    let writer = captured.clone();
    let host = tracing::Dispatch::new(
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish(),
    );
    let library = plugin_library();

    tracing::dispatcher::with_default(&host, || {
        let registry = PluginRegistry::new();
        let bus = MessageBus::new();

        let key = registry.load(library.to_str().unwrap()).unwrap();
        assert_eq!(key, "MessageCounter");
        assert_eq!(registry.plugin_type(&key), Some(PluginType::Logger));

        let activated = registry
            .activate(&key, &bus, &json!({"report_every": 1}), None)
            .unwrap();
        assert!(matches!(activated.activation, Activation::Logger));
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(Message::new("LIN_GATEWAY", "lin/16/signals", json!({"temp_c": 25.0})));
        bus.publish(Message::new("LIN_GATEWAY", "lin/17/signals", json!({"door": true})));

        registry.unload_all();
        registry.unload_all();
        assert!(registry.is_empty());
        assert_eq!(bus.subscriber_count(), 0);

        // Nothing left that points into the closed module
        bus.publish(Message::new("LIN_GATEWAY", "lin/16/signals", json!({})));
    });

    let output = String::from_utf8(captured.0.lock().clone()).unwrap();
    assert!(output.contains("Plugin loaded"));
    assert!(output.contains("Message counter attached"));
    assert!(output.contains("Message count"));
    assert!(output.contains("total=2"));
    assert!(output.contains("Final message count"));
    assert!(output.contains("Plugin unloaded"));
}
