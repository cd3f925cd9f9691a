// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Example dynamically loaded Logger plugin
//!
//! Counts messages per topic prefix and logs a summary every `report_every`
//! messages and at shutdown. Build with `cargo build -p iot-hub-counter-plugin` and
//! reference the produced library from a configuration entry:
//!
//! ```json
//! { "type": "MessageCounter", "module": "target/release/libiot_hub_counter_plugin.so",
//!   "config": { "report_every": 100 } }
//! ```

use iot_hub_core::{Message, MessageBus, Plugin, PluginType, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{dispatcher, info, Dispatch};

#[derive(Default)]
struct Tally {
    total: u64,
    by_prefix: BTreeMap<String, u64>,
}

impl Tally {
    fn record(&mut self, topic: &str) -> u64 {
        let prefix = topic.split('/').next().unwrap_or(topic);
        *self.by_prefix.entry(prefix.to_string()).or_insert(0) += 1;
        self.total += 1;
        self.total
    }
}

/// Run `f` with the host's subscriber; this module's own `tracing` has none
fn with_logger(logger: &Option<Dispatch>, f: impl FnOnce()) {
    match logger {
        Some(logger) => dispatcher::with_default(logger, f),
        None => f(),
    }
}

pub struct MessageCounter {
    name: String,
    tally: Arc<Mutex<Tally>>,
    logger: Option<Dispatch>,
}

impl Default for MessageCounter {
    fn default() -> Self {
        Self {
            name: "MessageCounter".to_string(),
            tally: Arc::new(Mutex::new(Tally::default())),
            logger: None,
        }
    }
}

impl MessageCounter {
    pub fn total(&self) -> u64 {
        self.tally.lock().total
    }
}

impl Plugin for MessageCounter {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Logger
    }

    fn set_logger(&mut self, logger: &Dispatch) {
        self.logger = Some(logger.clone());
    }

    fn initialize(&mut self, bus: &MessageBus, config: &Value) -> Result<()> {
        if let Some(name) = config.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        let report_every = config
            .get("report_every")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .unwrap_or(1000);

        let tally = Arc::clone(&self.tally);
        let name = self.name.clone();
        let logger = self.logger.clone();
        bus.subscribe(move |msg: &Message| {
            let mut tally = tally.lock();
            if tally.record(msg.topic()) % report_every == 0 {
                with_logger(&logger, || {
                    info!(plugin = %name, total = tally.total, by_prefix = ?tally.by_prefix, "Message count");
                });
            }
        });

        with_logger(&self.logger, || {
            info!(plugin = %self.name, report_every, "Message counter attached");
        });
        Ok(())
    }

    fn shutdown(&mut self) {
        let tally = self.tally.lock();
        with_logger(&self.logger, || {
            info!(plugin = %self.name, total = tally.total, by_prefix = ?tally.by_prefix, "Final message count");
        });
    }
}

iot_hub_core::declare_plugin!(MessageCounter);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;

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

    #[test]
    fn test_counts_messages() {
        let bus = MessageBus::new();
        let mut counter = MessageCounter::default();
        counter.initialize(&bus, &json!({"report_every": 2})).unwrap();

        bus.publish(Message::new("s", "lin/16/signals", json!(1)));
        bus.publish(Message::new("s", "lin/17/signals", json!(2)));
        bus.publish(Message::new("s", "cmd/reboot", json!(3)));

        assert_eq!(counter.total(), 3);
        let tally = counter.tally.lock();
        assert_eq!(tally.by_prefix.get("lin"), Some(&2));
        assert_eq!(tally.by_prefix.get("cmd"), Some(&1));
    }

    #[test]
    fn test_events_go_to_handed_logger() {
        let captured = Captured::default();
        let writer = captured.clone();
        let logger = Dispatch::new(
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish(),
        );

        // No default subscriber on this thread; output only arrives through `logger`
        let bus = MessageBus::new();
        let mut counter = MessageCounter::default();
        counter.set_logger(&logger);
        counter.initialize(&bus, &json!({"report_every": 1})).unwrap();
        bus.publish(Message::new("s", "lin/16/signals", json!(1)));
        counter.shutdown();

        let output = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(output.contains("Message counter attached"));
        assert!(output.contains("Message count"));
        assert!(output.contains("Final message count"));
        assert!(output.contains("total=1"));
    }

    #[test]
    fn test_exported_symbols_round_trip() {
        let raw = iot_hub_create_plugin();
        assert!(!raw.is_null());
        // SAFETY: pointer just produced by the create symbol
        let name = unsafe { (*raw).name().to_string() };
        assert_eq!(name, "MessageCounter");
        unsafe { iot_hub_destroy_plugin(raw) };
    }
}
