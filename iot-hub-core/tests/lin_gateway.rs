// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Scheduled LIN frames flowing through the bus

use iot_hub_core::lin::{LinGatewaySensor, LinSensorSettings};
use iot_hub_core::{Message, MessageBus, Result, Sensor};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn collect(bus: &MessageBus) -> Arc<Mutex<Vec<Message>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(move |msg| sink.lock().push(msg.clone()));
    seen
}

#[test]
fn scheduled_frame_reaches_bus_at_its_period() {
    let bus = MessageBus::new();
    let seen = collect(&bus);

    let settings = LinSensorSettings::from_value(&json!({
        "schedule": [{"id": 16, "period_ms": 100}],
        "signals": [
            {"frame_id": 16, "name": "temp_c", "byte": 0, "len": 1, "type": "u8", "scale": 1.0, "offset": 0.0},
            {"frame_id": 16, "name": "humidity", "byte": 1, "len": 1, "type": "u8"}
        ]
    }))
    .unwrap();

    let source = |_: u8| -> Result<Vec<u8>> { Ok(vec![25, 60, 0, 0, 0, 0, 0, 0]) };
    let mut sensor = LinGatewaySensor::new(bus.clone(), settings, Box::new(source)).unwrap();

    sensor.start().unwrap();
    thread::sleep(Duration::from_millis(350));
    sensor.stop();

    let seen = seen.lock();
    assert!(
        (3..=4).contains(&seen.len()),
        "expected 3 or 4 messages, got {}",
        seen.len()
    );
    for msg in seen.iter() {
        assert_eq!(msg.topic(), "lin/16/signals");
        assert_eq!(msg.payload()["signals"]["temp_c"].as_f64(), Some(25.0));
        assert_eq!(msg.payload()["signals"]["humidity"].as_f64(), Some(60.0));
        assert_eq!(msg.payload()["frame_id"], 16);
        assert_eq!(msg.payload()["source"], "LIN");
    }
}

#[test]
fn simulated_driver_and_frames_without_signals() {
    let bus = MessageBus::new();
    let seen = collect(&bus);

    // Frame 17 has no signal specs and must never be published
    let settings = LinSensorSettings::from_value(&json!({
        "name": "body-lin",
        "protocol": "lin2",
        "schedule": [{"id": 16, "period_ms": 30}, {"id": 17, "period_ms": 30}],
        "signals": [{"frame_id": 16, "name": "temp_c", "byte": 0, "type": "u8"}]
    }))
    .unwrap();
    let mut sensor = LinGatewaySensor::from_settings(bus.clone(), settings).unwrap();
    let metrics = sensor.metrics();

    sensor.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    sensor.stop();

    let seen = seen.lock();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|m| m.topic() == "lin2/16/signals"));
    assert!(seen.iter().all(|m| m.source_id() == "body-lin"));
    assert_eq!(seen[0].payload()["signals"]["temp_c"].as_f64(), Some(26.0));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.frames_published, seen.len() as u64);
    assert!(snapshot.frames_empty >= 1);
}

#[test]
fn stopped_sensor_publishes_nothing_more() {
    let bus = MessageBus::new();
    let seen = collect(&bus);

    let settings = LinSensorSettings::from_value(&json!({
        "schedule": [{"id": 3, "period_ms": 10}],
        "signals": [{"frame_id": 3, "name": "on", "byte": 2, "type": "bool"}]
    }))
    .unwrap();
    let source = |_: u8| -> Result<Vec<u8>> { Ok(vec![0, 0, 1]) };
    let mut sensor = LinGatewaySensor::new(bus.clone(), settings, Box::new(source)).unwrap();

    sensor.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    sensor.stop();
    let count = seen.lock().len();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(seen.lock().len(), count);
    assert!(!sensor.is_running());
}
