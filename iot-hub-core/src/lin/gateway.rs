// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Gateway sensor: scheduler + frame source + normalizer feeding the bus
//!
//! One thread per sensor repeatedly asks the scheduler which frames are due, requests
//! each due frame from the source, decodes it and publishes one message per frame on
//! `<protocol>/<frame_id>/signals`. Frames that decode to no signals are not published.
//! A short fixed sleep between polls bounds CPU use.

use super::frame::LinFrame;
use super::normalizer::{LinNormalizer, SignalSpec};
use super::scheduler::{LinScheduler, ScheduleConfig};
use super::source::{FrameSource, SimulatedLinBus};
use crate::bus::MessageBus;
use crate::message::Message;
use crate::metrics::Metrics;
use crate::sensor::Sensor;
use crate::{Error, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// `config` object of a `LinSensor` plugin entry
#[derive(Debug, Clone, Deserialize)]
pub struct LinSensorSettings {
    /// Source id stamped on published messages
    #[serde(default = "default_name")]
    pub name: String,

    /// Topic prefix, e.g. `lin` in `lin/16/signals`
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// `source` field of the decoded payload
    #[serde(default = "default_source")]
    pub source: String,

    /// Sleep between scheduler polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Frame source implementation; only `sim` is built in
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Seed for the simulated driver
    #[serde(default)]
    pub seed: Option<u64>,

    pub schedule: Vec<ScheduleConfig>,

    #[serde(default)]
    pub signals: Vec<SignalSpec>,
}

impl LinSensorSettings {
    pub fn from_value(config: &serde_json::Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(config.clone())
            .map_err(|e| Error::Config(format!("Invalid LIN sensor configuration: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.is_empty() {
            return Err(Error::Config("LIN sensor schedule is empty".to_string()));
        }
        if let Some(entry) = self.schedule.iter().find(|entry| entry.period_ms == 0) {
            return Err(Error::Config(format!(
                "schedule entry for frame {} has a zero period",
                entry.id
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_name() -> String {
    "LIN_GATEWAY".to_string()
}

fn default_protocol() -> String {
    "lin".to_string()
}

fn default_source() -> String {
    "LIN".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_driver() -> String {
    "sim".to_string()
}

/// Single poll step, owned by the sensor thread
struct PollLoop {
    name: String,
    protocol: String,
    scheduler: LinScheduler,
    source: Box<dyn FrameSource>,
    normalizer: LinNormalizer,
    bus: MessageBus,
    metrics: Metrics,
}

impl PollLoop {
    /// Request, decode and publish every frame due at `now`; returns messages published
    fn tick(&mut self, now: Instant) -> usize {
        let mut published = 0;
        for frame_id in self.scheduler.due_frames(now) {
            self.metrics.record_frame_polled();
            let payload = match self.source.request_frame(frame_id) {
                Ok(payload) => payload,
                Err(e) => {
                    self.metrics.record_source_error();
                    warn!(sensor = %self.name, frame_id, "Frame request failed: {}", e);
                    continue;
                }
            };

            let decoded = self
                .normalizer
                .normalize(&LinFrame::from_payload(frame_id, &payload));
            if decoded.is_empty() {
                self.metrics.record_frame_empty();
                debug!(sensor = %self.name, frame_id, "Frame produced no signals");
                continue;
            }

            let topic = format!("{}/{}/signals", self.protocol, frame_id);
            self.bus
                .publish(Message::new(self.name.as_str(), topic, decoded.into_payload()));
            self.metrics.record_frame_published();
            published += 1;
        }
        published
    }

    fn run(mut self, running: Arc<AtomicBool>, poll_interval: Duration) {
        info!(sensor = %self.name, "LIN gateway loop started");
        while running.load(Ordering::Acquire) {
            self.tick(Instant::now());
            thread::sleep(poll_interval);
        }
        info!(sensor = %self.name, "LIN gateway loop stopped");
    }
}

/// Sensor driving a periodic binary bus
pub struct LinGatewaySensor {
    name: String,
    protocol: String,
    poll_interval: Duration,
    schedule: Vec<ScheduleConfig>,
    pending: Option<(Box<dyn FrameSource>, LinNormalizer)>,
    bus: MessageBus,
    metrics: Metrics,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LinGatewaySensor {
    pub fn new(
        bus: MessageBus,
        settings: LinSensorSettings,
        source: Box<dyn FrameSource>,
    ) -> Result<Self> {
        settings.validate()?;

        if let Some(smallest) = settings.schedule.iter().map(|e| e.period_ms).min() {
            if settings.poll_interval_ms >= smallest {
                warn!(
                    sensor = %settings.name,
                    "Poll interval {} ms is not below the smallest period {} ms",
                    settings.poll_interval_ms,
                    smallest
                );
            }
        }

        let normalizer = LinNormalizer::new(settings.source.clone(), settings.signals.clone());
        Ok(Self {
            poll_interval: settings.poll_interval(),
            name: settings.name,
            protocol: settings.protocol,
            schedule: settings.schedule,
            pending: Some((source, normalizer)),
            bus,
            metrics: Metrics::new(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        })
    }

    /// Build the sensor with the frame source named by `settings.driver`
    pub fn from_settings(bus: MessageBus, settings: LinSensorSettings) -> Result<Self> {
        let source: Box<dyn FrameSource> = match settings.driver.as_str() {
            "sim" => Box::new(
                settings
                    .seed
                    .map(SimulatedLinBus::with_seed)
                    .unwrap_or_default(),
            ),
            other => {
                return Err(Error::Config(format!("Unknown LIN driver '{}'", other)));
            }
        };
        Self::new(bus, settings, source)
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }
}

impl Sensor for LinGatewaySensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<()> {
        let (source, normalizer) = self
            .pending
            .take()
            .ok_or_else(|| Error::Internal(format!("sensor {} already started", self.name)))?;

        let poll = PollLoop {
            name: self.name.clone(),
            protocol: self.protocol.clone(),
            scheduler: LinScheduler::from_config(&self.schedule, Instant::now())?,
            source,
            normalizer,
            bus: self.bus.clone(),
            metrics: self.metrics.clone(),
        };

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;
        let handle = thread::Builder::new()
            .name(format!("lin-{}", self.name))
            .spawn(move || poll.run(running, poll_interval))
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                Error::Io(e)
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(sensor = %self.name, "LIN gateway thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Acquire)
    }
}

impl Drop for LinGatewaySensor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lin::normalizer::ValueType;
    use parking_lot::Mutex;
    use serde_json::json;

    fn settings(schedule: Vec<ScheduleConfig>, signals: Vec<SignalSpec>) -> LinSensorSettings {
        LinSensorSettings {
            name: "LIN_GATEWAY".to_string(),
            protocol: "lin".to_string(),
            source: "LIN".to_string(),
            poll_interval_ms: 5,
            driver: "sim".to_string(),
            seed: None,
            schedule,
            signals,
        }
    }

    fn poll_loop(bus: &MessageBus, source: Box<dyn FrameSource>, specs: Vec<SignalSpec>) -> PollLoop {
        PollLoop {
            name: "LIN_GATEWAY".to_string(),
            protocol: "lin".to_string(),
            scheduler: LinScheduler::new([(16, Duration::from_millis(100))], Instant::now()),
            source,
            normalizer: LinNormalizer::new("LIN", specs),
            bus: bus.clone(),
            metrics: Metrics::new(),
        }
    }

    #[test]
    fn test_tick_publishes_on_protocol_topic() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(move |msg| seen.lock().push(msg.clone()));
        }

        let source = |_: u8| -> Result<Vec<u8>> { Ok(vec![25, 60, 0, 0, 0, 0, 0, 0]) };
        let mut poll = poll_loop(
            &bus,
            Box::new(source),
            vec![SignalSpec::new(16, "temp_c", 0, ValueType::U8, 1.0, 0.0)],
        );

        assert_eq!(poll.tick(Instant::now()), 1);
        let seen = seen.lock();
        assert_eq!(seen[0].topic(), "lin/16/signals");
        assert_eq!(seen[0].source_id(), "LIN_GATEWAY");
        assert_eq!(seen[0].payload()["signals"]["temp_c"].as_f64(), Some(25.0));
    }

    #[test]
    fn test_empty_decode_not_published() {
        let bus = MessageBus::new();
        let count = Arc::new(Mutex::new(0));
        {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| *count.lock() += 1);
        }

        let source = |_: u8| -> Result<Vec<u8>> { Ok(vec![1, 2]) };
        let mut poll = poll_loop(
            &bus,
            Box::new(source),
            vec![SignalSpec::new(16, "far", 6, ValueType::U16, 1.0, 0.0)],
        );

        assert_eq!(poll.tick(Instant::now()), 0);
        assert_eq!(*count.lock(), 0);
        assert_eq!(poll.metrics.snapshot().frames_empty, 1);
    }

    #[test]
    fn test_source_error_skips_frame() {
        let bus = MessageBus::new();
        let source = |_: u8| -> Result<Vec<u8>> { Err(Error::Transport("timeout".into())) };
        let mut poll = poll_loop(
            &bus,
            Box::new(source),
            vec![SignalSpec::new(16, "t", 0, ValueType::U8, 1.0, 0.0)],
        );

        assert_eq!(poll.tick(Instant::now()), 0);
        assert_eq!(poll.metrics.snapshot().source_errors, 1);
    }

    #[test]
    fn test_start_twice_fails_and_stop_is_idempotent() {
        let bus = MessageBus::new();
        let mut sensor = LinGatewaySensor::from_settings(
            bus,
            settings(
                vec![ScheduleConfig { id: 16, period_ms: 50 }],
                vec![SignalSpec::new(16, "t", 0, ValueType::U8, 1.0, 0.0)],
            ),
        )
        .unwrap();

        sensor.start().unwrap();
        assert!(sensor.is_running());
        assert!(sensor.start().is_err());
        sensor.stop();
        sensor.stop();
        assert!(!sensor.is_running());
    }

    #[test]
    fn test_settings_validation() {
        assert!(LinSensorSettings::from_value(&json!({"schedule": []})).is_err());
        assert!(
            LinSensorSettings::from_value(&json!({"schedule": [{"id": 1, "period_ms": 0}]}))
                .is_err()
        );

        let settings = LinSensorSettings::from_value(&json!({
            "schedule": [{"id": 16, "period_ms": 100}],
            "signals": [{"frame_id": 16, "name": "temp_c", "byte": 0, "len": 1, "type": "u8"}]
        }))
        .unwrap();
        assert_eq!(settings.protocol, "lin");
        assert_eq!(settings.poll_interval_ms, 5);
        assert_eq!(settings.signals.len(), 1);
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let mut s = settings(vec![ScheduleConfig { id: 1, period_ms: 10 }], vec![]);
        s.driver = "uart".to_string();
        assert!(LinGatewaySensor::from_settings(MessageBus::new(), s).is_err());
    }
}
