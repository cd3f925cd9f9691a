// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! MQTT bridge
//!
//! Outbound: every bus message not injected by this adapter is published under its
//! own topic with the JSON payload as body. Inbound: messages matching the configured
//! `topic` filter are decoded and published onto the bus with the adapter name as
//! source. While disconnected, outbound messages are dropped, never queued.

use super::decode_inbound;
use crate::bus::MessageBus;
use crate::message::Message;
use crate::metrics::Metrics;
use crate::plugins::{Plugin, PluginType};
use crate::tls::TlsContext;
use crate::{Error, Result};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rumqttc::{
    Client, Connection, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_CAPACITY: usize = 64;

/// `config` of an `MQTTAdapter` entry
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    #[serde(default = "default_name")]
    pub name: String,

    /// `mqtt://host:port`, `mqtts://host:port` or `host:port`
    pub broker: String,

    /// Inbound subscription filter, e.g. `commands/#`
    #[serde(default)]
    pub topic: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default = "default_qos")]
    pub qos: u8,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_name() -> String {
    "MQTTAdapter".to_string()
}

fn default_qos() -> u8 {
    1
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl MqttSettings {
    pub fn from_value(config: &Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(config.clone())
            .map_err(|e| Error::Config(format!("Invalid MQTT adapter configuration: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        BrokerAddress::parse(&self.broker)?;
        self.quality_of_service()?;
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config("connect_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn quality_of_service(&self) -> Result<QoS> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(Error::Config(format!("qos must be 0, 1 or 2, got {}", other))),
        }
    }

    fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("iot-hub-{}", uuid::Uuid::new_v4().simple()))
    }
}

/// Parsed broker location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl BrokerAddress {
    pub const PLAIN_PORT: u16 = 1883;
    pub const TLS_PORT: u16 = 8883;

    pub fn parse(broker: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Config(format!("Invalid broker '{}': {}", broker, reason));

        if !broker.contains("://") {
            let (host, port) = match broker.rsplit_once(':') {
                Some((host, port)) => (
                    host,
                    port.parse::<u16>().map_err(|_| invalid("bad port"))?,
                ),
                None => (broker, Self::PLAIN_PORT),
            };
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            return Ok(Self {
                host: host.to_string(),
                port,
                secure: false,
            });
        }

        let url = Url::parse(broker).map_err(|e| invalid(&e.to_string()))?;
        let secure = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let default_port = if secure { Self::TLS_PORT } else { Self::PLAIN_PORT };

        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or(default_port),
            secure,
        })
    }
}

/// State shared with the inbound consumer thread
#[derive(Clone)]
struct Inbound {
    name: String,
    bus: MessageBus,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    metrics: Metrics,
}

impl Inbound {
    fn run(self, mut connection: Connection, ready: Sender<std::result::Result<(), String>>) {
        let mut ready = Some(ready);

        for event in connection.iter() {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    self.connected.store(true, Ordering::Release);
                    debug!(adapter = %self.name, code = ?ack.code, "CONNACK received");
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Ok(()));
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = decode_inbound(&publish.payload);
                    self.metrics.record_inbound();
                    self.bus
                        .publish(Message::new(self.name.as_str(), publish.topic, payload));
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    self.metrics.record_transport_failure();
                    match ready.take() {
                        Some(ready) => {
                            let _ = ready.send(Err(e.to_string()));
                        }
                        None if !self.stop.load(Ordering::Acquire) => {
                            warn!(adapter = %self.name, "MQTT connection lost: {}", e);
                        }
                        None => {}
                    }
                    break;
                }
            }
        }

        self.connected.store(false, Ordering::Release);
        debug!(adapter = %self.name, "MQTT consumer stopped");
    }
}

/// Adapter bridging the bus to an MQTT broker
pub struct MqttAdapter {
    name: String,
    settings: Option<MqttSettings>,
    bus: Option<MessageBus>,
    client: Arc<Mutex<Option<Client>>>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    consumer: Option<JoinHandle<()>>,
    metrics: Metrics,
}

impl Default for MqttAdapter {
    fn default() -> Self {
        Self {
            name: default_name(),
            settings: None,
            bus: None,
            client: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            consumer: None,
            metrics: Metrics::new(),
        }
    }
}

impl MqttAdapter {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    /// Tear down the session; safe on a never-connected adapter and when repeated
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::Release);
        let had_session = match self.client.lock().take() {
            Some(client) => {
                if let Err(e) = client.try_disconnect() {
                    debug!(adapter = %self.name, "Disconnect request not sent: {}", e);
                }
                true
            }
            None => false,
        };
        if let Some(handle) = self.consumer.take() {
            if handle.join().is_err() {
                warn!(adapter = %self.name, "MQTT consumer thread panicked");
            }
        }
        self.connected.store(false, Ordering::Release);
        if had_session {
            info!(adapter = %self.name, "MQTT session closed");
        }
    }

    fn subscribe_forwarder(&self, bus: &MessageBus, qos: QoS) {
        let name = self.name.clone();
        let client = Arc::clone(&self.client);
        let connected = Arc::clone(&self.connected);
        let metrics = self.metrics.clone();

        bus.subscribe(move |msg: &Message| {
            if msg.source_id() == name {
                return;
            }
            let session = client.lock().clone();
            let Some(session) = session.filter(|_| connected.load(Ordering::Acquire)) else {
                metrics.record_dropped();
                warn!(adapter = %name, topic = %msg.topic(), "MQTT disconnected, message dropped");
                return;
            };

            let body = match serde_json::to_vec(msg.payload()) {
                Ok(body) => body,
                Err(e) => {
                    metrics.record_dropped();
                    warn!(adapter = %name, topic = %msg.topic(), "Payload not serializable: {}", e);
                    return;
                }
            };

            match session.try_publish(msg.topic(), qos, false, body) {
                Ok(()) => metrics.record_forwarded(),
                Err(e) => {
                    metrics.record_dropped();
                    metrics.record_transport_failure();
                    warn!(adapter = %name, topic = %msg.topic(), "MQTT publish failed: {}", e);
                }
            }
        });
    }
}

impl Plugin for MqttAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Adapter
    }

    fn initialize(&mut self, bus: &MessageBus, config: &Value) -> Result<()> {
        let settings = MqttSettings::from_value(config)?;
        self.name = settings.name.clone();
        self.subscribe_forwarder(bus, settings.quality_of_service()?);
        self.bus = Some(bus.clone());
        self.settings = Some(settings);
        debug!(adapter = %self.name, "MQTT adapter initialized");
        Ok(())
    }

    fn connect(&mut self, tls: Option<&TlsContext>) -> Result<()> {
        let (settings, bus) = match (&self.settings, &self.bus) {
            (Some(settings), Some(bus)) => (settings.clone(), bus.clone()),
            _ => return Err(Error::Internal(format!("{} is not initialized", self.name))),
        };
        self.disconnect();

        let address = BrokerAddress::parse(&settings.broker)?;
        let qos = settings.quality_of_service()?;
        let mut options = MqttOptions::new(settings.client_id(), address.host.as_str(), address.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(1)));

        if address.secure {
            let tls = tls.ok_or_else(|| {
                Error::ConfigurationIncomplete(format!(
                    "{} requires a TLS context for {}",
                    self.name, settings.broker
                ))
            })?;
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                tls.client_config(),
            )));
        }

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        if let Some(filter) = &settings.topic {
            client.subscribe(filter.as_str(), qos)?;
        }

        self.stop.store(false, Ordering::Release);
        let inbound = Inbound {
            name: self.name.clone(),
            bus,
            connected: Arc::clone(&self.connected),
            stop: Arc::clone(&self.stop),
            metrics: self.metrics.clone(),
        };
        let (ready_tx, ready_rx) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name(format!("mqtt-{}", self.name))
            .spawn(move || inbound.run(connection, ready_tx))?;
        *self.client.lock() = Some(client);
        self.consumer = Some(handle);

        let outcome = ready_rx.recv_timeout(Duration::from_millis(settings.connect_timeout_ms));
        match outcome {
            Ok(Ok(())) => {
                info!(
                    adapter = %self.name,
                    host = %address.host,
                    port = address.port,
                    tls = address.secure,
                    "MQTT connected"
                );
                Ok(())
            }
            Ok(Err(reason)) => {
                self.disconnect();
                warn!(adapter = %self.name, broker = %settings.broker, "MQTT connect failed: {}", reason);
                Err(Error::Transport(reason))
            }
            Err(RecvTimeoutError::Timeout) => {
                self.disconnect();
                warn!(adapter = %self.name, broker = %settings.broker, "MQTT connect timed out");
                Err(Error::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.disconnect();
                Err(Error::Transport("MQTT consumer ended before CONNACK".to_string()))
            }
        }
    }

    fn shutdown(&mut self) {
        self.disconnect();
    }
}

impl Drop for MqttAdapter {
    fn drop(&mut self) {
        self.disconnect();
    }
}
