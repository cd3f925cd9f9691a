// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Gateway wiring: certificates, TLS, plugins and sensors from one configuration
//!
//! Certificate provisioning failures abort startup. Any single plugin entry that
//! fails to load, activate or start is logged, recorded in the [`StartupReport`] and
//! skipped; the remaining entries keep running.

use crate::bus::MessageBus;
use crate::certs::{generate_certificates, CertRole, CertificateConfig};
use crate::config::GatewayConfig;
use crate::plugins::{Activated, Activation, PluginRegistry};
use crate::sensor::Sensor;
use crate::tls::{create_tls_context, TlsContext};
use crate::Result;
use tracing::{error, info, warn};

/// What happened to each configured entry during startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Registry keys of active plugins
    pub activated: Vec<String>,
    /// Adapters that are active but could not reach their transport
    pub disconnected: Vec<String>,
    /// Names of running sensors
    pub sensors: Vec<String>,
    /// Entry label and reason for every skipped entry
    pub failed: Vec<(String, String)>,
}

pub struct GatewayRuntime {
    bus: MessageBus,
    registry: PluginRegistry,
    sensors: Vec<Box<dyn Sensor>>,
    tls: Option<TlsContext>,
    report: StartupReport,
    stopped: bool,
}

impl GatewayRuntime {
    /// Provision certificates, then load, activate and start every enabled entry
    pub fn start(config: &GatewayConfig, bus: MessageBus) -> Result<Self> {
        Self::start_with(config, bus, PluginRegistry::with_builtins())
    }

    /// Same as [`start`](Self::start) with a caller-provided registry
    pub fn start_with(config: &GatewayConfig, bus: MessageBus, registry: PluginRegistry) -> Result<Self> {
        let tls = match &config.certificates {
            Some(certificates) => provision(certificates)?,
            None => None,
        };

        let mut runtime = Self {
            bus,
            registry,
            sensors: Vec::new(),
            tls,
            report: StartupReport::default(),
            stopped: false,
        };

        for entry in config.enabled_entries() {
            runtime.activate_entry(&entry.identifier(), entry.label(), &entry.settings());
        }
        runtime.start_sensors();

        info!(
            plugins = runtime.report.activated.len(),
            sensors = runtime.report.sensors.len(),
            failed = runtime.report.failed.len(),
            "Gateway started"
        );
        Ok(runtime)
    }

    fn activate_entry(&mut self, identifier: &str, label: &str, settings: &serde_json::Value) {
        let key = match self.registry.load(identifier) {
            Ok(key) => key,
            Err(e) => {
                error!(entry = label, identifier, "Plugin load failed: {}", e);
                self.report.failed.push((label.to_string(), e.to_string()));
                return;
            }
        };

        match self
            .registry
            .activate(&key, &self.bus, settings, self.tls.as_ref())
        {
            Ok(Activated { key, activation }) => {
                match activation {
                    Activation::Sensor(sensor) => self.sensors.push(sensor),
                    Activation::Logger => {}
                    Activation::Adapter { connected } => {
                        if !connected {
                            self.report.disconnected.push(key.clone());
                        }
                    }
                }
                self.report.activated.push(key);
            }
            Err(e) => {
                error!(entry = label, plugin = %key, "Plugin activation failed: {}", e);
                self.registry.unload(&key);
                self.report.failed.push((label.to_string(), e.to_string()));
            }
        }
    }

    fn start_sensors(&mut self) {
        let mut running = Vec::with_capacity(self.sensors.len());
        for mut sensor in self.sensors.drain(..) {
            match sensor.start() {
                Ok(()) => {
                    info!(sensor = sensor.name(), "Sensor started");
                    self.report.sensors.push(sensor.name().to_string());
                    running.push(sensor);
                }
                Err(e) => {
                    error!(sensor = sensor.name(), "Sensor start failed: {}", e);
                    self.report
                        .failed
                        .push((sensor.name().to_string(), e.to_string()));
                }
            }
        }
        self.sensors = running;
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn tls(&self) -> Option<&TlsContext> {
        self.tls.as_ref()
    }

    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    /// Stop sensors, then unload every plugin; safe to repeat
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        for mut sensor in self.sensors.drain(..) {
            sensor.stop();
            info!(sensor = sensor.name(), "Sensor stopped");
        }
        self.registry.unload_all();
        info!("Gateway stopped");
    }
}

impl Drop for GatewayRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Generate missing certificates and build the client context when possible
fn provision(certificates: &CertificateConfig) -> Result<Option<TlsContext>> {
    let report = generate_certificates(certificates)?;
    info!(
        generated = report.generated.len(),
        reused = report.reused.len(),
        "Certificates ready"
    );

    if certificates.records(CertRole::Client).next().is_none() {
        warn!("No Client certificate configured, TLS transports unavailable");
        return Ok(None);
    }
    match create_tls_context(certificates) {
        Ok(context) => Ok(Some(context)),
        Err(e) => {
            warn!("TLS context unavailable: {}", e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn test_full_startup_and_stop() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = tmp.path().join("sink/messages.log");
        let document = json!({
            "log_file": null,
            "certificates": {
                "directory": tmp.path().join("certs"),
                "certificates": [
                    {"type": "CA", "keyFile": "ca.key", "certFile": "ca.crt", "commonName": "Hub CA"},
                    {"type": "Client", "keyFile": "client.key", "certFile": "client.crt", "commonName": "hub"}
                ]
            },
            "plugins": [
                {"type": "LoggingPlugin"},
                {"type": "FileSinkPlugin", "path": sink},
                {"type": "NoSuchPlugin"},
                {"type": "LoggingPlugin", "_disabled": true}
            ],
            "adapters": [
                {"type": "MQTTAdapter", "broker": "127.0.0.1:1"}
            ],
            "sensors": [
                {"type": "LinSensor", "config": {
                    "schedule": [{"id": 16, "period_ms": 20}],
                    "signals": [{"frame_id": 16, "name": "temp_c", "byte": 0, "type": "u8"}]
                }}
            ]
        });
        let config = GatewayConfig::from_json(&document.to_string()).unwrap();

        let mut runtime = GatewayRuntime::start(&config, MessageBus::new()).unwrap();
        assert!(runtime.tls().is_some());

        let report = runtime.report().clone();
        assert_eq!(
            report.activated,
            vec!["LoggingPlugin", "FileSinkPlugin", "MQTTAdapter", "LinSensor"]
        );
        assert_eq!(report.disconnected, vec!["MQTTAdapter"]);
        assert_eq!(report.sensors, vec!["LIN_GATEWAY"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "NoSuchPlugin");

        std::thread::sleep(Duration::from_millis(150));
        runtime.stop();
        runtime.stop();
        assert!(runtime.registry().is_empty());
        assert_eq!(runtime.bus().subscriber_count(), 0);

        let lines = fs::read_to_string(&sink).unwrap();
        assert!(lines.lines().count() >= 2);
        assert!(lines.lines().all(|l| l.starts_with("LIN_GATEWAY: ")));
        assert!(tmp.path().join("certs/ca.crt").exists());
    }

    #[test]
    fn test_bad_entry_does_not_block_others() {
        let config = GatewayConfig::from_json(
            &json!({
                "plugins": [{"type": "FileSinkPlugin"}, {"type": "LoggingPlugin"}],
                "sensors": [{"type": "LinSensor", "config": {"schedule": []}}]
            })
            .to_string(),
        )
        .unwrap();

        let runtime = GatewayRuntime::start(&config, MessageBus::new()).unwrap();
        assert_eq!(runtime.report().activated, vec!["LoggingPlugin"]);
        assert_eq!(runtime.report().failed.len(), 2);
        assert_eq!(runtime.registry().names(), vec!["LoggingPlugin"]);
    }

    #[test]
    fn test_missing_ca_is_fatal() {
        let mut config = GatewayConfig::default();
        config.plugins = serde_json::from_value(json!([{"type": "LoggingPlugin"}])).unwrap();
        config.certificates = Some(CertificateConfig::default());
        assert!(GatewayRuntime::start(&config, MessageBus::new()).is_err());
    }
}
