// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! HTTP bridge
//!
//! Each bus message is POSTed to `endpoint` as its JSON payload with `X-Source-Id`
//! and `X-Topic` headers. Requests run on a small runtime owned by the adapter so
//! publishers never wait on the network. Transient failures are retried; after
//! repeated failures the circuit breaker opens, the adapter reports itself
//! disconnected and messages are dropped until the breaker half-opens.
//!
//! Nothing is queued. Messages published before `connect`, after `shutdown`, while
//! the breaker is open or while `max_in_flight` deliveries are pending are dropped
//! and counted.

use crate::bus::MessageBus;
use crate::message::Message;
use crate::metrics::Metrics;
use crate::plugins::{Plugin, PluginType};
use crate::retry::{CircuitBreaker, RetryPolicy};
use crate::tls::TlsContext;
use crate::{Error, Result};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

/// `config` of an `HTTPAdapter` entry
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_name")]
    pub name: String,

    pub endpoint: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts after the first for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive failed deliveries before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Deliveries allowed to be pending at once
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_name() -> String {
    "HTTPAdapter".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_max_in_flight() -> usize {
    64
}

impl HttpSettings {
    pub fn from_value(config: &Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(config.clone())
            .map_err(|e| Error::Config(format!("Invalid HTTP adapter configuration: {}", e)))?;
        settings.endpoint_url()?;
        if settings.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be > 0".to_string()));
        }
        if settings.max_in_flight == 0 {
            return Err(Error::Config("max_in_flight must be > 0".to_string()));
        }
        Ok(settings)
    }

    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("Invalid endpoint '{}': {}", self.endpoint, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Config(format!(
                "Endpoint scheme must be http or https, got '{}'",
                other
            ))),
        }
    }
}

/// Everything one delivery needs, cloned into each spawned task
#[derive(Clone)]
struct Delivery {
    name: String,
    client: Client,
    endpoint: Url,
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    connected: Arc<AtomicBool>,
    metrics: Metrics,
}

impl Delivery {
    async fn post(&self, msg: &Message) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-Source-Id", msg.source_id())
            .header("X-Topic", msg.topic())
            .json(msg.payload())
            .send()
            .await?;
        response.error_for_status()?;
        Ok(())
    }

    async fn deliver(self, msg: Message) {
        match self.policy.execute(|| self.post(&msg)).await {
            Ok(()) => {
                self.breaker.record_success();
                if !self.connected.swap(true, Ordering::AcqRel) {
                    info!(adapter = %self.name, "HTTP endpoint reachable");
                }
                self.metrics.record_forwarded();
                debug!(adapter = %self.name, topic = %msg.topic(), "Message delivered");
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!(adapter = %self.name, topic = %msg.topic(), "HTTP delivery failed: {}", e);
                if self.breaker.is_open() && self.connected.swap(false, Ordering::AcqRel) {
                    warn!(adapter = %self.name, "Circuit open, adapter marked disconnected");
                }
                self.metrics.record_transport_failure();
            }
        }
    }
}

/// Adapter forwarding bus messages to an HTTP endpoint
pub struct HttpAdapter {
    name: String,
    runtime: Option<Runtime>,
    active: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    metrics: Metrics,
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self {
            name: default_name(),
            runtime: None,
            active: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(false)),
            metrics: Metrics::new(),
        }
    }
}

impl HttpAdapter {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    fn subscribe_forwarder(
        &self,
        bus: &MessageBus,
        handle: Handle,
        delivery: Delivery,
        in_flight: Arc<Semaphore>,
    ) {
        let active = Arc::clone(&self.active);
        bus.subscribe(move |msg: &Message| {
            let drop_message = |reason: &str| {
                delivery.metrics.record_dropped();
                warn!(adapter = %delivery.name, topic = %msg.topic(), "{}, message dropped", reason);
            };

            if !active.load(Ordering::Acquire) {
                drop_message("HTTP adapter not connected");
                return;
            }
            if delivery.breaker.is_open() {
                drop_message("Circuit open");
                return;
            }
            let Ok(permit) = Arc::clone(&in_flight).try_acquire_owned() else {
                drop_message("Too many deliveries in flight");
                return;
            };

            let delivery = delivery.clone();
            let msg = msg.clone();
            handle.spawn(async move {
                delivery.deliver(msg).await;
                drop(permit);
            });
        });
    }
}

impl Plugin for HttpAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Adapter
    }

    fn initialize(&mut self, bus: &MessageBus, config: &Value) -> Result<()> {
        let settings = HttpSettings::from_value(config)?;
        self.name = settings.name.clone();

        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .use_rustls_tls()
            .user_agent(format!("iot-hub/{}", crate::VERSION))
            .build()
            .map_err(Error::Network)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(format!("http-{}", self.name))
            .enable_all()
            .build()?;

        let delivery = Delivery {
            name: self.name.clone(),
            client,
            endpoint: settings.endpoint_url()?,
            policy: RetryPolicy::with_retries(settings.max_retries),
            breaker: Arc::new(CircuitBreaker::new(
                settings.failure_threshold,
                Duration::from_millis(settings.reset_timeout_ms),
            )),
            connected: Arc::clone(&self.connected),
            metrics: self.metrics.clone(),
        };

        let in_flight = Arc::new(Semaphore::new(settings.max_in_flight));
        self.subscribe_forwarder(bus, runtime.handle().clone(), delivery, in_flight);
        self.runtime = Some(runtime);
        debug!(adapter = %self.name, endpoint = %settings.endpoint, "HTTP adapter initialized");
        Ok(())
    }

    /// HTTP is connectionless; from here on messages are delivered and the adapter
    /// counts as connected until the breaker opens
    ///
    /// Server certificates are verified by the HTTP client's own root store, so the
    /// gateway TLS context is not used here.
    fn connect(&mut self, _tls: Option<&TlsContext>) -> Result<()> {
        if self.runtime.is_none() {
            return Err(Error::Internal(format!("{} is not initialized", self.name)));
        }
        self.connected.store(true, Ordering::Release);
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.active.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
            info!(adapter = %self.name, "HTTP adapter stopped");
        }
    }
}

impl Drop for HttpAdapter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
