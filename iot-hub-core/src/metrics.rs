// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Message flow counters
//!
//! Each adapter and each gateway sensor owns one [`Metrics`] handle; clones share
//! the same counters so callbacks and worker threads can record without locking.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    // Adapter traffic
    messages_forwarded: AtomicU64,
    messages_dropped: AtomicU64,
    messages_inbound: AtomicU64,
    transport_failures: AtomicU64,

    // Frame polling
    frames_polled: AtomicU64,
    frames_published: AtomicU64,
    frames_empty: AtomicU64,
    source_errors: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub messages_forwarded: u64,
    pub messages_dropped: u64,
    pub messages_inbound: u64,
    pub transport_failures: u64,
    pub frames_polled: u64,
    pub frames_published: u64,
    pub frames_empty: u64,
    pub source_errors: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                messages_forwarded: AtomicU64::new(0),
                messages_dropped: AtomicU64::new(0),
                messages_inbound: AtomicU64::new(0),
                transport_failures: AtomicU64::new(0),
                frames_polled: AtomicU64::new(0),
                frames_published: AtomicU64::new(0),
                frames_empty: AtomicU64::new(0),
                source_errors: AtomicU64::new(0),
            }),
        }
    }

    // Adapter traffic
    pub fn record_forwarded(&self) {
        self.inner.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.inner.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inbound(&self) {
        self.inner.messages_inbound.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_failure(&self) {
        self.inner.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_forwarded(&self) -> u64 {
        self.inner.messages_forwarded.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.inner.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn messages_inbound(&self) -> u64 {
        self.inner.messages_inbound.load(Ordering::Relaxed)
    }

    pub fn transport_failures(&self) -> u64 {
        self.inner.transport_failures.load(Ordering::Relaxed)
    }

    // Frame polling
    pub fn record_frame_polled(&self) {
        self.inner.frames_polled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_published(&self) {
        self.inner.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_empty(&self) {
        self.inner.frames_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_error(&self) {
        self.inner.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_published(&self) -> u64 {
        self.inner.frames_published.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            messages_forwarded: load(&self.inner.messages_forwarded),
            messages_dropped: load(&self.inner.messages_dropped),
            messages_inbound: load(&self.inner.messages_inbound),
            transport_failures: load(&self.inner.transport_failures),
            frames_polled: load(&self.inner.frames_polled),
            frames_published: load(&self.inner.frames_published),
            frames_empty: load(&self.inner.frames_empty),
            source_errors: load(&self.inner.source_errors),
        }
    }
}
