// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Retry with exponential backoff and a consecutive-failure circuit breaker
//!
//! Used by the HTTP adapter around each outbound POST.

use crate::Result;
use parking_lot::Mutex;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Add up to 25% random delay to each backoff
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `max_retries` attempts after the first
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..Default::default()
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or attempts run out
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = if self.jitter { jittered(backoff) } else { backoff };
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying after {:?}",
                        attempt, self.max_attempts, e, delay
                    );
                    sleep(delay).await;
                    backoff = self.next_backoff(backoff);
                }
                Err(e) => {
                    if attempt > 1 {
                        warn!("Giving up after {} attempts: {}", attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(
            (current.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
        )
    }
}

fn jittered(duration: Duration) -> Duration {
    let extra = rand::thread_rng().gen_range(0..=duration.as_millis() / 4);
    duration + Duration::from_millis(extra as u64)
}

/// Opens after `failure_threshold` consecutive failures and half-opens after `reset_timeout`
pub struct CircuitBreaker {
    failure_threshold: u32,
    consecutive_failures: AtomicU32,
    reset_timeout: Duration,
    last_failure: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            consecutive_failures: AtomicU32::new(0),
            reset_timeout,
            last_failure: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        if self.consecutive_failures.load(Ordering::Relaxed) < self.failure_threshold {
            return false;
        }

        let mut last_failure = self.last_failure.lock();
        match *last_failure {
            Some(at) if at.elapsed() < self.reset_timeout => true,
            _ => {
                // Let the next operation try the transport again
                *last_failure = None;
                self.consecutive_failures.store(0, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_failure.lock() = Some(Instant::now());
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}
