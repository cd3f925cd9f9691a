// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! Deterministic schedule table for periodic frame requests
//!
//! A due entry is rescheduled relative to the instant it was observed due
//! (`now + period`), not relative to its previous due time. A poll that arrives
//! late therefore yields the frame once instead of a catch-up burst.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// `schedule` item in a sensor configuration
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub id: u8,
    pub period_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub frame_id: u8,
    pub period: Duration,
    pub next_due: Instant,
}

#[derive(Debug, Clone)]
pub struct LinScheduler {
    entries: Vec<ScheduleEntry>,
}

impl LinScheduler {
    /// Create a scheduler whose entries are all first due at `start`
    pub fn new(entries: impl IntoIterator<Item = (u8, Duration)>, start: Instant) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(frame_id, period)| ScheduleEntry {
                    frame_id,
                    period,
                    next_due: start,
                })
                .collect(),
        }
    }

    /// Build from configuration, rejecting zero periods
    pub fn from_config(schedule: &[ScheduleConfig], start: Instant) -> Result<Self> {
        if let Some(bad) = schedule.iter().find(|entry| entry.period_ms == 0) {
            return Err(Error::Config(format!(
                "schedule entry for frame {} has a zero period",
                bad.id
            )));
        }
        Ok(Self::new(
            schedule
                .iter()
                .map(|entry| (entry.id, Duration::from_millis(entry.period_ms))),
            start,
        ))
    }

    /// Frame ids due at `now`, in declaration order
    ///
    /// Every returned entry is advanced to `now + period`.
    pub fn due_frames(&mut self, now: Instant) -> Vec<u8> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if entry.next_due <= now {
                due.push(entry.frame_id);
                entry.next_due = now + entry.period;
            }
        }
        due
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Earliest upcoming due time across all entries
    pub fn next_due(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.next_due).min()
    }

    pub fn smallest_period(&self) -> Option<Duration> {
        self.entries.iter().map(|entry| entry.period).min()
    }
}
