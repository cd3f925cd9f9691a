// SPDX-License-Identifier: MIT
//
// IoT Sensor Hub: Message-Bus-Centric Telemetry Gateway
// Copyright (c) 2025 IoT Sensor Hub Contributors
//
// https://github.com/iot-sensor-hub/iot-sensor-hub

//! In-process publish/subscribe hub
//!
//! # Design
//!
//! The subscriber list is an immutable, reference-counted `Vec` behind an
//! [`ArcSwap`]. `publish` loads the current snapshot once and iterates it without
//! taking any lock. `subscribe` performs read-copy-update: it clones the snapshot,
//! appends the callback and compare-and-swaps the new list in, retrying on contention.
//!
//! Copying the whole list on every subscribe costs O(n) per registration. Subscriptions
//! happen a handful of times at startup while publishes happen continuously, so the copy
//! is the price paid for a publish path that never waits on a writer.
//!
//! Callbacks run synchronously on the publisher's thread, in registration order. A
//! callback that panics is not caught here.

use crate::message::Message;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// Registered callback
pub type Subscriber = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    owner: Option<u64>,
    callback: Subscriber,
}

/// Cloneable handle to a shared bus
///
/// A handle obtained from [`MessageBus::scoped`] tags every subscription it makes
/// with an owner id so the plugin registry can drop them when the owning plugin
/// is unloaded.
#[derive(Clone)]
pub struct MessageBus {
    subscribers: Arc<ArcSwap<Vec<Subscription>>>,
    owner: Option<u64>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(ArcSwap::from_pointee(Vec::new())),
            owner: None,
        }
    }

    /// Handle onto the same bus whose subscriptions belong to `owner`
    pub fn scoped(&self, owner: u64) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            owner: Some(owner),
        }
    }

    /// Deliver `msg` to every subscriber in the current snapshot
    pub fn publish(&self, msg: Message) {
        let snapshot = self.subscribers.load_full();
        for subscription in snapshot.iter() {
            (subscription.callback)(&msg);
        }
    }

    /// Register a callback
    ///
    /// Returns once the callback is visible to subsequent publishes. A publish that
    /// already loaded its snapshot will not see it.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let subscription = Subscription {
            owner: self.owner,
            callback: Arc::new(callback),
        };
        let previous = self.subscribers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(subscription.clone());
            next
        });
        debug!(subscribers = previous.len() + 1, owner = ?self.owner, "Subscriber registered");
    }

    /// Drop every subscription made through a handle scoped to `owner`
    ///
    /// Publishes that already loaded their snapshot still reach the removed callbacks.
    pub(crate) fn remove_owner(&self, owner: u64) -> usize {
        let previous = self.subscribers.rcu(|current| {
            current
                .iter()
                .filter(|s| s.owner != Some(owner))
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = previous.iter().filter(|s| s.owner == Some(owner)).count();
        if removed > 0 {
            debug!(owner, removed, "Subscriptions removed");
        }
        removed
    }

    /// Number of subscribers in the current snapshot
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
