// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::model::Configuration;

/// One message delivered to a waiter: the updated configuration for one of
/// the slots it subscribed to.
#[derive(Debug, Clone)]
pub struct NotifyEvent {
    pub configuration: Configuration,
}

pub type NotifySender = mpsc::Sender<NotifyEvent>;

/// A single waiter's subscription to a `(group, key)` slot.
struct Listener {
    request_id: u64,
    channel: NotifySender,
}

/// Per-selector-bucket table: latest configuration and listener registry per
/// `(group, key)` slot. Every access happens while the owning `SelectorIndex`
/// holds its read or write lock; this type has no internal locking of its own.
#[derive(Default)]
pub struct ConfigurationStore {
    data: HashMap<(String, String), Configuration>,
    listeners: HashMap<(String, String), Vec<Listener>>,
}

impl ConfigurationStore {
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    pub fn get(&self, group: &str, key: &str) -> Option<&Configuration> {
        self.data.get(&(group.to_string(), key.to_string()))
    }

    /// Appends a waiter to `listeners[(group,key)]`. A duplicate `request_id`
    /// for the same slot overwrites the earlier entry.
    pub fn register_listener(
        &mut self,
        request_id: u64,
        group: &str,
        key: &str,
        channel: NotifySender,
    ) {
        let slot = (group.to_string(), key.to_string());
        let bucket = self.listeners.entry(slot).or_default();
        bucket.retain(|l| l.request_id != request_id);
        bucket.push(Listener {
            request_id,
            channel,
        });
    }

    /// Removes waiter entries for `request_id` across the listed slots. Idempotent.
    pub fn cancel_wait(&mut self, request_id: u64, slots: &[(String, String)]) {
        for slot in slots {
            if let Some(bucket) = self.listeners.get_mut(slot) {
                bucket.retain(|l| l.request_id != request_id);
                if bucket.is_empty() {
                    self.listeners.remove(slot);
                }
            }
        }
    }

    /// Sets `data[(group,key)]`, drains and clears `listeners[(group,key)]`,
    /// sending `{configuration: cfg}` on every waiter channel (recording each
    /// channel into `accumulated` for later close). The send is always
    /// non-blocking because every registered channel has capacity >= the
    /// number of distinct slots its waiter subscribed to.
    pub fn save_and_notify(
        &mut self,
        cfg: Configuration,
        accumulated: &mut HashMap<u64, NotifySender>,
    ) {
        let slot = (cfg.group.clone(), cfg.key.clone());
        self.data.insert(slot.clone(), cfg.clone());
        if let Some(bucket) = self.listeners.remove(&slot) {
            for listener in bucket {
                let _ = listener.channel.try_send(NotifyEvent {
                    configuration: cfg.clone(),
                });
                accumulated.insert(listener.request_id, listener.channel);
            }
        }
    }

    /// Removes both data and listeners without notifying waiters. A live
    /// subscriber should not learn its configuration vanished through the
    /// long-poll path; it observes the absence on its next explicit fetch.
    pub fn delete_slot(&mut self, group: &str, key: &str) {
        let slot = (group.to_string(), key.to_string());
        self.data.remove(&slot);
        self.listeners.remove(&slot);
    }

    #[cfg(test)]
    pub fn listener_count(&self, group: &str, key: &str) -> usize {
        self.listeners
            .get(&(group.to_string(), key.to_string()))
            .map(|b| b.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn has_listener(&self, group: &str, key: &str, request_id: u64) -> bool {
        self.listeners
            .get(&(group.to_string(), key.to_string()))
            .map(|b| b.iter().any(|l| l.request_id == request_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selectors;

    fn cfg(group: &str, key: &str, version: &str) -> Configuration {
        let value = bytes::Bytes::from_static(b"v");
        Configuration {
            group: group.to_string(),
            key: key.to_string(),
            version: version.to_string(),
            signature: Configuration::generate_signature(&value),
            value,
            selectors: Selectors::empty(),
            opt_selectors: Selectors::empty(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn save_and_notify_clears_listeners() {
        let mut store = ConfigurationStore::new();
        let (tx, mut rx) = mpsc::channel(1);
        store.register_listener(1, "g", "k", tx);
        assert_eq!(store.listener_count("g", "k"), 1);

        let mut accumulated = HashMap::new();
        store.save_and_notify(cfg("g", "k", "v1"), &mut accumulated);

        assert_eq!(store.listener_count("g", "k"), 0);
        assert_eq!(accumulated.len(), 1);
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.configuration.version, "v1");
    }

    #[test]
    fn cancel_wait_is_idempotent() {
        let mut store = ConfigurationStore::new();
        let (tx, _rx) = mpsc::channel(1);
        store.register_listener(7, "g", "k", tx);
        let slots = vec![("g".to_string(), "k".to_string())];
        store.cancel_wait(7, &slots);
        assert!(!store.has_listener("g", "k", 7));
        // second call must not panic or error
        store.cancel_wait(7, &slots);
    }

    #[test]
    fn delete_slot_removes_without_notifying() {
        let mut store = ConfigurationStore::new();
        let (tx, mut rx) = mpsc::channel(1);
        store.register_listener(1, "g", "k", tx);
        let mut accumulated = HashMap::new();
        store.save_and_notify(cfg("g", "k", "v1"), &mut accumulated);
        // re-register after the first notification drained the listener
        let (tx2, mut rx2) = mpsc::channel(1);
        store.register_listener(2, "g", "k", tx2);
        store.delete_slot("g", "k");
        assert!(store.get("g", "k").is_none());
        assert_eq!(store.listener_count("g", "k"), 0);
        assert!(rx.try_recv().is_ok()); // from the earlier save_and_notify
        assert!(rx2.try_recv().is_err()); // delete never sends
    }
}
