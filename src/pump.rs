// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::index::{self, SelectorIndex};
use crate::metrics;
use crate::model::Event;
use crate::source::DataSource;
use crate::store::NotifySender;

/// `INIT -> BULK -> TAIL -> CLOSED`. Transitions are one-way except `CLOSED`,
/// which may be entered from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Init,
    Bulk,
    Tail,
    Closed,
}

#[derive(Debug, Clone)]
pub struct PumpOptions {
    /// Events applied per batch before releasing the write lock.
    pub coalesce_size: usize,
    /// Amortizes lock acquisition between tail batches.
    pub batch_sleep: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for PumpOptions {
    fn default() -> Self {
        PumpOptions {
            coalesce_size: 50,
            batch_sleep: Duration::from_millis(500),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5),
        }
    }
}

/// Pulls events from the external source: bulk dump, then incremental tail
/// by monotonic sequence cursor. Fatal-free: any transient source error
/// returns to polling rather than terminating the process.
pub struct Pump {
    index: Arc<SelectorIndex>,
    source: Arc<dyn DataSource>,
    options: PumpOptions,
    state: std::sync::Mutex<PumpState>,
    cursor: AtomicI64,
    closed: AtomicBool,
}

impl Pump {
    pub fn new(index: Arc<SelectorIndex>, source: Arc<dyn DataSource>, options: PumpOptions) -> Self {
        Pump {
            index,
            source,
            options,
            state: std::sync::Mutex::new(PumpState::Init),
            cursor: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> PumpState {
        *self.state.lock().expect("pump state lock poisoned")
    }

    fn set_state(&self, s: PumpState) {
        *self.state.lock().expect("pump state lock poisoned") = s;
    }

    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Starts the source, runs the bulk dump to completion, then spawns the
    /// tail loop as a background task. Returns once bulk load has finished,
    /// matching the originating system's `Startup` blocking until the
    /// in-memory index is populated.
    pub async fn startup(self: &Arc<Self>) -> Result<(), crate::error::ConfigDistError> {
        self.source
            .startup()
            .await
            .map_err(|_| crate::error::ConfigDistError::SourceFatal("data source startup failed".to_string()))?;
        self.set_state(PumpState::Bulk);
        self.run_bulk().await;
        self.set_state(PumpState::Tail);

        let this = self.clone();
        tokio::spawn(async move {
            this.tail_loop().await;
        });
        Ok(())
    }

    /// Only startup failures leave the pump as an error; a failed `stop()`
    /// is logged and absorbed since the pump is shutting down regardless.
    pub async fn shutdown(&self) -> Result<(), crate::error::ConfigDistError> {
        self.closed.store(true, Ordering::SeqCst);
        self.set_state(PumpState::Closed);
        if let Err(e) = self.source.stop().await {
            warn!("data source stop failed during shutdown: {}", e);
        }
        Ok(())
    }

    /// BULK: consume the one-shot dump channel to completion, upserting every
    /// configuration with an empty notify accumulator (no waiters exist yet;
    /// `Server::startup` blocks here). Stores the observed max sequence as
    /// the cursor once the channel closes.
    async fn run_bulk(&self) {
        let mut rx = self.source.trigger_dump_to_channel().await;
        let mut max_sequence = 0i64;
        while let Some(event) = rx.recv().await {
            max_sequence = max_sequence.max(event.sequence);
            let mut discard = HashMap::new();
            self.apply_event(&event, &mut discard);
        }
        self.cursor.store(max_sequence, Ordering::SeqCst);
        info!("bulk dump complete, cursor={}", max_sequence);
    }

    async fn tail_loop(self: Arc<Self>) {
        let mut backoff = self.options.backoff_initial;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = self.source.poll_health().await {
                warn!("data source unhealthy, backing off {:?}: {}", backoff, e);
                metrics::PUMP_RETRY_COUNT.with_label_values(&["tail"]).inc();
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.options.backoff_max);
                continue;
            }
            backoff = self.options.backoff_initial;
            self.tail_step().await;
            tokio::time::sleep(self.options.batch_sleep).await;
        }
    }

    /// Pulls up to `coalesce_size` already-enqueued events (non-blocking, so
    /// an idle source never stalls the loop), applies them under the index
    /// write lock in sequence order, then closes every waiter channel
    /// touched by the batch. Returns the number of events applied.
    pub async fn tail_step(&self) -> usize {
        let receiver = self.source.event_channel();
        let mut events = Vec::with_capacity(self.options.coalesce_size);
        for _ in 0..self.options.coalesce_size {
            match receiver.try_recv() {
                Ok(ev) => events.push(ev),
                Err(_) => break,
            }
        }
        if events.is_empty() {
            return 0;
        }

        let count = events.len();
        metrics::PUMP_BATCH_SIZE
            .with_label_values(&["tail"])
            .observe(count as f64);
        // A waiter is notified (and its listener entry cleared) on the first
        // same-slot event `save_and_notify` sees; applying the raw batch in
        // order would deliver the earliest event in the batch rather than
        // the latest. Collapse to one event per slot, keeping the last, so
        // every slot touched by this batch is applied exactly once.
        let deduped = Self::dedupe_latest_per_slot(events);
        let accumulated: HashMap<u64, NotifySender> = {
            let mut acc = HashMap::new();
            self.index.with_write(|map| {
                for event in &deduped {
                    self.apply_event_locked(map, event, &mut acc);
                }
            });
            acc
        };
        // Closing every distinct channel happens here, after the write lock
        // is released, by dropping the last sender clone for each request.
        drop(accumulated);
        count
    }

    /// Keeps only the last event per `(selKey, optKey, group, key)`, in
    /// first-occurrence order of that slot within the batch.
    fn dedupe_latest_per_slot(events: Vec<Event>) -> Vec<Event> {
        let mut latest: HashMap<(String, String, String, String), Event> = HashMap::new();
        let mut order: Vec<(String, String, String, String)> = Vec::new();
        for event in events {
            let slot = (
                event.configuration.selectors.key().to_string(),
                event.configuration.opt_selectors.key().to_string(),
                event.configuration.group.clone(),
                event.configuration.key.clone(),
            );
            if !latest.contains_key(&slot) {
                order.push(slot.clone());
            }
            latest.insert(slot, event);
        }
        order
            .into_iter()
            .map(|slot| latest.remove(&slot).expect("slot was just inserted"))
            .collect()
    }

    fn apply_event(&self, event: &Event, accumulated: &mut HashMap<u64, NotifySender>) {
        self.index.with_write(|map| {
            self.apply_event_locked(map, event, accumulated);
        });
    }

    fn apply_event_locked(
        &self,
        map: &mut HashMap<String, index::Bucket>,
        event: &Event,
        accumulated: &mut HashMap<u64, NotifySender>,
    ) {
        let sel_key = event.configuration.selectors.key().to_string();
        let opt_key = event.configuration.opt_selectors.key().to_string();
        if event.created || event.modified {
            if let Err(e) = event.configuration.validate_invariants() {
                warn!(
                    "dropping invalid configuration {}/{}: {}",
                    event.configuration.group, event.configuration.key, e
                );
                return;
            }
            let store = index::get_or_create(map, &sel_key, &opt_key);
            store.save_and_notify(event.configuration.clone(), accumulated);
        } else if event.deleted {
            let store = index::get_or_create(map, &sel_key, &opt_key);
            store.delete_slot(&event.configuration.group, &event.configuration.key);
        } else {
            warn!(
                "unknown pump event type for {}/{}",
                event.configuration.group, event.configuration.key
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Configuration;
    use crate::selector::Selectors;

    fn event(group: &str, key: &str, version: &str, value: &[u8], sequence: i64, modified: bool) -> Event {
        Event {
            configuration: Configuration {
                group: group.to_string(),
                key: key.to_string(),
                version: version.to_string(),
                signature: Configuration::generate_signature(value),
                value: bytes::Bytes::copy_from_slice(value),
                selectors: Selectors::empty(),
                opt_selectors: Selectors::empty(),
                timestamp: 0,
            },
            created: !modified,
            modified,
            deleted: false,
            sequence,
        }
    }

    #[test]
    fn dedupe_keeps_latest_event_per_slot() {
        let events = vec![
            event("g1", "k1", "v2", b"2", 2, true),
            event("g1", "k1", "v3", b"3", 3, true),
            event("g1", "k1", "v4", b"4", 4, true),
        ];
        let deduped = Pump::dedupe_latest_per_slot(events);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].configuration.version, "v4");
    }

    #[test]
    fn dedupe_preserves_distinct_slots() {
        let events = vec![
            event("g1", "k1", "v2", b"2", 2, true),
            event("g1", "k2", "v1", b"1", 3, true),
            event("g1", "k1", "v3", b"3", 4, true),
        ];
        let deduped = Pump::dedupe_latest_per_slot(events);
        assert_eq!(deduped.len(), 2);
        let k1 = deduped.iter().find(|e| e.configuration.key == "k1").unwrap();
        let k2 = deduped.iter().find(|e| e.configuration.key == "k2").unwrap();
        assert_eq!(k1.configuration.version, "v3");
        assert_eq!(k2.configuration.version, "v1");
    }

    #[test]
    fn apply_event_locked_skips_configuration_with_bad_signature() {
        let index = Arc::new(SelectorIndex::new());
        let source = Arc::new(crate::source::memory::InMemoryDataSource::new());
        let pump = Pump::new(index.clone(), source, PumpOptions::default());

        let mut bad = event("g1", "k1", "v1", b"a", 1, true);
        bad.configuration.signature = "sha256:not-the-real-digest".to_string();

        let mut accumulated = HashMap::new();
        pump.apply_event(&bad, &mut accumulated);

        index.with_read(|map| {
            assert!(index::get_general(map, "", "").is_none());
        });
    }
}
