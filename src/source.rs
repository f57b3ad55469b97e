// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::ConfigDistError;
use crate::model::Event;

/// A handle to a receiver shared between the `DataSource` implementation and
/// the pump that drains it. Mirrors a Go channel's share-by-reference
/// semantics: only the pump ever calls `recv`, but ownership of the
/// `mpsc::Receiver` stays with the source.
#[derive(Clone)]
pub struct SharedReceiver(Arc<Mutex<mpsc::Receiver<Event>>>);

impl SharedReceiver {
    pub fn new(rx: mpsc::Receiver<Event>) -> Self {
        SharedReceiver(Arc::new(Mutex::new(rx)))
    }

    pub async fn recv(&self) -> Option<Event> {
        self.0.lock().await.recv().await
    }

    pub fn try_recv(&self) -> Result<Event, mpsc::error::TryRecvError> {
        self.0
            .try_lock()
            .map_err(|_| mpsc::error::TryRecvError::Empty)
            .and_then(|mut guard| guard.try_recv())
    }
}

/// A provider of Configuration events, consumed by the pump (C5). Matches
/// `configapi.DataPump` from the originating system one method at a time.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn startup(&self) -> Result<(), ConfigDistError>;
    async fn stop(&self) -> Result<(), ConfigDistError>;

    /// One-shot, finite: streams every current configuration with its
    /// assigned sequence, then closes. The implementation records the
    /// highest sequence observed at the *start* of the dump and uses it as
    /// the starting cursor for `event_channel`.
    async fn trigger_dump_to_channel(&self) -> mpsc::Receiver<Event>;

    /// Infinite: emits events with strictly monotonically increasing
    /// sequence numbers per slot (and per source).
    fn event_channel(&self) -> SharedReceiver;

    /// Polled once per tail cycle. `Err(ConfigDistError::SourceTransient)`
    /// tells the pump to back off instead of draining `event_channel` this
    /// round; any other error is treated the same way. Never returns
    /// `SourceFatal` — that variant is reserved for `startup`.
    async fn poll_health(&self) -> Result<(), ConfigDistError>;
}

/// A reference `DataSource` backed by an in-memory seed table and an
/// injectable incremental channel, for tests and demos. Grounded on
/// `mem_etcd`'s use of `dashmap::DashMap` for its concurrent key tables and
/// on the originating system's `DatabaseDataPump` dump-then-tail shape.
pub mod memory {
    use super::*;
    use crate::model::Configuration;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    pub struct InMemoryDataSource {
        seed: DashMap<(String, String), (Configuration, i64)>,
        sequence: AtomicI64,
        incremental_tx: mpsc::Sender<Event>,
        incremental_rx: SharedReceiver,
        healthy: std::sync::atomic::AtomicBool,
    }

    impl Default for InMemoryDataSource {
        fn default() -> Self {
            let (tx, rx) = mpsc::channel(1024);
            InMemoryDataSource {
                seed: DashMap::new(),
                sequence: AtomicI64::new(0),
                incremental_tx: tx,
                incremental_rx: SharedReceiver::new(rx),
                healthy: std::sync::atomic::AtomicBool::new(true),
            }
        }
    }

    impl InMemoryDataSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Test/demo hook: makes the next `poll_health` calls report a
        /// transient failure until called again with `true`.
        pub fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        /// Adds a configuration to the bulk snapshot returned by the next
        /// `trigger_dump_to_channel` call.
        pub fn seed(&self, cfg: Configuration) {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            self.seed
                .insert((cfg.group.clone(), cfg.key.clone()), (cfg, seq));
        }

        /// Pushes one incremental event to the tail channel, assigning it the
        /// next monotonic sequence number.
        pub async fn push_event(
            &self,
            configuration: Configuration,
            created: bool,
            modified: bool,
            deleted: bool,
        ) {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self
                .incremental_tx
                .send(Event {
                    configuration,
                    created,
                    modified,
                    deleted,
                    sequence: seq,
                })
                .await;
        }
    }

    #[async_trait]
    impl DataSource for InMemoryDataSource {
        async fn startup(&self) -> Result<(), ConfigDistError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), ConfigDistError> {
            Ok(())
        }

        async fn trigger_dump_to_channel(&self) -> mpsc::Receiver<Event> {
            let (tx, rx) = mpsc::channel(self.seed.len().max(1));
            for entry in self.seed.iter() {
                let (cfg, seq) = entry.value().clone();
                let _ = tx
                    .send(Event {
                        configuration: cfg,
                        created: true,
                        modified: false,
                        deleted: false,
                        sequence: seq,
                    })
                    .await;
            }
            rx
        }

        fn event_channel(&self) -> SharedReceiver {
            self.incremental_rx.clone()
        }

        async fn poll_health(&self) -> Result<(), ConfigDistError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ConfigDistError::SourceTransient(
                    "in-memory source marked unhealthy".to_string(),
                ))
            }
        }
    }

}
