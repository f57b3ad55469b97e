// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ConfigDistError;
use crate::index::{self, SelectorIndex};
use crate::model::{Configuration, RequestedConfigurationKey};
use crate::selector::Selectors;
use crate::metrics;
use crate::store::NotifyEvent;
use crate::version::VersionComparator;

/// `retrieveOrWait`'s input: the requested `(group,key,version)` triples plus
/// the routing selectors for this caller.
pub struct AcquireRequest {
    pub requested: Vec<RequestedConfigurationKey>,
    pub selectors: Selectors,
    pub opt_selectors: Selectors,
}

/// Synchronous handle returned alongside the wait channel. Re-acquires the
/// index write lock and removes this request's listener entries; idempotent.
pub struct CancelHandle {
    index: Arc<SelectorIndex>,
    request_id: u64,
    sel_key: String,
    opt_key: String,
    slots: Vec<(String, String)>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let request_id = self.request_id;
        let slots = &self.slots;
        self.index.with_write(|map| {
            if let Some(store) = index::get_general_mut(map, &self.sel_key, &self.opt_key) {
                store.cancel_wait(request_id, slots);
            }
        });
    }

    fn noop(index: Arc<SelectorIndex>) -> Self {
        CancelHandle {
            index,
            request_id: 0,
            sel_key: String::new(),
            opt_key: String::new(),
            slots: Vec::new(),
        }
    }
}

/// Implements "retrieve-or-wait": atomically decides between an immediate
/// response and registering waiters, and owns cancellation.
pub struct RequestCoordinator {
    index: Arc<SelectorIndex>,
    comparator: Arc<dyn VersionComparator>,
    next_request_id: AtomicU64,
}

impl RequestCoordinator {
    pub fn new(index: Arc<SelectorIndex>, comparator: Arc<dyn VersionComparator>) -> Self {
        RequestCoordinator {
            index,
            comparator,
            next_request_id: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn count_unknown(err: ConfigDistError) -> ConfigDistError {
        metrics::REQUESTS_TOTAL
            .with_label_values(&["unknown_configuration"])
            .inc();
        err
    }

    /// `getConfiguration`: identical to the read pass below without version
    /// comparison. Read-lock only.
    pub fn get_configuration(
        &self,
        group: &str,
        key: &str,
        sel_key: &str,
        opt_key: &str,
    ) -> Result<Configuration, ConfigDistError> {
        self.index.with_read(|map| {
            let store = index::get_general(map, sel_key, opt_key)
                .ok_or(ConfigDistError::UnknownConfiguration)?;
            store
                .get(group, key)
                .cloned()
                .ok_or(ConfigDistError::UnknownConfiguration)
        })
    }

    pub fn retrieve_or_wait(
        &self,
        request: AcquireRequest,
    ) -> Result<(mpsc::Receiver<NotifyEvent>, CancelHandle), ConfigDistError> {
        let sel_key = request.selectors.key().to_string();
        let opt_key = request.opt_selectors.key().to_string();
        let request_id = self.next_id();

        // step 1: read pass under the index read lock.
        let immediate = self.index.with_read(|map| -> Result<Option<Vec<Configuration>>, ConfigDistError> {
            let store = index::get_general(map, &sel_key, &opt_key)
                .ok_or(ConfigDistError::UnknownConfiguration)?;
            let mut diffs = Vec::new();
            for req in &request.requested {
                let cfg = store
                    .get(&req.group, &req.key)
                    .ok_or(ConfigDistError::UnknownConfiguration)?;
                if self.comparator.has_update(&req.version, &cfg.version) {
                    diffs.push(cfg.clone());
                }
            }
            Ok(if diffs.is_empty() { None } else { Some(diffs) })
        })
        .map_err(Self::count_unknown)?;

        if let Some(diffs) = immediate {
            metrics::REQUESTS_TOTAL.with_label_values(&["immediate"]).inc();
            return Ok((
                self.respond_immediately(diffs),
                CancelHandle::noop(self.index.clone()),
            ));
        }

        // step 2: wait pass under the index write lock, re-checking before registering.
        let slots: Vec<(String, String)> = request
            .requested
            .iter()
            .map(|r| (r.group.clone(), r.key.clone()))
            .collect();

        let outcome = self.index.with_write(|map| -> Result<WaitOutcome, ConfigDistError> {
            let store = index::get_general_mut(map, &sel_key, &opt_key)
                .ok_or(ConfigDistError::UnknownConfiguration)?;
            let mut diffs = Vec::new();
            for req in &request.requested {
                let cfg = store
                    .get(&req.group, &req.key)
                    .ok_or(ConfigDistError::UnknownConfiguration)?;
                if self.comparator.has_update(&req.version, &cfg.version) {
                    diffs.push(cfg.clone());
                }
            }
            if !diffs.is_empty() {
                return Ok(WaitOutcome::Immediate(diffs));
            }
            let (tx, rx) = mpsc::channel(request.requested.len().max(1));
            for req in &request.requested {
                store.register_listener(request_id, &req.group, &req.key, tx.clone());
            }
            Ok(WaitOutcome::Registered(rx))
        })
        .map_err(Self::count_unknown)?;

        match outcome {
            WaitOutcome::Immediate(diffs) => {
                metrics::REQUESTS_TOTAL.with_label_values(&["immediate"]).inc();
                Ok((
                    self.respond_immediately(diffs),
                    CancelHandle::noop(self.index.clone()),
                ))
            }
            WaitOutcome::Registered(rx) => {
                metrics::REQUESTS_TOTAL.with_label_values(&["waited"]).inc();
                let cancel = CancelHandle {
                    index: self.index.clone(),
                    request_id,
                    sel_key,
                    opt_key,
                    slots,
                };
                Ok((rx, cancel))
            }
        }
    }

    /// Buffers one event per update plus a close marker, matching what the
    /// channel would look like once the pump finishes a batch.
    fn respond_immediately(&self, diffs: Vec<Configuration>) -> mpsc::Receiver<NotifyEvent> {
        let (tx, rx) = mpsc::channel(diffs.len().max(1));
        for cfg in diffs {
            // Capacity == len(diffs), so this can never block or fail to enqueue.
            let _ = tx.try_send(NotifyEvent { configuration: cfg });
        }
        rx
    }
}

enum WaitOutcome {
    Immediate(Vec<Configuration>),
    Registered(mpsc::Receiver<NotifyEvent>),
}
