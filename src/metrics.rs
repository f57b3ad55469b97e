// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

/// A collection of Prometheus metrics for the core. An embedding transport
/// decides whether and how to expose these, the way `mem_etcd`'s `main.rs`
/// wires `prometheus::TextEncoder` into an axum route.
pub struct Metrics;

impl Metrics {
    /// Force registration of all static metrics so they appear in
    /// `prometheus::gather()` immediately instead of after first use.
    pub fn init() {
        let _ = &*REQUESTS_TOTAL;
        let _ = &*PUMP_BATCH_SIZE;
        let _ = &*PUMP_RETRY_COUNT;
    }
}

/// Labeled by outcome: "immediate", "waited", "unknown_configuration".
pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "configdist_requests_total",
        "retrieveOrWait calls, labeled by outcome",
        &["outcome"]
    )
    .expect("cannot create metric: configdist_requests_total")
});

pub static PUMP_BATCH_SIZE: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "configdist_pump_batch_size",
        "Number of events applied per pump tail batch",
        &["phase"],
        vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0]
    )
    .expect("cannot create metric: configdist_pump_batch_size")
});

pub static PUMP_RETRY_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "configdist_pump_retries_total",
        "Transient data-source errors absorbed by the pump",
        &["stage"]
    )
    .expect("cannot create metric: configdist_pump_retries_total")
});
