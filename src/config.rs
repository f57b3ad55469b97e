// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use std::time::Duration;

/// Plain data carried by an embedding transport; this crate does none of the
/// env/CLI parsing itself (the CLI entry point is an external collaborator).
#[derive(Debug, Clone)]
pub struct CoreOptions {
    pub coalesce_size: usize,
    pub batch_sleep: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Owned by the transport's wait timer, not this crate; kept here only
    /// so a transport has one documented default to read instead of
    /// inventing its own.
    pub max_wait_time_for_update: Duration,
}

impl Default for CoreOptions {
    fn default() -> Self {
        CoreOptions {
            coalesce_size: 50,
            batch_sleep: Duration::from_millis(500),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5),
            max_wait_time_for_update: Duration::from_secs(60),
        }
    }
}

impl From<&CoreOptions> for crate::pump::PumpOptions {
    fn from(opts: &CoreOptions) -> Self {
        crate::pump::PumpOptions {
            coalesce_size: opts.coalesce_size,
            batch_sleep: opts.batch_sleep,
            backoff_initial: opts.backoff_initial,
            backoff_max: opts.backoff_max,
        }
    }
}
