// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use thiserror::Error;

/// Error taxonomy for the core. Only `UnknownConfiguration` and `SourceFatal`
/// are meant to leave the crate; `SourceTransient` is retried by the pump and
/// `InvariantViolation` is logged and absorbed at the call site that detects it.
#[derive(Debug, Error)]
pub enum ConfigDistError {
    #[error("unknown configuration")]
    UnknownConfiguration,

    #[error("data source transient error: {0}")]
    SourceTransient(String),

    #[error("data source startup failed: {0}")]
    SourceFatal(String),

    #[error("internal invariant violation: {0}")]
    InvariantViolation(String),
}
