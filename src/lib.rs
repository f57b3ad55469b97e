// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
//! Core of a long-polling configuration distribution server: a two-level
//! selector routing index, a waiter registry with at-most-one-delivery per
//! long-poll request, and a pump that bridges a bulk bootstrap dump into
//! steady-state incremental tailing. The HTTP/CBOR transport, the database
//! schema, and the CLI entry point are external collaborators and are not
//! implemented here.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod metrics;
pub mod model;
pub mod pump;
pub mod selector;
pub mod source;
pub mod store;
pub mod version;

pub use coordinator::{AcquireRequest, CancelHandle, RequestCoordinator};
pub use error::ConfigDistError;
pub use index::SelectorIndex;
pub use model::{Configuration, Event, RawConfiguration, RequestedConfigurationKey};
pub use pump::{Pump, PumpOptions, PumpState};
pub use selector::Selectors;
pub use source::DataSource;
pub use version::{DefaultVersionComparator, VersionComparator};
