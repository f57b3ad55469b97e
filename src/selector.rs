// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use std::collections::HashMap;
use std::sync::OnceLock;

/// An unordered routing attribute map. Its canonical fingerprint is computed
/// once and cached on the instance; two `Selectors` with the same (k,v)
/// multiset always produce byte-identical fingerprints regardless of
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct Selectors {
    data: HashMap<String, String>,
    cached: OnceLock<String>,
}

impl Selectors {
    pub fn new(data: HashMap<String, String>) -> Self {
        Selectors {
            data,
            cached: OnceLock::new(),
        }
    }

    pub fn empty() -> Self {
        Selectors::default()
    }

    pub fn data(&self) -> &HashMap<String, String> {
        &self.data
    }

    /// Returns the canonical fingerprint, computing and caching it on first use.
    pub fn key(&self) -> &str {
        self.cached.get_or_init(|| canonicalize(&self.data))
    }
}

impl PartialEq for Selectors {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}
impl Eq for Selectors {}

/// Sorts keys by byte comparison and renders `k=v` pairs joined by `,`.
/// Empty map produces the empty string.
fn canonicalize(data: &HashMap<String, String>) -> String {
    if data.is_empty() {
        return String::new();
    }
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();
    let mut out = String::new();
    for (i, k) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(k);
        out.push('=');
        out.push_str(&data[*k]);
    }
    out
}
