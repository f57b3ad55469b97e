// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use std::collections::HashMap;
use std::sync::RwLock;

use crate::store::ConfigurationStore;

/// For one `selectorsKey`: the primary store plus a secondary mapping from
/// `optSelectorsKey` to a variant-specific store.
#[derive(Default)]
pub(crate) struct Bucket {
    primary: ConfigurationStore,
    variants: HashMap<String, ConfigurationStore>,
}

/// Two-level routing map from `(selectorsKey, optSelectorsKey)` to a
/// `ConfigurationStore`, with fallback semantics. Owns every `Bucket` and is
/// protected by a single multi-reader/single-writer lock; no operation ever
/// suspends while holding it.
#[derive(Default)]
pub struct SelectorIndex {
    inner: RwLock<HashMap<String, Bucket>>,
}

impl SelectorIndex {
    pub fn new() -> Self {
        SelectorIndex::default()
    }

    /// Runs `f` with the map held under the read lock. The closure may call
    /// `get_general` on the borrowed map but must not mutate it.
    pub(crate) fn with_read<R>(&self, f: impl FnOnce(&HashMap<String, Bucket>) -> R) -> R {
        let guard = self.inner.read().expect("selector index lock poisoned");
        f(&guard)
    }

    /// Runs `f` with the map held under the write lock.
    pub(crate) fn with_write<R>(&self, f: impl FnOnce(&mut HashMap<String, Bucket>) -> R) -> R {
        let mut guard = self.inner.write().expect("selector index lock poisoned");
        f(&mut guard)
    }
}

/// Lookup with fallback. If `sel_key` is absent, `None`. If `opt_key` is
/// empty, the primary store for `sel_key`. If `opt_key` is present and
/// registered, that variant store; otherwise the primary store.
pub(crate) fn get_general<'a>(
    map: &'a HashMap<String, Bucket>,
    sel_key: &str,
    opt_key: &str,
) -> Option<&'a ConfigurationStore> {
    let bucket = map.get(sel_key)?;
    if opt_key.is_empty() {
        return Some(&bucket.primary);
    }
    Some(bucket.variants.get(opt_key).unwrap_or(&bucket.primary))
}

pub(crate) fn get_general_mut<'a>(
    map: &'a mut HashMap<String, Bucket>,
    sel_key: &str,
    opt_key: &str,
) -> Option<&'a mut ConfigurationStore> {
    let bucket = map.get_mut(sel_key)?;
    if opt_key.is_empty() {
        return Some(&mut bucket.primary);
    }
    if bucket.variants.contains_key(opt_key) {
        return bucket.variants.get_mut(opt_key);
    }
    Some(&mut bucket.primary)
}

/// Same lookup, creating missing entries as needed. Never returns `None`.
pub(crate) fn get_or_create<'a>(
    map: &'a mut HashMap<String, Bucket>,
    sel_key: &str,
    opt_key: &str,
) -> &'a mut ConfigurationStore {
    let bucket = map.entry(sel_key.to_string()).or_default();
    if opt_key.is_empty() {
        return &mut bucket.primary;
    }
    bucket
        .variants
        .entry(opt_key.to_string())
        .or_insert_with(ConfigurationStore::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Configuration;
    use crate::selector::Selectors;
    use std::collections::HashMap as StdHashMap;

    fn cfg(group: &str, key: &str, version: &str) -> Configuration {
        let value = bytes::Bytes::from_static(b"x");
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

    #[test]
    fn absent_selectors_key_returns_none() {
        let idx = SelectorIndex::new();
        idx.with_read(|m| assert!(get_general(m, "area=dc1", "").is_none()));
    }

    #[test]
    fn opt_selector_fallback_to_primary() {
        let idx = SelectorIndex::new();
        idx.with_write(|m| {
            let mut accumulated = StdHashMap::new();
            get_or_create(m, "area=dc1", "").save_and_notify(cfg("g", "k", "base"), &mut accumulated);
            get_or_create(m, "area=dc1", "host=h1")
                .save_and_notify(cfg("g", "k", "variant"), &mut accumulated);
        });
        idx.with_read(|m| {
            // host=h1 -> variant-specific entry
            let store = get_general(m, "area=dc1", "host=h1").unwrap();
            assert_eq!(store.get("g", "k").unwrap().version, "variant");
            // host=h2 has no variant store -> falls back to base
            let store = get_general(m, "area=dc1", "host=h2").unwrap();
            assert_eq!(store.get("g", "k").unwrap().version, "base");
            // empty opt selectors -> base
            let store = get_general(m, "area=dc1", "").unwrap();
            assert_eq!(store.get("g", "k").unwrap().version, "base");
        });
    }
}
