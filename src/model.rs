// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Benjamin Chess
use crate::selector::Selectors;
use sha2::{Digest, Sha256};

/// The unit of distribution. Identified end-to-end by
/// `(selectorsKey, optSelectorsKey, group, key)`.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub group: String,
    pub key: String,
    pub version: String,
    pub value: bytes::Bytes,
    pub signature: String,
    pub selectors: Selectors,
    pub opt_selectors: Selectors,
    pub timestamp: i64,
}

impl Configuration {
    /// `sha256:` followed by the lowercase hex SHA-256 of `value`.
    pub fn generate_signature(value: &[u8]) -> String {
        let digest = Sha256::digest(value);
        format!("sha256:{}", hex::encode(digest))
    }

    pub fn validate_signature(&self) -> bool {
        self.signature == Self::generate_signature(&self.value)
    }

    /// `group` and `key` non-empty, signature validates against `value`.
    pub fn validate_invariants(&self) -> Result<(), crate::error::ConfigDistError> {
        if self.group.is_empty() || self.key.is_empty() {
            return Err(crate::error::ConfigDistError::InvariantViolation(
                "group and key must be non-empty".to_string(),
            ));
        }
        if !self.validate_signature() {
            return Err(crate::error::ConfigDistError::InvariantViolation(
                "signature does not match value".to_string(),
            ));
        }
        Ok(())
    }
}

/// `(group, key, version)` triple naming the version currently held by a client.
#[derive(Debug, Clone)]
pub struct RequestedConfigurationKey {
    pub group: String,
    pub key: String,
    pub version: String,
}

/// The undecoded row shape a `DataSource` reads back before selector
/// canonicalization and signature validation have been applied.
#[derive(Debug, Clone)]
pub struct RawConfiguration {
    pub group: String,
    pub key: String,
    pub version: String,
    pub value: bytes::Bytes,
}

/// Tagged union produced by the pump. Exactly one of `created`/`modified`/
/// `deleted` is semantically meaningful per event.
#[derive(Debug, Clone)]
pub struct Event {
    pub configuration: Configuration,
    pub created: bool,
    pub modified: bool,
    pub deleted: bool,
    /// Monotonic sequence assigned by the source of truth.
    pub sequence: i64,
}

/// CBOR wire shapes from spec.md §6. The transport that serializes these is
/// out of scope for this crate; the shapes are kept typed so a future
/// transport crate doesn't have to reverse-engineer the tags from prose.
pub mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SelectorsWire {
        pub data: std::collections::HashMap<String, String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ConfigurationWire {
        pub group: String,
        pub key: String,
        pub version: String,
        /// Plain byte vector rather than `bytes::Bytes`: the latter has no
        /// direct CBOR-friendly `Serialize`/`Deserialize` impl without the
        /// `serde` byte-string helpers, and a transport re-wraps this in
        /// `bytes::Bytes` on decode anyway.
        pub value: Vec<u8>,
        #[serde(rename = "sign")]
        pub signature: String,
        pub selectors: SelectorsWire,
        #[serde(rename = "opt_selectors")]
        pub opt_selectors: SelectorsWire,
        pub timestamp: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RequestedConfigurationKeyWire {
        pub group: String,
        pub key: String,
        pub version: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AcquireConfigurationReq {
        #[serde(rename = "req")]
        pub requested: Vec<RequestedConfigurationKeyWire>,
        pub selectors: SelectorsWire,
        #[serde(rename = "opt_selectors")]
        pub opt_selectors: SelectorsWire,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AcquireConfigurationRes {
        #[serde(rename = "req")]
        pub requested: Vec<ConfigurationWire>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AcquireConfigurationFailRes {
        pub code: String,
        #[serde(rename = "msg")]
        pub message: String,
        pub info_list: Vec<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct GetConfigurationRes {
        pub code: String,
        #[serde(rename = "msg")]
        pub message: String,
        #[serde(rename = "cfg")]
        pub configuration: ConfigurationWire,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let sig = Configuration::generate_signature(b"a");
        assert_eq!(
            sig,
            "sha256:ca978112ca1bbdcafac231b39a23dc4da786eff8147c4e72b9807785afee48bb"
        );
    }

    #[test]
    fn wire_configuration_round_trips_through_cbor() {
        use std::collections::HashMap;
        let mut data = HashMap::new();
        data.insert("area".to_string(), "dc1".to_string());
        let original = wire::ConfigurationWire {
            group: "g1".to_string(),
            key: "k1".to_string(),
            version: "v1".to_string(),
            value: b"a".to_vec(),
            signature: Configuration::generate_signature(b"a"),
            selectors: wire::SelectorsWire { data },
            opt_selectors: wire::SelectorsWire {
                data: HashMap::new(),
            },
            timestamp: 1700000000,
        };

        let mut buf = Vec::new();
        ciborium::into_writer(&original, &mut buf).unwrap();
        let decoded: wire::ConfigurationWire = ciborium::from_reader(buf.as_slice()).unwrap();

        assert_eq!(decoded.group, original.group);
        assert_eq!(decoded.key, original.key);
        assert_eq!(decoded.signature, original.signature);
        assert_eq!(decoded.selectors.data, original.selectors.data);
    }
}
