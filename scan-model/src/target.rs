// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use crate::address::Address;

pub type Labels = BTreeMap<String, String>;

/// Provenance and naming attached to a target by the discovery that
/// emitted it.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub name: String,
    pub source: String,
    pub source_type: String,
    pub labels: Labels,
}

/// A discovered service that may be TLS enabled. Immutable once emitted
/// from a discovery.
#[derive(Debug, Clone)]
pub struct Target {
    pub address: Address,
    pub metadata: Metadata,
}

impl Target {
    /// Returns a fresh copy of the target's labels merged with the derived
    /// `source`, `source_type` and `address` keys.
    pub fn labels(&self) -> Labels {
        let mut labels = Labels::new();
        labels.insert("source".to_string(), self.metadata.source.clone());
        labels.insert("source_type".to_string(), self.metadata.source_type.clone());
        labels.insert("address".to_string(), self.address.to_string());
        for (k, v) in &self.metadata.labels {
            labels.insert(k.clone(), v.clone());
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_target() -> Target {
        Target {
            address: Address::parse("172.1.2.34:8080").unwrap(),
            metadata: Metadata {
                name: "SomePod-acdf-bdfe".to_string(),
                source: "SomePod-acdf-bdfe".to_string(),
                source_type: "kubernetes".to_string(),
                labels: Labels::from([("foo".to_string(), "bar".to_string())]),
            },
        }
    }

    #[test]
    fn labels_merge_metadata_with_derived_keys() {
        let labels = test_target().labels();
        assert_eq!(labels.get("source").unwrap(), "SomePod-acdf-bdfe");
        assert_eq!(labels.get("source_type").unwrap(), "kubernetes");
        assert_eq!(labels.get("address").unwrap(), "172.1.2.34:8080");
        assert_eq!(labels.get("foo").unwrap(), "bar");
    }

    #[test]
    fn labels_are_a_copy() {
        let target = test_target();
        let mut first = target.labels();
        first.insert("mutated".to_string(), "yes".to_string());
        let second = target.labels();
        assert!(!second.contains_key("mutated"));
        assert_eq!(second, test_target().labels());
    }
}
