// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use scan_model::{CompletedScan, ScanComparator, ScanComparators};

use crate::metrics::{self, AddressSeries};
use crate::registry::{configured, Factory};
use crate::settings::Settings;

/// Clears metric series for addresses that were scanned previously but
/// are gone from the current scan, so dashboards stop showing endpoints
/// that no longer exist.
pub struct MetricsComparator {
    tracked: Vec<&'static dyn AddressSeries>,
}

impl MetricsComparator {
    pub fn new() -> Self {
        MetricsComparator {
            tracked: vec![
                &*metrics::EXPIRY_VALIDATIONS,
                &*metrics::NOT_YET_VALID_VALIDATIONS,
                &*metrics::TLS_VERSION_VALIDATIONS,
                &*metrics::TRUST_CHAIN_VALIDATIONS,
                &*metrics::REQUIRE_TLS_VALIDATIONS,
                &*metrics::INVALID_CIPHER_SUITES,
                &*metrics::VALIDATION_DURATIONS,
            ],
        }
    }

    #[cfg(test)]
    fn with_tracked(tracked: Vec<&'static dyn AddressSeries>) -> Self {
        MetricsComparator { tracked }
    }
}

impl Default for MetricsComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanComparator for MetricsComparator {
    fn compare(&self, previous: &dyn CompletedScan, current: &dyn CompletedScan) {
        let current_addresses: HashSet<String> = current
            .results()
            .iter()
            .map(|scan| scan.target().address.to_string())
            .collect();

        for scan in previous.results() {
            let address = scan.target().address.to_string();
            if current_addresses.contains(&address) {
                continue;
            }
            debug!(
                address = %address,
                target = %scan.target().metadata.name,
                "previous target address not in current scan results, removing from metrics"
            );
            for tracked in &self.tracked {
                tracked.delete_address(&address);
            }
        }
    }
}

/// Builds the configured comparators. The metrics comparator is always
/// present; the registry exists for future comparator kinds.
pub fn create_comparators(settings: &Settings) -> anyhow::Result<ScanComparators> {
    let factories: Vec<Factory<Arc<dyn ScanComparator>>> = Vec::new();
    let mut comparators = configured(settings, "comparators", factories)?;
    comparators.push(Arc::new(MetricsComparator::new()));
    Ok(comparators)
}
