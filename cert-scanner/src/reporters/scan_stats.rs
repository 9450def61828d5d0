// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use scan_model::{Reporter, TargetScan};

use crate::metrics;
use crate::settings::{keys, Settings};

/// Tracks what each scan actually observed: a TLS version counter per
/// result and a scan duration histogram per target.
pub struct ScanStatsReporter {
    only_successful: bool,
}

impl ScanStatsReporter {
    pub fn new(only_successful: bool) -> Self {
        ScanStatsReporter { only_successful }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.get_bool(keys::REPORTERS_SCAN_STATS_ONLY_SUCCESSFUL, false))
    }
}

#[async_trait]
impl Reporter for ScanStatsReporter {
    async fn report(&self, scan: &TargetScan) {
        let source = scan.target().metadata.source.as_str();
        let source_type = scan.target().metadata.source_type.as_str();
        let name = scan.target().metadata.name.as_str();
        let scan_millis = scan.duration().as_millis() as f64;

        for result in scan.results() {
            let success = if result.failed() { "false" } else { "true" };
            let (version, cipher) = match result.state() {
                Some(state) => (state.version.to_string(), state.cipher.name),
                None => ("n/a".to_string(), "n/a"),
            };

            metrics::SCAN_DURATIONS
                .with_label_values(&[source, source_type, success])
                .observe(scan_millis);

            if !self.only_successful || !result.failed() {
                metrics::TLS_VERSIONS
                    .with_label_values(&[
                        source,
                        source_type,
                        name,
                        success,
                        version.as_str(),
                        cipher,
                    ])
                    .inc();
            }
        }
    }
}
