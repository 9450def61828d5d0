// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;

use scan_model::{Labels, Reporter, TargetScan};

use crate::metrics::{self, TrackedCounterVec, TrackedHistogramVec};

/// Projects a merged label map onto a fixed key list; keys the scan did
/// not produce become `"n/a"` so the series shape stays constant.
pub fn filter_label_values(labels: &Labels, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .map(|key| labels.get(*key).cloned().unwrap_or_else(|| "n/a".to_string()))
        .collect()
}

fn merged_labels(scan: &TargetScan, violation_labels: Labels) -> Labels {
    let mut merged = scan.target().labels();
    for (k, v) in violation_labels {
        merged.insert(k, v);
    }
    merged
}

/// Counts violations of one kind, projecting each violation's labels onto
/// the counter's fixed key list.
pub struct CounterReporter {
    counter: &'static TrackedCounterVec,
    label_keys: &'static [&'static str],
    kind: &'static str,
}

impl CounterReporter {
    pub fn new(
        counter: &'static TrackedCounterVec,
        label_keys: &'static [&'static str],
        kind: &'static str,
    ) -> Self {
        CounterReporter {
            counter,
            label_keys,
            kind,
        }
    }
}

#[async_trait]
impl Reporter for CounterReporter {
    async fn report(&self, scan: &TargetScan) {
        for violation in scan.violations() {
            if violation.kind() != self.kind {
                continue;
            }
            let merged = merged_labels(scan, violation.labels());
            let values = filter_label_values(&merged, self.label_keys);
            self.counter.inc(merged.get("address").map(String::as_str), &values);
        }
    }
}

/// Observes the probe duration behind each violation of one kind.
pub struct HistogramReporter {
    histogram: &'static TrackedHistogramVec,
    label_keys: &'static [&'static str],
}

impl HistogramReporter {
    pub fn new(
        histogram: &'static TrackedHistogramVec,
        label_keys: &'static [&'static str],
    ) -> Self {
        HistogramReporter {
            histogram,
            label_keys,
        }
    }
}

#[async_trait]
impl Reporter for HistogramReporter {
    async fn report(&self, scan: &TargetScan) {
        for violation in scan.violations() {
            let Some(result) = violation.result() else {
                continue;
            };
            let sample = result.duration().as_millis() as f64;
            let merged = merged_labels(scan, violation.labels());
            let values = filter_label_values(&merged, self.label_keys);
            self.histogram
                .observe(merged.get("address").map(String::as_str), &values, sample);
        }
    }
}

pub fn expiry_reporter() -> Arc<dyn Reporter> {
    Arc::new(CounterReporter::new(
        &metrics::EXPIRY_VALIDATIONS,
        metrics::EXPIRY_LABEL_KEYS,
        "expiry",
    ))
}

pub fn not_yet_valid_reporter() -> Arc<dyn Reporter> {
    Arc::new(CounterReporter::new(
        &metrics::NOT_YET_VALID_VALIDATIONS,
        metrics::NOT_YET_VALID_LABEL_KEYS,
        "not_yet_valid",
    ))
}

pub fn tls_version_reporter() -> Arc<dyn Reporter> {
    Arc::new(CounterReporter::new(
        &metrics::TLS_VERSION_VALIDATIONS,
        metrics::TLS_VERSION_LABEL_KEYS,
        "tls_version",
    ))
}

pub fn trust_chain_reporter() -> Arc<dyn Reporter> {
    Arc::new(CounterReporter::new(
        &metrics::TRUST_CHAIN_VALIDATIONS,
        metrics::TRUST_CHAIN_LABEL_KEYS,
        "trust_chain",
    ))
}

pub fn require_tls_reporter() -> Arc<dyn Reporter> {
    Arc::new(CounterReporter::new(
        &metrics::REQUIRE_TLS_VALIDATIONS,
        metrics::REQUIRE_TLS_LABEL_KEYS,
        "require_tls",
    ))
}

pub fn cipher_suite_reporter() -> Arc<dyn Reporter> {
    Arc::new(CounterReporter::new(
        &metrics::INVALID_CIPHER_SUITES,
        metrics::CIPHER_SUITE_LABEL_KEYS,
        "cipher_suite",
    ))
}

pub fn durations_reporter() -> Arc<dyn Reporter> {
    Arc::new(HistogramReporter::new(
        &metrics::VALIDATION_DURATIONS,
        metrics::DURATIONS_LABEL_KEYS,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_model::{Address, Labels as ModelLabels, Metadata, ScanError, Target, TargetScan};
    use std::sync::Arc as StdArc;

    fn scan_with_require_tls_violation(address: &str) -> TargetScan {
        let target = StdArc::new(Target {
            address: Address::parse(address).unwrap(),
            metadata: Metadata {
                name: "counter-test".to_string(),
                source: "unit".to_string(),
                source_type: "file".to_string(),
                labels: ModelLabels::new(),
            },
        });
        let scan = TargetScan::new(target);
        scan.add_violation(Some(ScanError::RequireTls { result: None }));
        scan
    }

    #[test]
    fn projection_fills_missing_keys() {
        let mut labels = Labels::new();
        labels.insert("type".to_string(), "expiry".to_string());
        let values = filter_label_values(&labels, &["type", "absent", "also_absent"]);
        assert_eq!(values, vec!["expiry", "n/a", "n/a"]);
    }

    #[tokio::test]
    async fn counter_reporter_counts_matching_violations() {
        let address = "10.11.12.13:4443";
        let scan = scan_with_require_tls_violation(address);
        let reporter = CounterReporter::new(
            &metrics::REQUIRE_TLS_VALIDATIONS,
            metrics::REQUIRE_TLS_LABEL_KEYS,
            "require_tls",
        );
        reporter.report(&scan).await;

        let merged = merged_labels(&scan, scan.violations()[0].labels());
        let values = filter_label_values(&merged, metrics::REQUIRE_TLS_LABEL_KEYS);
        assert_eq!(metrics::REQUIRE_TLS_VALIDATIONS.value(&values), 1);
        // the empty require_tls violation has no failed label to project
        assert!(values.contains(&"n/a".to_string()));
    }

    #[tokio::test]
    async fn counter_reporter_ignores_other_kinds() {
        let scan = scan_with_require_tls_violation("10.11.12.14:4443");
        let reporter = CounterReporter::new(
            &metrics::EXPIRY_VALIDATIONS,
            metrics::EXPIRY_LABEL_KEYS,
            "expiry",
        );
        reporter.report(&scan).await;

        let merged = merged_labels(&scan, scan.violations()[0].labels());
        let values = filter_label_values(&merged, metrics::EXPIRY_LABEL_KEYS);
        assert_eq!(metrics::EXPIRY_VALIDATIONS.value(&values), 0);
    }
}
