// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide metric collectors and the HTTP surface that exposes them.
//! Collectors register with the default registry exactly once, at first
//! touch; reporters only ever increment. The tracked variants remember
//! which label sets they wrote per address so a scan comparator can
//! delete series for addresses that disappeared.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderName;
use axum::routing::get;
use axum::Router;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const NAMESPACE: &str = "cert_scanner";

pub const EXPIRY_LABEL_KEYS: &[&str] = &[
    "address", "source", "source_type", "failed", "type",
    "warning_duration", "not_after", "not_after_date",
];
pub const NOT_YET_VALID_LABEL_KEYS: &[&str] = &[
    "address", "source", "source_type", "failed", "type",
    "until_valid", "not_before", "not_before_date",
];
pub const TLS_VERSION_LABEL_KEYS: &[&str] = &[
    "address", "source", "source_type", "failed", "type",
    "detected_version", "min_version",
];
pub const TRUST_CHAIN_LABEL_KEYS: &[&str] = &[
    "address", "source", "source_type", "failed", "type",
    "subject_cn", "issuer_cn", "authority_key_id",
];
pub const REQUIRE_TLS_LABEL_KEYS: &[&str] =
    &["address", "source", "source_type", "failed", "type"];
pub const CIPHER_SUITE_LABEL_KEYS: &[&str] = &[
    "address", "source", "source_type", "failed", "type", "detected_cipher",
];
pub const DURATIONS_LABEL_KEYS: &[&str] =
    &["address", "source", "source_type", "failed", "type"];

const DURATION_BUCKETS: &[f64] = &[5.0, 10.0, 50.0, 75.0, 100.0, 150.0, 300.0, 500.0, 750.0, 1000.0];
const SCAN_DURATION_BUCKETS: &[f64] =
    &[5.0, 10.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 1500.0];

/// Deletable series written on behalf of an address.
pub trait AddressSeries: Send + Sync {
    fn delete_address(&self, address: &str) -> bool;
}

/// A counter vector that remembers the label sets written per address.
pub struct TrackedCounterVec {
    vec: IntCounterVec,
    series: Mutex<HashMap<String, HashSet<Vec<String>>>>,
}

impl TrackedCounterVec {
    fn register(name: &str, help: &str, keys: &[&str]) -> Self {
        let opts = Opts::new(name, help).namespace(NAMESPACE);
        let vec = IntCounterVec::new(opts, keys).expect("invalid counter definition");
        prometheus::default_registry()
            .register(Box::new(vec.clone()))
            .expect("metric registered twice");
        TrackedCounterVec {
            vec,
            series: Mutex::new(HashMap::new()),
        }
    }

    pub fn inc(&self, address: Option<&str>, values: &[String]) {
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.vec.with_label_values(&refs).inc();
        if let Some(address) = address {
            self.series
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default()
                .insert(values.to_vec());
        }
    }

    #[cfg(test)]
    pub fn value(&self, values: &[String]) -> u64 {
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.vec.with_label_values(&refs).get()
    }
}

impl AddressSeries for TrackedCounterVec {
    fn delete_address(&self, address: &str) -> bool {
        let recorded = self.series.lock().unwrap().remove(address);
        match recorded {
            None => false,
            Some(sets) => {
                for values in sets {
                    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                    let _ = self.vec.remove_label_values(&refs);
                }
                true
            }
        }
    }
}

/// A histogram vector with the same per-address series tracking.
pub struct TrackedHistogramVec {
    vec: HistogramVec,
    series: Mutex<HashMap<String, HashSet<Vec<String>>>>,
}

impl TrackedHistogramVec {
    fn register(name: &str, help: &str, keys: &[&str], buckets: &[f64]) -> Self {
        let opts = HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .buckets(buckets.to_vec());
        let vec = HistogramVec::new(opts, keys).expect("invalid histogram definition");
        prometheus::default_registry()
            .register(Box::new(vec.clone()))
            .expect("metric registered twice");
        TrackedHistogramVec {
            vec,
            series: Mutex::new(HashMap::new()),
        }
    }

    pub fn observe(&self, address: Option<&str>, values: &[String], sample: f64) {
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.vec.with_label_values(&refs).observe(sample);
        if let Some(address) = address {
            self.series
                .lock()
                .unwrap()
                .entry(address.to_string())
                .or_default()
                .insert(values.to_vec());
        }
    }
}

impl AddressSeries for TrackedHistogramVec {
    fn delete_address(&self, address: &str) -> bool {
        let recorded = self.series.lock().unwrap().remove(address);
        match recorded {
            None => false,
            Some(sets) => {
                for values in sets {
                    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                    let _ = self.vec.remove_label_values(&refs);
                }
                true
            }
        }
    }
}

pub static EXPIRY_VALIDATIONS: Lazy<TrackedCounterVec> = Lazy::new(|| {
    TrackedCounterVec::register(
        "certificate_expiry_validations_total",
        "counts the results of certificate expiry validations",
        EXPIRY_LABEL_KEYS,
    )
});

pub static NOT_YET_VALID_VALIDATIONS: Lazy<TrackedCounterVec> = Lazy::new(|| {
    TrackedCounterVec::register(
        "certificate_not_yet_valid_validations_total",
        "counts the results of certificate not yet valid validations",
        NOT_YET_VALID_LABEL_KEYS,
    )
});

pub static TLS_VERSION_VALIDATIONS: Lazy<TrackedCounterVec> = Lazy::new(|| {
    TrackedCounterVec::register(
        "tls_version_validations_total",
        "counts the results of tls version validations",
        TLS_VERSION_LABEL_KEYS,
    )
});

pub static TRUST_CHAIN_VALIDATIONS: Lazy<TrackedCounterVec> = Lazy::new(|| {
    TrackedCounterVec::register(
        "trust_chain_validations_total",
        "counts the results of trust chain validations",
        TRUST_CHAIN_LABEL_KEYS,
    )
});

pub static REQUIRE_TLS_VALIDATIONS: Lazy<TrackedCounterVec> = Lazy::new(|| {
    TrackedCounterVec::register(
        "require_tls_validations_total",
        "counts the results of require tls validations",
        REQUIRE_TLS_LABEL_KEYS,
    )
});

pub static INVALID_CIPHER_SUITES: Lazy<TrackedCounterVec> = Lazy::new(|| {
    TrackedCounterVec::register(
        "invalid_cipher_suite_total",
        "counts the number of times an invalid cipher suite was detected",
        CIPHER_SUITE_LABEL_KEYS,
    )
});

pub static VALIDATION_DURATIONS: Lazy<TrackedHistogramVec> = Lazy::new(|| {
    TrackedHistogramVec::register(
        "validation_durations",
        "histogram tracking durations of each validation",
        DURATIONS_LABEL_KEYS,
        DURATION_BUCKETS,
    )
});

pub static TLS_VERSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("tls_version_total", "counts of each tls version detected")
        .namespace(NAMESPACE);
    let vec = IntCounterVec::new(
        opts,
        &["source", "source_type", "name", "success", "version", "cipher"],
    )
    .expect("invalid counter definition");
    prometheus::default_registry()
        .register(Box::new(vec.clone()))
        .expect("metric registered twice");
    vec
});

pub static SCAN_DURATIONS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "scan_duration_milliseconds",
        "duration of scans in milliseconds",
    )
    .namespace(NAMESPACE)
    .buckets(SCAN_DURATION_BUCKETS.to_vec());
    let vec = HistogramVec::new(opts, &["source", "source_type", "success"])
        .expect("invalid histogram definition");
    prometheus::default_registry()
        .register(Box::new(vec.clone()))
        .expect("metric registered twice");
    vec
});

async fn metrics_handler() -> ([(HeaderName, String); 1], Vec<u8>) {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buf) {
        error!(error = %err, "failed to encode prometheus metrics");
    }
    ([(CONTENT_TYPE, encoder.format_type().to_string())], buf)
}

/// Serves `/metrics` until the token fires.
pub async fn serve(listener: tokio::net::TcpListener, token: CancellationToken) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "metrics server listening");
    }
    let shutdown = async move { token.cancelled().await };
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %err, "metrics server exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(address: &str, tag: &str) -> Vec<String> {
        EXPIRY_LABEL_KEYS
            .iter()
            .map(|key| match *key {
                "address" => address.to_string(),
                "type" => tag.to_string(),
                other => format!("{other}-value"),
            })
            .collect()
    }

    #[test]
    fn tracked_counters_delete_recorded_series() {
        let vals = values("10.0.0.1:443", "expiry");
        EXPIRY_VALIDATIONS.inc(Some("10.0.0.1:443"), &vals);
        assert_eq!(EXPIRY_VALIDATIONS.value(&vals), 1);

        assert!(EXPIRY_VALIDATIONS.delete_address("10.0.0.1:443"));
        // a fresh series starts back at zero
        assert_eq!(EXPIRY_VALIDATIONS.value(&vals), 0);
    }

    #[test]
    fn deleting_an_unknown_address_is_a_noop() {
        assert!(!EXPIRY_VALIDATIONS.delete_address("203.0.113.9:443"));
    }
}
