// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cipher::CipherSuite;
use crate::error::ScanError;
use crate::state::ConnectionState;
use crate::target::{Labels, Target};

/// The outcome of exactly one (cipher, version) handshake attempt.
/// Construction starts the clock; `set_state` stops it.
#[derive(Debug)]
pub struct ScanResult {
    state: Option<ConnectionState>,
    cipher: &'static CipherSuite,
    started: Instant,
    duration: Duration,
    error: Option<ScanError>,
    target: Option<Arc<Target>>,
}

impl ScanResult {
    pub fn new(cipher: &'static CipherSuite) -> Self {
        ScanResult {
            state: None,
            cipher,
            started: Instant::now(),
            duration: Duration::ZERO,
            error: None,
            target: None,
        }
    }

    /// Records the attempt outcome. `state` is present iff the handshake
    /// succeeded; `error` is present iff it did not.
    pub fn set_state(&mut self, state: Option<ConnectionState>, error: Option<ScanError>) {
        self.duration = self.started.elapsed();
        self.state = state;
        self.error = error;
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn state(&self) -> Option<&ConnectionState> {
        self.state.as_ref()
    }

    pub fn cipher(&self) -> &'static CipherSuite {
        self.cipher
    }

    pub fn error(&self) -> Option<&ScanError> {
        self.error.as_ref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn target(&self) -> Option<&Arc<Target>> {
        self.target.as_ref()
    }

    /// Returns a fresh label map: the target's labels, the `failed` flag,
    /// any error labels, and the leaf certificate identity when present.
    pub fn labels(&self) -> Labels {
        let mut labels = self
            .target
            .as_ref()
            .map(|target| target.labels())
            .unwrap_or_default();
        labels.insert("failed".to_string(), self.failed().to_string());
        if let Some(error) = &self.error {
            for (k, v) in error.labels() {
                labels.insert(k, v);
            }
        }
        if let Some(state) = &self.state {
            if let Some(leaf) = state.peer_certificates.first() {
                labels.insert("id".to_string(), leaf.serial.clone());
                labels.insert("common_name".to_string(), leaf.common_name.clone());
            }
        }
        labels
    }
}

#[derive(Default)]
struct TargetScanInner {
    results: Vec<Arc<ScanResult>>,
    duration: Duration,
    first_successful: Option<Arc<ScanResult>>,
    violations: Vec<ScanError>,
}

/// Everything learned about a single target: one result per handshake
/// attempt plus the violations raised by validations. Insertion is
/// concurrent-safe; all aggregate state is guarded by one mutex.
pub struct TargetScan {
    target: Arc<Target>,
    started: Instant,
    inner: Mutex<TargetScanInner>,
}

impl TargetScan {
    pub fn new(target: Arc<Target>) -> Self {
        TargetScan {
            target,
            started: Instant::now(),
            inner: Mutex::new(TargetScanInner::default()),
        }
    }

    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    /// Adds the result of one handshake attempt. Sets the result's target
    /// back-pointer, refreshes the scan duration, and pins the first
    /// successful result ever observed.
    pub fn add(&self, mut result: ScanResult) -> Arc<ScanResult> {
        result.target = Some(Arc::clone(&self.target));
        let result = Arc::new(result);
        let mut inner = self.inner.lock().unwrap();
        inner.results.push(Arc::clone(&result));
        inner.duration = self.started.elapsed();
        if !result.failed() && inner.first_successful.is_none() {
            inner.first_successful = Some(Arc::clone(&result));
        }
        result
    }

    /// Records a detected violation. `None` is ignored so validations can
    /// be applied unconditionally.
    pub fn add_violation(&self, violation: Option<ScanError>) {
        if let Some(violation) = violation {
            self.inner.lock().unwrap().violations.push(violation);
        }
    }

    pub fn results(&self) -> Vec<Arc<ScanResult>> {
        self.inner.lock().unwrap().results.clone()
    }

    pub fn first_successful(&self) -> Option<Arc<ScanResult>> {
        self.inner.lock().unwrap().first_successful.clone()
    }

    pub fn violations(&self) -> Vec<ScanError> {
        self.inner.lock().unwrap().violations.clone()
    }

    /// True if any attempt against the target failed.
    pub fn failed(&self) -> bool {
        self.inner
            .lock()
            .unwrap()
            .results
            .iter()
            .any(|result| result.failed())
    }

    /// Time from scan start to the most recent insertion.
    pub fn duration(&self) -> Duration {
        self.inner.lock().unwrap().duration
    }
}

/// A finished scan, as handed to comparators.
pub trait CompletedScan {
    fn results(&self) -> Vec<Arc<TargetScan>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::cipher::ordered_cipher_suites;
    use crate::error::CONNECTION_ERROR;
    use crate::target::Metadata;

    fn test_target() -> Arc<Target> {
        Arc::new(Target {
            address: Address::parse("172.1.2.34:8080").unwrap(),
            metadata: Metadata {
                name: "test".to_string(),
                source: "unit".to_string(),
                source_type: "file".to_string(),
                labels: Labels::new(),
            },
        })
    }

    fn failed_result() -> ScanResult {
        let mut result = ScanResult::new(ordered_cipher_suites()[0]);
        result.set_state(
            None,
            Some(ScanError::Connection {
                message: "connection refused".to_string(),
            }),
        );
        result
    }

    fn successful_result() -> ScanResult {
        let mut result = ScanResult::new(ordered_cipher_suites()[0]);
        result.set_state(None, None);
        result
    }

    #[test]
    fn failed_iff_error_present() {
        assert!(failed_result().failed());
        assert!(!successful_result().failed());
    }

    #[test]
    fn first_successful_is_sticky() {
        let scan = TargetScan::new(test_target());
        scan.add(failed_result());
        assert!(scan.first_successful().is_none());

        let first = scan.add(successful_result());
        let second = scan.add(successful_result());
        assert!(Arc::ptr_eq(&scan.first_successful().unwrap(), &first));
        assert!(!Arc::ptr_eq(&scan.first_successful().unwrap(), &second));
    }

    #[test]
    fn first_successful_is_none_iff_every_result_failed() {
        let scan = TargetScan::new(test_target());
        scan.add(failed_result());
        scan.add(failed_result());
        assert!(scan.first_successful().is_none());
        assert!(scan.failed());

        let scan = TargetScan::new(test_target());
        scan.add(successful_result());
        assert!(scan.first_successful().is_some());
        assert!(!scan.failed());
    }

    #[test]
    fn target_is_attached_on_insertion() {
        let scan = TargetScan::new(test_target());
        let result = scan.add(successful_result());
        assert!(Arc::ptr_eq(result.target().unwrap(), scan.target()));
    }

    #[test]
    fn duration_tracks_last_insert() {
        let scan = TargetScan::new(test_target());
        scan.add(failed_result());
        let after_first = scan.duration();
        std::thread::sleep(Duration::from_millis(5));
        scan.add(failed_result());
        assert!(scan.duration() >= after_first);
    }

    #[test]
    fn labels_merge_without_aliasing() {
        let scan = TargetScan::new(test_target());
        let result = scan.add(failed_result());
        let mut first = result.labels();
        let second = result.labels();
        assert_eq!(first, second);
        assert_eq!(first.get("failed").unwrap(), "true");
        assert_eq!(first.get("type").unwrap(), CONNECTION_ERROR);
        assert_eq!(first.get("address").unwrap(), "172.1.2.34:8080");

        first.insert("aliased".to_string(), "no".to_string());
        assert!(!result.labels().contains_key("aliased"));
    }

    #[test]
    fn violations_ignore_none() {
        let scan = TargetScan::new(test_target());
        scan.add_violation(None);
        assert!(scan.violations().is_empty());
        scan.add_violation(Some(ScanError::RequireTls { result: None }));
        assert_eq!(scan.violations().len(), 1);
    }

    #[test]
    fn concurrent_insertion_keeps_every_result() {
        let scan = Arc::new(TargetScan::new(test_target()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let scan = Arc::clone(&scan);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    scan.add(successful_result());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(scan.results().len(), 400);
        assert!(scan.first_successful().is_some());
    }
}
