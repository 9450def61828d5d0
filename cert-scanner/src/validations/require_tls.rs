// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::debug;

use scan_model::{ScanError, ScanResult, TargetScan, Validation};

/// Flags targets that never completed a TLS handshake with any (cipher,
/// version) combination. The one validation that fires precisely when
/// there is no successful result.
pub struct RequireTlsValidation;

impl RequireTlsValidation {
    pub fn new() -> Self {
        RequireTlsValidation
    }
}

impl Default for RequireTlsValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl Validation for RequireTlsValidation {
    fn validate(&self, scan: &TargetScan) -> Option<ScanError> {
        debug!(target = %scan.target().metadata.name, "validating target is configured with TLS");
        let mut last_failed: Option<Arc<ScanResult>> = None;
        for result in scan.results() {
            if !result.failed() {
                // any successful result is a pass
                return None;
            }
            last_failed = Some(result);
        }
        Some(ScanError::RequireTls {
            result: last_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validations::testutil::test_target;
    use scan_model::{cipher, ScanResult};

    fn failed_result() -> ScanResult {
        let mut result = ScanResult::new(cipher::ordered_cipher_suites()[0]);
        result.set_state(
            None,
            Some(ScanError::Connection {
                message: "connection refused".to_string(),
            }),
        );
        result
    }

    fn successful_result() -> ScanResult {
        let mut result = ScanResult::new(cipher::ordered_cipher_suites()[0]);
        result.set_state(None, None);
        result
    }

    #[test]
    fn passes_when_any_attempt_succeeded() {
        let scan = TargetScan::new(test_target());
        scan.add(failed_result());
        scan.add(successful_result());
        assert!(RequireTlsValidation::new().validate(&scan).is_none());
    }

    #[test]
    fn fails_when_every_attempt_failed() {
        let scan = TargetScan::new(test_target());
        scan.add(failed_result());
        scan.add(failed_result());
        let violation = RequireTlsValidation::new()
            .validate(&scan)
            .expect("expected a violation");
        assert_eq!(violation.to_string(), "target is not configured with TLS");

        let labels = violation.labels();
        assert_eq!(labels.get("type").unwrap(), "require_tls");
        assert_eq!(labels.get("address").unwrap(), "172.1.2.34:8080");
    }

    #[test]
    fn fails_on_an_empty_scan_without_result_labels() {
        let scan = TargetScan::new(test_target());
        let violation = RequireTlsValidation::new()
            .validate(&scan)
            .expect("expected a violation");
        let labels = violation.labels();
        assert_eq!(labels.get("type").unwrap(), "require_tls");
        assert!(!labels.contains_key("address"));
    }
}
