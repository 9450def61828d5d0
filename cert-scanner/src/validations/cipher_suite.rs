// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::bail;
use tracing::debug;

use scan_model::{cipher, ScanError, TargetScan, Validation};

use crate::settings::{keys, Settings};

/// Flags targets that negotiated any cipher outside a configured
/// allow-list. Only names the runtime actually offers are accepted in the
/// list, so typos fail at construction rather than silently never
/// matching.
#[derive(Debug)]
pub struct CipherSuiteValidation {
    allowed: BTreeSet<&'static str>,
}

impl CipherSuiteValidation {
    pub fn new(allowed_names: &[String]) -> anyhow::Result<Self> {
        let mut allowed = BTreeSet::new();
        for name in allowed_names {
            match cipher::find(name) {
                Some(suite) if suite.secure => {
                    allowed.insert(suite.name);
                }
                _ => bail!("configured cipher {name} not present in available cipher suites"),
            }
        }
        if allowed.is_empty() {
            bail!(
                "no allowed ciphers configured, check config for {}. Ensure that at least one \
                 of the configured ciphers is a supported suite",
                keys::VALIDATIONS_ALLOWED_CIPHERS
            );
        }
        Ok(CipherSuiteValidation { allowed })
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(&settings.get_strings(keys::VALIDATIONS_ALLOWED_CIPHERS))
    }
}

impl Validation for CipherSuiteValidation {
    fn validate(&self, scan: &TargetScan) -> Option<ScanError> {
        debug!(target = %scan.target().metadata.name, "validating target is using allowed ciphers");
        for result in scan.results() {
            if result.failed() {
                continue;
            }
            let Some(state) = result.state().cloned() else {
                continue;
            };
            if !self.allowed.contains(state.cipher.name) {
                return Some(ScanError::CipherSuite {
                    detected_cipher: state.cipher.name,
                    result: Arc::clone(&result),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validations::testutil::test_target;
    use scan_model::cipher::SECURE_SUITES;
    use scan_model::{ConnectionState, ScanResult, TlsVersion};

    fn allowed() -> Vec<String> {
        vec![
            SECURE_SUITES[0].name.to_string(),
            SECURE_SUITES[1].name.to_string(),
        ]
    }

    fn result_with_cipher(index: usize) -> ScanResult {
        let suite = cipher::find(SECURE_SUITES[index].name).unwrap();
        let mut result = ScanResult::new(suite);
        result.set_state(
            Some(ConnectionState {
                version: TlsVersion::Tls12,
                cipher: suite,
                peer_certificates: Vec::new(),
            }),
            None,
        );
        result
    }

    #[test]
    fn passes_when_every_negotiated_cipher_is_allowed() {
        let validation = CipherSuiteValidation::new(&allowed()).unwrap();
        let scan = TargetScan::new(test_target());
        scan.add(result_with_cipher(0));
        scan.add(result_with_cipher(1));
        assert!(validation.validate(&scan).is_none());
    }

    #[test]
    fn fails_when_a_disallowed_cipher_was_negotiated() {
        let validation = CipherSuiteValidation::new(&allowed()).unwrap();
        let scan = TargetScan::new(test_target());
        scan.add(result_with_cipher(0));
        scan.add(result_with_cipher(SECURE_SUITES.len() - 1));
        let violation = validation.validate(&scan).expect("expected a violation");
        assert!(violation
            .to_string()
            .contains("not in the configured allowed list of ciphers"));

        let labels = violation.labels();
        assert_eq!(labels.get("type").unwrap(), "cipher_suite");
        assert_eq!(
            labels.get("detected_cipher").unwrap(),
            SECURE_SUITES[SECURE_SUITES.len() - 1].name
        );
        assert_eq!(labels.get("address").unwrap(), "172.1.2.34:8080");
    }

    #[test]
    fn failed_results_are_ignored() {
        let validation = CipherSuiteValidation::new(&allowed()).unwrap();
        let scan = TargetScan::new(test_target());
        let mut failed = ScanResult::new(cipher::find(SECURE_SUITES[4].name).unwrap());
        failed.set_state(
            None,
            Some(ScanError::Connection {
                message: "connection refused".to_string(),
            }),
        );
        scan.add(failed);
        assert!(validation.validate(&scan).is_none());
    }

    #[test]
    fn rejects_an_empty_allow_list() {
        let err = CipherSuiteValidation::new(&[]).unwrap_err();
        assert!(err.to_string().contains("no allowed ciphers configured"));
    }

    #[test]
    fn rejects_unknown_cipher_names() {
        let err = CipherSuiteValidation::new(&[
            SECURE_SUITES[0].name.to_string(),
            "INVALID_CIPHER".to_string(),
        ])
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("configured cipher INVALID_CIPHER not present"));
    }
}
