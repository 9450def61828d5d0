// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod cipher_suite;
pub mod expiry;
pub mod not_yet_valid;
pub mod require_tls;
pub mod tls_version;
pub mod trust_chain;

use std::sync::Arc;

use scan_model::{Validation, Validations};

use crate::registry::{configured, Factory};
use crate::settings::Settings;

/// Builds every validation enabled in the `validations` configuration
/// group.
pub fn create_validations(settings: &Settings) -> anyhow::Result<Validations> {
    let factories: Vec<Factory<Arc<dyn Validation>>> = vec![
        (
            "expiry",
            Box::new(|settings: &Settings| {
                let validation = expiry::ExpiryValidation::from_settings(settings)?;
                Ok(Some(Arc::new(validation) as Arc<dyn Validation>))
            }),
        ),
        (
            "not_yet_valid",
            Box::new(|_settings: &Settings| {
                Ok(Some(Arc::new(not_yet_valid::NotYetValidValidation::new())
                    as Arc<dyn Validation>))
            }),
        ),
        (
            "tls_version",
            Box::new(|settings: &Settings| {
                let validation = tls_version::TlsVersionValidation::from_settings(settings)?;
                Ok(Some(Arc::new(validation) as Arc<dyn Validation>))
            }),
        ),
        (
            "trust_chain",
            Box::new(|settings: &Settings| {
                let validation = trust_chain::TrustChainValidation::from_settings(settings)?;
                Ok(Some(Arc::new(validation) as Arc<dyn Validation>))
            }),
        ),
        (
            "require_tls",
            Box::new(|_settings: &Settings| {
                Ok(Some(Arc::new(require_tls::RequireTlsValidation::new())
                    as Arc<dyn Validation>))
            }),
        ),
        (
            "cipher_suite",
            Box::new(|settings: &Settings| {
                let validation = cipher_suite::CipherSuiteValidation::from_settings(settings)?;
                Ok(Some(Arc::new(validation) as Arc<dyn Validation>))
            }),
        ),
    ];
    configured(settings, "validations", factories)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use scan_model::{
        cipher, Address, ConnectionState, Labels, Metadata, PeerCertificate, ScanResult, Target,
        TargetScan, TlsVersion,
    };

    use crate::pki;

    pub fn test_target() -> Arc<Target> {
        Arc::new(Target {
            address: Address::parse("172.1.2.34:8080").unwrap(),
            metadata: Metadata {
                name: "somehost".to_string(),
                source: "SomePod-acdf-bdfe".to_string(),
                source_type: "kubernetes".to_string(),
                labels: Labels::from([("foo".to_string(), "bar".to_string())]),
            },
        })
    }

    pub fn state_from_chain(
        chain: &[openssl::x509::X509],
        version: TlsVersion,
    ) -> ConnectionState {
        let peer_certificates = chain
            .iter()
            .map(|cert| PeerCertificate::try_from(cert.clone()).unwrap())
            .collect();
        ConnectionState {
            version,
            cipher: cipher::ordered_cipher_suites()[0],
            peer_certificates,
        }
    }

    /// A scan holding one successful result that presented the given
    /// chain.
    pub fn scan_with_chain(chain: &[openssl::x509::X509], version: TlsVersion) -> TargetScan {
        let scan = TargetScan::new(test_target());
        let mut result = ScanResult::new(cipher::ordered_cipher_suites()[0]);
        result.set_state(Some(state_from_chain(chain, version)), None);
        scan.add(result);
        scan
    }

    /// A scan whose leaf certificate has the given validity window.
    pub fn scan_with_validity(
        not_before: time::OffsetDateTime,
        not_after: time::OffsetDateTime,
    ) -> TargetScan {
        let ca = pki::Ca::new("validation test ca").unwrap();
        let leaf = ca
            .issue(pki::LeafParams {
                common_name: "somehost".to_string(),
                sans: vec!["localhost".to_string()],
                not_before,
                not_after,
            })
            .unwrap();
        scan_with_chain(
            &[leaf.x509.clone(), ca.x509().clone()],
            TlsVersion::Tls12,
        )
    }
}
