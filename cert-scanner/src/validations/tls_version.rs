// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::debug;

use scan_model::{ScanError, TargetScan, TlsVersion, Validation};

use crate::settings::{keys, Settings};

/// Flags targets whose canonical successful handshake negotiated a
/// protocol version below the configured minimum.
pub struct TlsVersionValidation {
    minimum: TlsVersion,
}

impl TlsVersionValidation {
    pub fn new(minimum: TlsVersion) -> Self {
        TlsVersionValidation { minimum }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let raw = settings
            .get_string(keys::VALIDATIONS_TLS_MIN_VERSION)
            .unwrap_or_else(|| "1.2".to_string());
        let minimum = raw.parse::<TlsVersion>()?;
        Ok(Self::new(minimum))
    }
}

impl Validation for TlsVersionValidation {
    fn validate(&self, scan: &TargetScan) -> Option<ScanError> {
        debug!(target = %scan.target().metadata.name, "validating tls version of target");
        let result = scan.first_successful()?;
        let state = result.state()?;
        if state.version < self.minimum {
            return Some(ScanError::TlsVersion {
                detected: state.version,
                minimum: self.minimum,
                result: Arc::clone(&result),
            });
        }
        None
    }
}
