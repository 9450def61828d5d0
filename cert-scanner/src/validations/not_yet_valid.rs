// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use scan_model::{ScanError, TargetScan, Validation};

/// Flags certificates whose validity window has not started yet.
pub struct NotYetValidValidation;

impl NotYetValidValidation {
    pub fn new() -> Self {
        NotYetValidValidation
    }
}

impl Default for NotYetValidValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl Validation for NotYetValidValidation {
    fn validate(&self, scan: &TargetScan) -> Option<ScanError> {
        let result = scan.first_successful()?;
        let state = result.state()?.clone();
        let now = Utc::now();
        for cert in &state.peer_certificates {
            if cert.not_before > now {
                let until_valid = (cert.not_before - now).to_std().unwrap_or(Duration::ZERO);
                return Some(ScanError::NotYetValid {
                    until_valid,
                    not_before: cert.not_before,
                    result: Arc::clone(&result),
                });
            }
        }
        None
    }
}
