// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use scan_model::{ScanError, TargetScan, Validation};

use crate::settings::{keys, Settings};

pub const DEFAULT_WARNING_WINDOW: Duration = Duration::from_secs(168 * 3_600);

/// Flags certificates that will expire within the configured warning
/// window.
pub struct ExpiryValidation {
    warning_window: Duration,
}

impl ExpiryValidation {
    pub fn new(warning_window: Duration) -> Self {
        ExpiryValidation { warning_window }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let warning_window = settings
            .get_duration(keys::VALIDATIONS_EXPIRY_WINDOW)?
            .unwrap_or(DEFAULT_WARNING_WINDOW);
        Ok(Self::new(warning_window))
    }
}

impl Validation for ExpiryValidation {
    /// Examines every certificate in the first successful result's chain
    /// and fails if any of them expires inside the warning window.
    fn validate(&self, scan: &TargetScan) -> Option<ScanError> {
        debug!(
            target = %scan.target().metadata.name,
            warning_window = ?self.warning_window,
            "validating cert of target will not expire soon"
        );
        let result = scan.first_successful()?;
        let state = result.state()?.clone();
        let warning = chrono::Duration::from_std(self.warning_window).ok()?;
        let now = Utc::now();
        for cert in &state.peer_certificates {
            if cert.not_after - now < warning {
                return Some(ScanError::Expiry {
                    warning_duration: self.warning_window,
                    not_after: cert.not_after,
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
    use crate::validations::testutil::scan_with_validity;
    use scan_model::TargetScan;
    use time::ext::NumericalDuration;
    use time::OffsetDateTime;

    fn day() -> time::Duration {
        1.days()
    }

    #[test]
    fn passes_when_expiry_is_outside_the_window() {
        let scan = scan_with_validity(
            OffsetDateTime::now_utc() - day(),
            OffsetDateTime::now_utc() + day() * 8,
        );
        let validation = ExpiryValidation::new(Duration::from_secs(7 * 24 * 3_600));
        assert!(validation.validate(&scan).is_none());
    }

    #[test]
    fn fails_when_cert_expires_within_the_window() {
        let scan = scan_with_validity(
            OffsetDateTime::now_utc() - day(),
            OffsetDateTime::now_utc() + day() * 6,
        );
        let validation = ExpiryValidation::new(DEFAULT_WARNING_WINDOW);
        let violation = validation.validate(&scan).expect("expected a violation");
        assert!(violation
            .to_string()
            .contains("cert will expire in less than 168h0m0s on "));

        let labels = violation.labels();
        assert_eq!(labels.get("type").unwrap(), "expiry");
        assert_eq!(labels.get("warning_duration").unwrap(), "168h0m0s");
        assert_eq!(labels.get("address").unwrap(), "172.1.2.34:8080");
        assert_eq!(labels.get("common_name").unwrap(), "somehost");
        assert_eq!(labels.get("foo").unwrap(), "bar");
        assert!(labels.contains_key("not_after"));
        assert!(labels.contains_key("not_after_date"));
    }

    #[test]
    fn not_after_label_is_unix_millis() {
        let not_after = OffsetDateTime::now_utc() + day() * 3;
        let scan = scan_with_validity(OffsetDateTime::now_utc() - day(), not_after);
        let validation = ExpiryValidation::new(DEFAULT_WARNING_WINDOW);
        let violation = validation.validate(&scan).unwrap();
        let millis: i64 = violation
            .labels()
            .get("not_after")
            .unwrap()
            .parse()
            .unwrap();
        // X509 validity has second precision
        assert_eq!(millis / 1_000, not_after.unix_timestamp());
    }

    #[test]
    fn tolerates_scans_with_no_successful_result() {
        let scan = TargetScan::new(crate::validations::testutil::test_target());
        let validation = ExpiryValidation::new(DEFAULT_WARNING_WINDOW);
        assert!(validation.validate(&scan).is_none());
    }
}
