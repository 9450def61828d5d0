// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod compare;
pub mod counters;
pub mod logging;
pub mod scan_stats;

use std::sync::Arc;

use scan_model::{Reporter, Reporters};

use crate::registry::{configured, Factory};
use crate::settings::Settings;

fn reporter_factories() -> Vec<Factory<Arc<dyn Reporter>>> {
    vec![
        (
            "logging",
            Box::new(|settings: &Settings| {
                let reporter = logging::LoggingReporter::from_settings(settings)?;
                Ok(Some(Arc::new(reporter) as Arc<dyn Reporter>))
            }),
        ),
        (
            "expiry",
            Box::new(|_| Ok(Some(counters::expiry_reporter()))),
        ),
        (
            "not_yet_valid",
            Box::new(|_| Ok(Some(counters::not_yet_valid_reporter()))),
        ),
        (
            "tls_version",
            Box::new(|_| Ok(Some(counters::tls_version_reporter()))),
        ),
        (
            "trust_chain",
            Box::new(|_| Ok(Some(counters::trust_chain_reporter()))),
        ),
        (
            "require_tls",
            Box::new(|_| Ok(Some(counters::require_tls_reporter()))),
        ),
        (
            "cipher_suite",
            Box::new(|_| Ok(Some(counters::cipher_suite_reporter()))),
        ),
        (
            "durations",
            Box::new(|_| Ok(Some(counters::durations_reporter()))),
        ),
        (
            "scan_stats",
            Box::new(|settings: &Settings| {
                let reporter = scan_stats::ScanStatsReporter::from_settings(settings);
                Ok(Some(Arc::new(reporter) as Arc<dyn Reporter>))
            }),
        ),
    ]
}

/// Builds every reporter enabled in the `reporters` group, plus the
/// metric reporters implied by enabled validations -- turning a
/// validation on means its violations get counted without further
/// configuration.
pub fn create_reporters(settings: &Settings) -> anyhow::Result<Reporters> {
    let mut reporters = configured(settings, "reporters", reporter_factories())?;
    let implied = configured(settings, "validations", reporter_factories())?;
    reporters.extend(implied);
    Ok(reporters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_validations_imply_metric_reporters() {
        // logging is on by default; validations.require_tls adds its
        // counter reporter through the validations group
        let settings = Settings::from_yaml("validations:\n  require_tls: {}\n").unwrap();
        let with_validation = create_reporters(&settings).unwrap().len();

        let settings = Settings::from_yaml("{}").unwrap();
        let without = create_reporters(&settings).unwrap().len();
        assert_eq!(with_validation, without + 1);
    }
}
