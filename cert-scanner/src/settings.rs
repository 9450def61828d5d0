// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use anyhow::Context;
use config::{Config, ConfigError, File, FileFormat};

/// Dotted configuration keys. Kept in one place both for discoverability
/// and because the environment override pass walks this list.
pub mod keys {
    pub const CANARY_PORT: &str = "canary.port";
    pub const METRICS_PORT: &str = "metrics.port";
    pub const METRICS_ENABLED: &str = "metrics.enabled";
    pub const BATCH_PROCESSORS: &str = "batch.processors";
    pub const DISCOVERY_FILE_PATHS: &str = "discovery.files.paths";
    pub const PROCESSORS_TLS_ENABLED: &str = "processors.tls-state.enabled";
    pub const VALIDATIONS_EXPIRY_WINDOW: &str = "validations.expiry.warning_window";
    pub const VALIDATIONS_TRUST_CHAIN_CA_PATHS: &str = "validations.trust_chain.ca_paths";
    pub const VALIDATIONS_TRUST_CHAIN_SYSTEM_ROOTS: &str = "validations.trust_chain.use_system_roots";
    pub const VALIDATIONS_NOT_YET_VALID_ENABLED: &str = "validations.not_yet_valid.enabled";
    pub const VALIDATIONS_TLS_MIN_VERSION: &str = "validations.tls_version.min_version";
    pub const VALIDATIONS_ALLOWED_CIPHERS: &str = "validations.cipher_suite.allowed_ciphers";
    pub const REPORTERS_LOGGING_ENABLED: &str = "reporters.logging.enabled";
    pub const REPORTERS_LOGGING_FILE: &str = "reporters.logging.file";
    pub const REPORTERS_METRICS_EXPIRY: &str = "reporters.metrics.expiry";
    pub const REPORTERS_SCAN_STATS_ONLY_SUCCESSFUL: &str = "reporters.scan_stats.only_successful";
    pub const SCAN_INTERVAL: &str = "scan.interval";
    pub const SCAN_TIMEOUT: &str = "scan.timeout";
    pub const SCAN_REPEATED: &str = "scan.repeated";
}

/// Keys eligible for `CERT_SCAN_*` environment overrides.
const KNOWN_KEYS: &[&str] = &[
    keys::CANARY_PORT,
    keys::METRICS_PORT,
    keys::METRICS_ENABLED,
    keys::BATCH_PROCESSORS,
    keys::DISCOVERY_FILE_PATHS,
    keys::PROCESSORS_TLS_ENABLED,
    keys::VALIDATIONS_EXPIRY_WINDOW,
    keys::VALIDATIONS_TRUST_CHAIN_CA_PATHS,
    keys::VALIDATIONS_TRUST_CHAIN_SYSTEM_ROOTS,
    keys::VALIDATIONS_NOT_YET_VALID_ENABLED,
    keys::VALIDATIONS_TLS_MIN_VERSION,
    keys::VALIDATIONS_ALLOWED_CIPHERS,
    keys::REPORTERS_LOGGING_ENABLED,
    keys::REPORTERS_LOGGING_FILE,
    keys::REPORTERS_METRICS_EXPIRY,
    keys::REPORTERS_SCAN_STATS_ONLY_SUCCESSFUL,
    keys::SCAN_INTERVAL,
    keys::SCAN_TIMEOUT,
    keys::SCAN_REPEATED,
];

const ENV_PREFIX: &str = "CERT_SCAN";

/// Loaded configuration. Values resolve file < defaults < environment;
/// the environment pass mirrors the `<PREFIX>_<KEY>` convention with `.`
/// replaced by `_`.
pub struct Settings {
    cfg: Config,
    debug: bool,
}

impl Settings {
    pub fn load(path: &str, debug: bool) -> anyhow::Result<Self> {
        Self::build(Some(path), None, debug)
    }

    /// Builds settings from inline YAML. Used by tests and anything else
    /// that has no config file on disk.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Self::build(None, Some(yaml), false)
    }

    fn build(path: Option<&str>, inline: Option<&str>, debug: bool) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default(keys::SCAN_INTERVAL, "15m")?
            .set_default(keys::SCAN_TIMEOUT, "15m")?
            .set_default(keys::SCAN_REPEATED, false)?
            .set_default(keys::PROCESSORS_TLS_ENABLED, true)?
            .set_default(keys::VALIDATIONS_EXPIRY_WINDOW, "168h")?
            .set_default(keys::VALIDATIONS_TRUST_CHAIN_CA_PATHS, Vec::<String>::new())?
            .set_default(keys::VALIDATIONS_TLS_MIN_VERSION, "1.2")?
            .set_default(keys::VALIDATIONS_NOT_YET_VALID_ENABLED, true)?
            .set_default(keys::REPORTERS_LOGGING_ENABLED, true)?
            .set_default(keys::METRICS_ENABLED, true)?
            .set_default(keys::METRICS_PORT, 9153)?
            .set_default(keys::CANARY_PORT, 8443)?;

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml));
        }
        if let Some(inline) = inline {
            builder = builder.add_source(File::from_str(inline, FileFormat::Yaml));
        }

        // viper-style environment overrides: CERT_SCAN_SCAN_TIMEOUT wins
        // over scan.timeout from the file. Walking the known keys avoids
        // mis-splitting key segments that themselves contain underscores.
        for key in KNOWN_KEYS {
            let var = format!("{}_{}", ENV_PREFIX, key.replace('.', "_").to_uppercase());
            if let Ok(value) = std::env::var(&var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let cfg = builder
            .build()
            .with_context(|| format!("error loading config file {}", path.unwrap_or("<inline>")))?;

        let settings = Settings { cfg, debug };
        // fail fast on malformed durations rather than mid-scan
        settings.interval()?;
        settings.timeout()?;
        Ok(settings)
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// True if the key exists anywhere in the configuration, including as
    /// a parent of deeper keys.
    pub fn is_set(&self, key: &str) -> bool {
        self.cfg.get::<config::Value>(key).is_ok()
    }

    /// The tri-state used by the enable gate: `None` when the key is
    /// absent, `Some` when set.
    pub fn bool_flag(&self, key: &str) -> Option<bool> {
        match self.cfg.get_bool(key) {
            Ok(value) => Some(value),
            Err(ConfigError::NotFound(_)) => None,
            Err(_) => None,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.bool_flag(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.cfg.get_string(key).ok().filter(|s| !s.is_empty())
    }

    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.cfg.get::<Vec<String>>(key).unwrap_or_default()
    }

    pub fn get_duration(&self, key: &str) -> anyhow::Result<Option<Duration>> {
        match self.get_string(key) {
            None => Ok(None),
            Some(raw) => {
                let parsed = humantime::parse_duration(&raw)
                    .with_context(|| format!("duration {key} of {raw} could not be parsed"))?;
                Ok(Some(parsed))
            }
        }
    }

    pub fn interval(&self) -> anyhow::Result<Duration> {
        Ok(self
            .get_duration(keys::SCAN_INTERVAL)?
            .unwrap_or(Duration::from_secs(15 * 60)))
    }

    pub fn timeout(&self) -> anyhow::Result<Duration> {
        Ok(self
            .get_duration(keys::SCAN_TIMEOUT)?
            .unwrap_or(Duration::from_secs(15 * 60)))
    }

    pub fn repeated(&self) -> bool {
        self.get_bool(keys::SCAN_REPEATED, false)
    }

    /// Parallelism width for the pipeline stages.
    pub fn batch_size(&self) -> usize {
        match self.cfg.get_int(keys::BATCH_PROCESSORS) {
            Ok(size) if size > 0 => size as usize,
            _ => {
                std::thread::available_parallelism()
                    .map(usize::from)
                    .unwrap_or(1)
                    + 1
            }
        }
    }

    pub fn metrics_enabled(&self) -> bool {
        self.get_bool(keys::METRICS_ENABLED, true)
    }

    pub fn metrics_port(&self) -> u16 {
        self.cfg.get_int(keys::METRICS_PORT).unwrap_or(9153) as u16
    }

    pub fn canary_port(&self) -> u16 {
        self.cfg.get_int(keys::CANARY_PORT).unwrap_or(8443) as u16
    }

    /// How long metric series produced by a scan stay meaningful;
    /// defaults to twice the scan interval.
    pub fn metrics_expiry(&self) -> Duration {
        self.get_duration(keys::REPORTERS_METRICS_EXPIRY)
            .ok()
            .flatten()
            .unwrap_or_else(|| self.interval().unwrap_or(Duration::from_secs(15 * 60)) * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.interval().unwrap(), Duration::from_secs(900));
        assert_eq!(settings.timeout().unwrap(), Duration::from_secs(900));
        assert!(!settings.repeated());
        assert!(settings.metrics_enabled());
        assert!(settings.get_bool(keys::PROCESSORS_TLS_ENABLED, false));
        assert_eq!(
            settings.get_string(keys::VALIDATIONS_TLS_MIN_VERSION).unwrap(),
            "1.2"
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = Settings::from_yaml(
            "scan:\n  interval: 1m\n  repeated: true\nbatch:\n  processors: 3\n",
        )
        .unwrap();
        assert_eq!(settings.interval().unwrap(), Duration::from_secs(60));
        assert!(settings.repeated());
        assert_eq!(settings.batch_size(), 3);
    }

    #[test]
    fn batch_size_defaults_to_cpus_plus_one() {
        let settings = Settings::from_yaml("{}").unwrap();
        let expected = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
            + 1;
        assert_eq!(settings.batch_size(), expected);
    }

    #[test]
    fn environment_overrides_file() {
        // canary.port is read by no other test, so the env mutation
        // cannot race a parallel test run
        std::env::set_var("CERT_SCAN_CANARY_PORT", "9999");
        let settings = Settings::from_yaml("canary:\n  port: 1111\n").unwrap();
        assert_eq!(settings.canary_port(), 9999);
        std::env::remove_var("CERT_SCAN_CANARY_PORT");
    }

    #[test]
    fn invalid_durations_fail_at_load() {
        assert!(Settings::from_yaml("scan:\n  interval: wat\n").is_err());
    }

    #[test]
    fn metrics_expiry_defaults_to_twice_interval() {
        let settings = Settings::from_yaml("scan:\n  interval: 10m\n").unwrap();
        assert_eq!(settings.metrics_expiry(), Duration::from_secs(1_200));

        let settings =
            Settings::from_yaml("reporters:\n  metrics:\n    expiry: 5m\n").unwrap();
        assert_eq!(settings.metrics_expiry(), Duration::from_secs(300));
    }

    #[test]
    fn presence_checks_see_parent_tables() {
        let settings = Settings::from_yaml("validations:\n  require_tls: {}\n").unwrap();
        assert!(settings.is_set("validations.require_tls"));
        assert!(!settings.is_set("validations.nonexistent"));
        assert_eq!(settings.bool_flag("validations.require_tls.enabled"), None);
    }
}
