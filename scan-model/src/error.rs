// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::scan::ScanResult;
use crate::target::Labels;
use crate::version::TlsVersion;

pub const CONNECTION_ERROR: &str = "connection-error";
pub const HANDSHAKE_ERROR: &str = "tls-handshake";

/// Every way a scan can fail, transport and policy alike. The `type` label
/// carries a stable kind tag that reporters filter on; violation variants
/// hold the result whose labels they decorate.
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("error connecting to target: {message}")]
    Connection { message: String },

    #[error("tls handshake failed for {cipher} over {version}: {message}")]
    Handshake {
        cipher: &'static str,
        version: TlsVersion,
        message: String,
    },

    #[error("cert will expire in less than {} on {}", human(.warning_duration), .not_after.to_rfc2822())]
    Expiry {
        warning_duration: Duration,
        not_after: DateTime<Utc>,
        result: Arc<ScanResult>,
    },

    #[error("cert will not be valid for {}, until {}", human(.until_valid), .not_before.to_rfc2822())]
    NotYetValid {
        until_valid: Duration,
        not_before: DateTime<Utc>,
        result: Arc<ScanResult>,
    },

    #[error("connection supports an invalid tls version {detected}, min version is {minimum}")]
    TlsVersion {
        detected: TlsVersion,
        minimum: TlsVersion,
        result: Arc<ScanResult>,
    },

    #[error("trust chain validation failed: {message}")]
    TrustChain {
        message: String,
        subject_cn: String,
        issuer_cn: String,
        authority_key_id: String,
        result: Arc<ScanResult>,
    },

    #[error("target is not configured with TLS")]
    RequireTls { result: Option<Arc<ScanResult>> },

    #[error("negotiated cipher {detected_cipher} that was not in the configured allowed list of ciphers")]
    CipherSuite {
        detected_cipher: &'static str,
        result: Arc<ScanResult>,
    },
}

impl ScanError {
    /// The stable kind tag used as the `type` label.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Connection { .. } => CONNECTION_ERROR,
            ScanError::Handshake { .. } => HANDSHAKE_ERROR,
            ScanError::Expiry { .. } => "expiry",
            ScanError::NotYetValid { .. } => "not_yet_valid",
            ScanError::TlsVersion { .. } => "tls_version",
            ScanError::TrustChain { .. } => "trust_chain",
            ScanError::RequireTls { .. } => "require_tls",
            ScanError::CipherSuite { .. } => "cipher_suite",
        }
    }

    /// The result this error was raised for, if any.
    pub fn result(&self) -> Option<&Arc<ScanResult>> {
        match self {
            ScanError::Connection { .. } | ScanError::Handshake { .. } => None,
            ScanError::Expiry { result, .. }
            | ScanError::NotYetValid { result, .. }
            | ScanError::TlsVersion { result, .. }
            | ScanError::TrustChain { result, .. }
            | ScanError::CipherSuite { result, .. } => Some(result),
            ScanError::RequireTls { result } => result.as_ref(),
        }
    }

    /// Labels for reporting. Violation variants merge the labels of the
    /// result they decorate; all variants carry `type`.
    pub fn labels(&self) -> Labels {
        let mut labels = self
            .result()
            .map(|result| result.labels())
            .unwrap_or_default();
        labels.insert("type".to_string(), self.kind().to_string());
        match self {
            ScanError::Connection { .. } | ScanError::RequireTls { .. } => {}
            ScanError::Handshake {
                cipher, version, ..
            } => {
                labels.insert("cipher".to_string(), cipher.to_string());
                labels.insert("version".to_string(), version.to_string());
            }
            ScanError::Expiry {
                warning_duration,
                not_after,
                ..
            } => {
                labels.insert(
                    "warning_duration".to_string(),
                    go_duration(*warning_duration),
                );
                labels.insert(
                    "not_after".to_string(),
                    not_after.timestamp_millis().to_string(),
                );
                labels.insert(
                    "not_after_date".to_string(),
                    not_after.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            ScanError::NotYetValid {
                until_valid,
                not_before,
                ..
            } => {
                labels.insert("until_valid".to_string(), go_duration(*until_valid));
                labels.insert(
                    "not_before".to_string(),
                    not_before.timestamp_millis().to_string(),
                );
                labels.insert(
                    "not_before_date".to_string(),
                    not_before.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            ScanError::TlsVersion {
                detected, minimum, ..
            } => {
                labels.insert("detected_version".to_string(), detected.to_string());
                labels.insert("min_version".to_string(), minimum.to_string());
            }
            ScanError::TrustChain {
                subject_cn,
                issuer_cn,
                authority_key_id,
                ..
            } => {
                labels.insert("subject_cn".to_string(), subject_cn.clone());
                labels.insert("issuer_cn".to_string(), issuer_cn.clone());
                labels.insert("authority_key_id".to_string(), authority_key_id.clone());
            }
            ScanError::CipherSuite {
                detected_cipher, ..
            } => {
                labels.insert("detected_cipher".to_string(), detected_cipher.to_string());
            }
        }
        labels
    }
}

fn human(d: &Duration) -> String {
    go_duration(*d)
}

/// Renders a duration the way violation consumers expect: `168h0m0s`,
/// `6m30s`, `45s`.
pub fn go_duration(d: Duration) -> String {
    let total = d.as_secs();
    let nanos = d.subsec_nanos();
    if total == 0 && nanos == 0 {
        return "0s".to_string();
    }
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h{minutes}m"));
    } else if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if nanos == 0 {
        out.push_str(&format!("{seconds}s"));
    } else {
        let frac = format!("{nanos:09}");
        out.push_str(&format!("{seconds}.{}s", frac.trim_end_matches('0')));
    }
    out
}
