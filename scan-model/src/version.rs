// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use openssl::ssl::SslVersion;
use thiserror::Error;

/// A TLS protocol version. Ordered oldest to newest so that validations can
/// compare a negotiated version against a configured minimum.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0} is not a valid tls version string use one of 1.0, 1.1, 1.2, 1.3")]
pub struct InvalidTlsVersion(String);

impl TlsVersion {
    pub const ALL: [TlsVersion; 4] = [
        TlsVersion::Tls10,
        TlsVersion::Tls11,
        TlsVersion::Tls12,
        TlsVersion::Tls13,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls10 => "1.0",
            TlsVersion::Tls11 => "1.1",
            TlsVersion::Tls12 => "1.2",
            TlsVersion::Tls13 => "1.3",
        }
    }

    pub fn ssl_version(&self) -> SslVersion {
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }

    pub fn from_ssl_version(version: SslVersion) -> Option<TlsVersion> {
        match version {
            SslVersion::TLS1 => Some(TlsVersion::Tls10),
            SslVersion::TLS1_1 => Some(TlsVersion::Tls11),
            SslVersion::TLS1_2 => Some(TlsVersion::Tls12),
            SslVersion::TLS1_3 => Some(TlsVersion::Tls13),
            _ => None,
        }
    }
}

impl FromStr for TlsVersion {
    type Err = InvalidTlsVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(TlsVersion::Tls10),
            "1.1" => Ok(TlsVersion::Tls11),
            "1.2" => Ok(TlsVersion::Tls12),
            "1.3" => Ok(TlsVersion::Tls13),
            other => Err(InvalidTlsVersion(other.to_string())),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
