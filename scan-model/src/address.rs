// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpStream;
use url::Url;

/// An endpoint a target can be probed at. `IpPort` targets are dialed
/// directly and skip hostname verification during the handshake (that is
/// the trust-chain validation's job); `Url` targets send SNI and verify
/// the certificate against the host name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    IpPort(SocketAddr),
    Url(Url),
}

#[derive(Debug, Error)]
#[error("could not parse address:port or url from {0}")]
pub struct InvalidAddress(String);

impl Address {
    /// Parses either a URL (anything with a host component) or a bare
    /// `ip:port` pair.
    pub fn parse(raw: &str) -> Result<Address, InvalidAddress> {
        if let Ok(url) = Url::parse(raw) {
            if url.host_str().is_some() {
                return Ok(Address::Url(url));
            }
        }
        raw.parse::<SocketAddr>()
            .map(Address::IpPort)
            .map_err(|_| InvalidAddress(raw.to_string()))
    }

    /// Whether the TLS handshake should verify the peer certificate
    /// against the host name.
    pub fn validate_hostname(&self) -> bool {
        matches!(self, Address::Url(_))
    }

    /// The name to present as SNI and to verify certificates against.
    pub fn host(&self) -> String {
        match self {
            Address::IpPort(addr) => addr.ip().to_string(),
            Address::Url(url) => url.host_str().unwrap_or_default().to_string(),
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Address::IpPort(addr) => addr.port(),
            Address::Url(url) => url.port_or_known_default().unwrap_or(443),
        }
    }

    /// Opens the TCP connection a handshake attempt will run over.
    pub async fn connect(&self) -> std::io::Result<TcpStream> {
        match self {
            Address::IpPort(addr) => TcpStream::connect(addr).await,
            Address::Url(url) => {
                let host = url.host_str().unwrap_or_default();
                TcpStream::connect((host, self.port())).await
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::IpPort(addr) => addr.fmt(f),
            Address::Url(url) => f.write_str(url.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ip_port_pairs() {
        let address = Address::parse("172.1.2.34:8080").unwrap();
        assert!(matches!(address, Address::IpPort(_)));
        assert!(!address.validate_hostname());
        assert_eq!(address.host(), "172.1.2.34");
        assert_eq!(address.port(), 8080);
        assert_eq!(address.to_string(), "172.1.2.34:8080");
    }

    #[test]
    fn parses_urls() {
        let address = Address::parse("https://internal.example.com:8443/healthz").unwrap();
        assert!(address.validate_hostname());
        assert_eq!(address.host(), "internal.example.com");
        assert_eq!(address.port(), 8443);
    }

    #[test]
    fn url_port_defaults_from_scheme() {
        let address = Address::parse("https://internal.example.com").unwrap();
        assert_eq!(address.port(), 443);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Address::parse("not an address").is_err());
        assert!(Address::parse("300.300.300.300:99999").is_err());
    }
}
