// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Throwaway certificate authorities and TLS acceptors. The canary
//! server mints its deliberately-bad certificate here, and the test
//! suites use the same helpers to stand up fixture endpoints.

use std::pin::Pin;

use openssl::pkey::PKey;
use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
use openssl::x509::X509;
use rand::Rng;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, SerialNumber};
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_openssl::SslStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use scan_model::TlsVersion;

/// A freshly minted certificate authority that can issue leaves.
pub struct Ca {
    cert: Certificate,
    key: KeyPair,
    x509: X509,
}

/// Validity window and naming for an issued leaf certificate.
pub struct LeafParams {
    pub common_name: String,
    pub sans: Vec<String>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub x509: X509,
}

impl Ca {
    pub fn new(common_name: &str) -> anyhow::Result<Self> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(Vec::new())?;
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.serial_number = Some(random_serial());
        let cert = params.self_signed(&key)?;
        let x509 = X509::from_pem(cert.pem().as_bytes())?;
        Ok(Ca { cert, key, x509 })
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn issue(&self, leaf: LeafParams) -> anyhow::Result<IssuedCert> {
        let key = KeyPair::generate()?;
        let mut params = CertificateParams::new(leaf.sans)?;
        params
            .distinguished_name
            .push(DnType::CommonName, leaf.common_name);
        params.not_before = leaf.not_before;
        params.not_after = leaf.not_after;
        params.serial_number = Some(random_serial());
        let cert = params.signed_by(&key, &self.cert, &self.key)?;
        let cert_pem = cert.pem();
        let x509 = X509::from_pem(cert_pem.as_bytes())?;
        Ok(IssuedCert {
            cert_pem,
            key_pem: key.serialize_pem(),
            x509,
        })
    }
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    SerialNumber::from(bytes.to_vec())
}

/// An acceptor for the given identity, clamped to a protocol window.
/// Security level 0 so even the deliberately-weak configurations the
/// scanner wants to observe are servable.
pub fn acceptor(
    cert_pem: &str,
    key_pem: &str,
    chain_pem: Option<&str>,
    min_version: TlsVersion,
    max_version: TlsVersion,
) -> anyhow::Result<SslAcceptor> {
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;
    builder.set_security_level(0);
    builder.set_cipher_list("DEFAULT:@SECLEVEL=0")?;
    builder.set_min_proto_version(Some(min_version.ssl_version()))?;
    builder.set_max_proto_version(Some(max_version.ssl_version()))?;

    let key = PKey::private_key_from_pem(key_pem.as_bytes())?;
    builder.set_private_key(&key)?;
    let cert = X509::from_pem(cert_pem.as_bytes())?;
    builder.set_certificate(&cert)?;
    if let Some(chain) = chain_pem {
        for extra in X509::stack_from_pem(chain.as_bytes())? {
            builder.add_extra_chain_cert(extra)?;
        }
    }
    builder.check_private_key()?;
    Ok(builder.build())
}

/// Accepts TLS connections until the token fires, answering anything the
/// peer sends with a small HTTP 200. Handshake failures are expected
/// here: a prober deliberately offering a suite the acceptor rejects is
/// the normal case, not an error.
pub async fn serve_tls(listener: TcpListener, acceptor: SslAcceptor, token: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                debug!(error = %err, "accept failed");
                continue;
            }
        };
        debug!(peer = %peer, "connection accepted");
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let ssl = match Ssl::new(acceptor.context()) {
                Ok(ssl) => ssl,
                Err(_) => return,
            };
            let mut tls = match SslStream::new(ssl, stream) {
                Ok(tls) => tls,
                Err(_) => return,
            };
            if Pin::new(&mut tls).accept().await.is_err() {
                return;
            }
            let mut buf = [0u8; 1024];
            let _ = tls.read(&mut buf).await;
            let _ = tls
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nOK")
                .await;
            let _ = tls.shutdown().await;
        });
    }
}
