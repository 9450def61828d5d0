// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openssl::error::ErrorStack;
use openssl::ssl::{Ssl, SslConnector, SslMethod, SslRef, SslVerifyMode};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_openssl::SslStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scan_model::error::CONNECTION_ERROR;
use scan_model::{
    cipher, CipherSuite, ConnectionState, PeerCertificate, Processor, ScanError, ScanResult,
    Target, TargetScan, TlsVersion,
};

/// Dial and handshake share this budget for every attempt.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes a target with one constrained handshake per (cipher, version)
/// pair from the process-wide suite ordering, and aggregates every
/// outcome into a single [`TargetScan`].
pub struct TlsStateRetrieval {
    attempt_timeout: Duration,
}

impl TlsStateRetrieval {
    pub fn new() -> Self {
        TlsStateRetrieval {
            attempt_timeout: ATTEMPT_TIMEOUT,
        }
    }
}

impl Default for TlsStateRetrieval {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for TlsStateRetrieval {
    async fn process(
        &self,
        token: CancellationToken,
        target: Arc<Target>,
        results: UnboundedSender<Arc<TargetScan>>,
    ) {
        let scan = Arc::new(TargetScan::new(Arc::clone(&target)));
        let saw_connection_error = Arc::new(AtomicBool::new(false));

        let mut attempts = JoinSet::new();
        for &suite in cipher::ordered_cipher_suites() {
            for &version in suite.versions {
                let scan = Arc::clone(&scan);
                let target = Arc::clone(&target);
                let token = token.child_token();
                let flag = Arc::clone(&saw_connection_error);
                let timeout = self.attempt_timeout;
                attempts.spawn(async move {
                    let mut result = ScanResult::new(suite);
                    match attempt(&token, &target, suite, version, timeout).await {
                        Ok(state) => result.set_state(Some(state), None),
                        Err(err) => {
                            if err.kind() == CONNECTION_ERROR {
                                flag.store(true, Ordering::Relaxed);
                            }
                            result.set_state(None, Some(err));
                        }
                    }
                    scan.add(result);
                });
            }
        }

        // wait for the full matrix, but stop waiting the moment the scan
        // is cancelled; attempts still in flight are torn down with the
        // join set
        tokio::select! {
            _ = async { while attempts.join_next().await.is_some() {} } => {}
            _ = token.cancelled() => {}
        }
        drop(attempts);

        if saw_connection_error.load(Ordering::Relaxed) {
            warn!(address = %target.address, "error making connection to target");
        }
        let _ = results.send(scan);
    }
}

/// One constrained handshake. The error distinguishes failing to reach
/// the endpoint from the endpoint refusing this particular (cipher,
/// version) combination.
async fn attempt(
    token: &CancellationToken,
    target: &Target,
    suite: &'static CipherSuite,
    version: TlsVersion,
    budget: Duration,
) -> Result<ConnectionState, ScanError> {
    debug!(
        target = %target.metadata.name,
        address = %target.address,
        cipher = suite.name,
        version = %version,
        "connecting to target"
    );
    let deadline = Instant::now() + budget;

    let stream = tokio::select! {
        _ = token.cancelled() => {
            return Err(connection_error("scan cancelled before connect"))
        }
        dialed = tokio::time::timeout_at(deadline, target.address.connect()) => match dialed {
            Err(_) => return Err(connection_error("connection timed out")),
            Ok(Err(err)) => return Err(connection_error(&err.to_string())),
            Ok(Ok(stream)) => stream,
        },
    };

    let ssl = constrained_ssl(target, suite, version)
        .map_err(|err| handshake_error(suite, version, &err.to_string()))?;
    let mut tls = SslStream::new(ssl, stream)
        .map_err(|err| handshake_error(suite, version, &err.to_string()))?;

    tokio::select! {
        _ = token.cancelled() => {
            Err(handshake_error(suite, version, "scan cancelled during handshake"))
        }
        done = tokio::time::timeout_at(deadline, Pin::new(&mut tls).connect()) => match done {
            Err(_) => Err(handshake_error(suite, version, "handshake timed out")),
            Ok(Err(err)) => Err(handshake_error(suite, version, &err.to_string())),
            Ok(Ok(())) => Ok(capture_state(tls.ssl(), suite, version)),
        },
    }
}

fn connection_error(message: &str) -> ScanError {
    ScanError::Connection {
        message: message.to_string(),
    }
}

fn handshake_error(suite: &'static CipherSuite, version: TlsVersion, message: &str) -> ScanError {
    ScanError::Handshake {
        cipher: suite.name,
        version,
        message: message.to_string(),
    }
}

/// Builds an `Ssl` pinned to exactly one protocol version and one cipher
/// suite. Url targets get SNI plus the default chain and host checks;
/// IpPort targets get neither, so transport failures stay distinguishable
/// from policy failures.
fn constrained_ssl(
    target: &Target,
    suite: &'static CipherSuite,
    version: TlsVersion,
) -> Result<Ssl, ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    // level 0 is what lets the deliberately-weak suites and old protocol
    // versions through; the whole point is to offer them
    builder.set_security_level(0);
    builder.set_min_proto_version(Some(version.ssl_version()))?;
    builder.set_max_proto_version(Some(version.ssl_version()))?;
    if version == TlsVersion::Tls13 {
        builder.set_ciphersuites(suite.openssl_name)?;
    } else {
        builder.set_cipher_list(suite.openssl_name)?;
    }
    let connector = builder.build();

    let mut config = connector.configure()?;
    if target.address.validate_hostname() {
        config.into_ssl(&target.address.host())
    } else {
        config.set_verify(SslVerifyMode::NONE);
        config.set_use_server_name_indication(false);
        config.set_verify_hostname(false);
        config.into_ssl("")
    }
}

fn capture_state(
    ssl: &SslRef,
    suite: &'static CipherSuite,
    version: TlsVersion,
) -> ConnectionState {
    let negotiated_version = ssl
        .version2()
        .and_then(TlsVersion::from_ssl_version)
        .unwrap_or(version);
    let negotiated_cipher = ssl
        .current_cipher()
        .and_then(|c| c.standard_name())
        .and_then(cipher::find)
        .unwrap_or(suite);

    let mut peer_certificates = Vec::new();
    if let Some(chain) = ssl.peer_cert_chain() {
        for cert in chain {
            match PeerCertificate::try_from(cert.to_owned()) {
                Ok(parsed) => peer_certificates.push(parsed),
                Err(err) => debug!(error = %err, "skipping unparseable peer certificate"),
            }
        }
    }
    if peer_certificates.is_empty() {
        if let Some(leaf) = ssl.peer_certificate() {
            if let Ok(parsed) = PeerCertificate::try_from(leaf) {
                peer_certificates.push(parsed);
            }
        }
    }

    ConnectionState {
        version: negotiated_version,
        cipher: negotiated_cipher,
        peer_certificates,
    }
}
