// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use time::ext::NumericalDuration;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use scan_model::TlsVersion;

use crate::pki;

/// Runs a deliberately unhealthy TLS endpoint: a certificate that is
/// already at its expiry and a protocol ceiling of TLS 1.1. Point the
/// scanner at it to verify end to end that every validation fires.
pub async fn run(port: u16, token: CancellationToken) -> anyhow::Result<()> {
    let ca = pki::Ca::new("cert-scanner canary ca")?;
    let leaf = ca.issue(pki::LeafParams {
        common_name: "some-server".to_string(),
        sans: vec!["localhost".to_string()],
        not_before: OffsetDateTime::now_utc() - 1.hours(),
        not_after: OffsetDateTime::now_utc(),
    })?;

    let acceptor = pki::acceptor(
        &leaf.cert_pem,
        &leaf.key_pem,
        Some(&ca.cert_pem()),
        TlsVersion::Tls10,
        TlsVersion::Tls11,
    )?;

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "running canary");
    pki::serve_tls(listener, acceptor, token).await;
    Ok(())
}
