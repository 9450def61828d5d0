// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::Context;
use openssl::stack::Stack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::verify::X509VerifyParam;
use openssl::x509::{X509StoreContext, X509};
use tracing::{debug, info, warn};

use scan_model::{ScanError, TargetScan, Validation};

use crate::settings::{keys, Settings};

/// Verifies the chain presented by the first successful handshake against
/// a configured pool of CA certificates. Url targets additionally have
/// the leaf checked against their host name; IpPort targets do not.
pub struct TrustChainValidation {
    roots: Vec<X509>,
    use_system_roots: bool,
}

impl TrustChainValidation {
    pub fn new(roots: Vec<X509>, use_system_roots: bool) -> Self {
        TrustChainValidation {
            roots,
            use_system_roots,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let paths = settings.get_strings(keys::VALIDATIONS_TRUST_CHAIN_CA_PATHS);
        let mut roots = Vec::new();
        info!(num_paths = paths.len(), "loading ca certs");
        for path in &paths {
            let pem = std::fs::read(path)
                .with_context(|| format!("error reading ca cert from {path}"))?;
            let certs = X509::stack_from_pem(&pem)
                .with_context(|| format!("error decoding pem from {path}"))?;
            info!(path = %path, certs = certs.len(), "loaded ca cert");
            roots.extend(certs);
        }

        let mut use_system_roots =
            settings.get_bool(keys::VALIDATIONS_TRUST_CHAIN_SYSTEM_ROOTS, false);
        if roots.is_empty() && !use_system_roots {
            warn!("no cert paths configured, using default system CA pool");
            use_system_roots = true;
        }
        Ok(Self::new(roots, use_system_roots))
    }

    fn build_store(&self, dns_name: Option<&str>) -> anyhow::Result<X509Store> {
        let mut builder = X509StoreBuilder::new()?;
        for root in &self.roots {
            builder.add_cert(root.clone())?;
        }
        if self.use_system_roots {
            builder.set_default_paths()?;
        }
        if let Some(host) = dns_name {
            let mut param = X509VerifyParam::new()?;
            param.set_host(host)?;
            builder.set_param(&param)?;
        }
        Ok(builder.build())
    }
}

impl Validation for TrustChainValidation {
    fn validate(&self, scan: &TargetScan) -> Option<ScanError> {
        debug!(target = %scan.target().metadata.name, "validating trust of target");
        let result = scan.first_successful()?;
        let state = result.state()?.clone();
        let leaf = state.peer_certificates.first()?;

        let host = scan.target().address.validate_hostname().then(|| {
            scan.target().address.host()
        });
        let violation = |message: String| {
            Some(ScanError::TrustChain {
                message,
                subject_cn: leaf.common_name.clone(),
                issuer_cn: leaf.issuer_common_name.clone(),
                authority_key_id: leaf.authority_key_id.clone(),
                result: Arc::clone(&result),
            })
        };

        let store = match self.build_store(host.as_deref()) {
            Ok(store) => store,
            Err(err) => return violation(err.to_string()),
        };
        let mut intermediates = match Stack::new() {
            Ok(stack) => stack,
            Err(err) => return violation(err.to_string()),
        };
        for cert in &state.peer_certificates[1..] {
            if let Err(err) = intermediates.push(cert.x509().to_owned()) {
                return violation(err.to_string());
            }
        }

        let verified = X509StoreContext::new().and_then(|mut ctx| {
            ctx.init(&store, leaf.x509(), &intermediates, |ctx| {
                let ok = ctx.verify_cert()?;
                if ok {
                    Ok(None)
                } else {
                    Ok(Some(ctx.error().error_string().to_string()))
                }
            })
        });
        match verified {
            Ok(None) => None,
            Ok(Some(reason)) => violation(reason),
            Err(err) => violation(err.to_string()),
        }
    }
}
