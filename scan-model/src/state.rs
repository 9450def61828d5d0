// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::x509::{X509, X509Ref};

use crate::cipher::CipherSuite;
use crate::version::TlsVersion;

/// What a successful handshake negotiated.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub version: TlsVersion,
    pub cipher: &'static CipherSuite,
    pub peer_certificates: Vec<PeerCertificate>,
}

/// A certificate presented by the peer, parsed once at capture time so
/// validations and reporters never touch the raw X509 for the common
/// fields.
#[derive(Clone)]
pub struct PeerCertificate {
    x509: X509,
    pub serial: String,
    pub common_name: String,
    pub issuer_common_name: String,
    pub authority_key_id: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl PeerCertificate {
    pub fn x509(&self) -> &X509Ref {
        &self.x509
    }
}

impl TryFrom<X509> for PeerCertificate {
    type Error = ErrorStack;

    fn try_from(x509: X509) -> Result<Self, Self::Error> {
        let serial = hex::encode(x509.serial_number().to_bn()?.to_vec());
        let common_name = first_common_name(x509.subject_name().entries_by_nid(Nid::COMMONNAME));
        let issuer_common_name =
            first_common_name(x509.issuer_name().entries_by_nid(Nid::COMMONNAME));
        let authority_key_id = x509
            .authority_key_id()
            .map(|id| hex::encode(id.as_slice()))
            .unwrap_or_default();
        let not_before = asn1_to_datetime(x509.not_before())?;
        let not_after = asn1_to_datetime(x509.not_after())?;
        Ok(PeerCertificate {
            x509,
            serial,
            common_name,
            issuer_common_name,
            authority_key_id,
            not_before,
            not_after,
        })
    }
}

impl fmt::Debug for PeerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCertificate")
            .field("serial", &self.serial)
            .field("common_name", &self.common_name)
            .field("issuer_common_name", &self.issuer_common_name)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish()
    }
}

fn first_common_name<'a>(
    mut entries: impl Iterator<Item = &'a openssl::x509::X509NameEntryRef>,
) -> String {
    entries
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn asn1_to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>, ErrorStack> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Ok(DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or_default())
}
