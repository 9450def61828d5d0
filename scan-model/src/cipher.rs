// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;

use crate::version::TlsVersion;

/// A cipher suite the prober knows how to ask for. `name` is the IANA
/// registry name (what openssl reports as the standard name and what
/// allow-lists are written in), `openssl_name` is the string understood by
/// `set_cipher_list` / `set_ciphersuites`.
#[derive(Debug, PartialEq, Eq)]
pub struct CipherSuite {
    pub name: &'static str,
    pub openssl_name: &'static str,
    pub versions: &'static [TlsVersion],
    pub secure: bool,
}

const UP_TO_TLS12: &[TlsVersion] = &[TlsVersion::Tls10, TlsVersion::Tls11, TlsVersion::Tls12];
const ONLY_TLS12: &[TlsVersion] = &[TlsVersion::Tls12];
const ONLY_TLS13: &[TlsVersion] = &[TlsVersion::Tls13];

macro_rules! suite {
    ($name:literal, $openssl:literal, $versions:expr, $secure:expr) => {
        CipherSuite {
            name: $name,
            openssl_name: $openssl,
            versions: $versions,
            secure: $secure,
        }
    };
}

/// Suites a contemporary runtime considers acceptable.
pub const SECURE_SUITES: &[CipherSuite] = &[
    suite!("TLS_AES_128_GCM_SHA256", "TLS_AES_128_GCM_SHA256", ONLY_TLS13, true),
    suite!("TLS_AES_256_GCM_SHA384", "TLS_AES_256_GCM_SHA384", ONLY_TLS13, true),
    suite!("TLS_CHACHA20_POLY1305_SHA256", "TLS_CHACHA20_POLY1305_SHA256", ONLY_TLS13, true),
    suite!("TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA", "ECDHE-ECDSA-AES128-SHA", UP_TO_TLS12, true),
    suite!("TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA", "ECDHE-ECDSA-AES256-SHA", UP_TO_TLS12, true),
    suite!("TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", "ECDHE-ECDSA-AES128-GCM-SHA256", ONLY_TLS12, true),
    suite!("TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384", "ECDHE-ECDSA-AES256-GCM-SHA384", ONLY_TLS12, true),
    suite!("TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256", "ECDHE-ECDSA-CHACHA20-POLY1305", ONLY_TLS12, true),
    suite!("TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", "ECDHE-RSA-AES128-SHA", UP_TO_TLS12, true),
    suite!("TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA", "ECDHE-RSA-AES256-SHA", UP_TO_TLS12, true),
    suite!("TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", "ECDHE-RSA-AES128-GCM-SHA256", ONLY_TLS12, true),
    suite!("TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", "ECDHE-RSA-AES256-GCM-SHA384", ONLY_TLS12, true),
    suite!("TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", "ECDHE-RSA-CHACHA20-POLY1305", ONLY_TLS12, true),
    suite!("TLS_RSA_WITH_AES_128_GCM_SHA256", "AES128-GCM-SHA256", ONLY_TLS12, true),
    suite!("TLS_RSA_WITH_AES_256_GCM_SHA384", "AES256-GCM-SHA384", ONLY_TLS12, true),
    suite!("TLS_RSA_WITH_AES_128_CBC_SHA", "AES128-SHA", UP_TO_TLS12, true),
    suite!("TLS_RSA_WITH_AES_256_CBC_SHA", "AES256-SHA", UP_TO_TLS12, true),
];

/// Suites kept around purely so their acceptance by a server can be
/// observed and reported.
pub const INSECURE_SUITES: &[CipherSuite] = &[
    suite!("TLS_RSA_WITH_RC4_128_SHA", "RC4-SHA", UP_TO_TLS12, false),
    suite!("TLS_RSA_WITH_3DES_EDE_CBC_SHA", "DES-CBC3-SHA", UP_TO_TLS12, false),
    suite!("TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA", "ECDHE-RSA-DES-CBC3-SHA", UP_TO_TLS12, false),
    suite!("TLS_ECDHE_RSA_WITH_RC4_128_SHA", "ECDHE-RSA-RC4-SHA", UP_TO_TLS12, false),
    suite!("TLS_ECDHE_ECDSA_WITH_RC4_128_SHA", "ECDHE-ECDSA-RC4-SHA", UP_TO_TLS12, false),
    suite!("TLS_RSA_WITH_AES_128_CBC_SHA256", "AES128-SHA256", ONLY_TLS12, false),
    suite!("TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", "ECDHE-RSA-AES128-SHA256", ONLY_TLS12, false),
    suite!("TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256", "ECDHE-ECDSA-AES128-SHA256", ONLY_TLS12, false),
];

static ORDERED: Lazy<Vec<&'static CipherSuite>> = Lazy::new(|| {
    let mut ordered: Vec<&'static CipherSuite> =
        SECURE_SUITES.iter().chain(INSECURE_SUITES.iter()).collect();
    // weakest protocol first so that a server accepting an old suite is
    // recorded explicitly rather than masked by a stronger success
    ordered.sort_by_key(|suite| suite.versions[0]);
    ordered
});

/// The probe order for the full suite catalog, computed once per process
/// and immutable afterwards.
pub fn ordered_cipher_suites() -> &'static [&'static CipherSuite] {
    &ORDERED
}

/// Looks a suite up by its IANA name.
pub fn find(name: &str) -> Option<&'static CipherSuite> {
    ordered_cipher_suites()
        .iter()
        .copied()
        .find(|suite| suite.name == name)
}

/// The number of handshakes a complete probe of one target performs.
pub fn matrix_size() -> usize {
    ordered_cipher_suites()
        .iter()
        .map(|suite| suite.versions.len())
        .sum()
}
