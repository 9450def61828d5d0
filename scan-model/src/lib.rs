// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared data model for the cert scanner: addresses, targets, scan
//! results, scan errors, and the traits the pipeline stages are built
//! from. The scanner crate provides the engine; everything that needs to
//! be named by more than one stage lives here.

pub mod address;
pub mod cipher;
pub mod error;
pub mod scan;
pub mod state;
pub mod target;
pub mod version;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

pub use address::Address;
pub use cipher::{ordered_cipher_suites, CipherSuite};
pub use error::ScanError;
pub use scan::{CompletedScan, ScanResult, TargetScan};
pub use state::{ConnectionState, PeerCertificate};
pub use target::{Labels, Metadata, Target};
pub use version::TlsVersion;

/// Implemented by integrations that can enumerate TLS services. Targets
/// are emitted to the given channel as they are found; any error aborts
/// the current scan.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(
        &self,
        token: CancellationToken,
        targets: UnboundedSender<Target>,
    ) -> anyhow::Result<()>;
}

/// Turns one discovered target into a [`TargetScan`] by probing it, and
/// emits the scan downstream. Probe failures are data on the scan, never
/// errors.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        token: CancellationToken,
        target: Arc<Target>,
        results: UnboundedSender<Arc<TargetScan>>,
    );
}

/// A single policy check against a completed target scan. Returns the
/// violation if the scan fails the check, `None` if it passes. Must
/// tolerate scans with no successful result.
pub trait Validation: Send + Sync {
    fn validate(&self, scan: &TargetScan) -> Option<ScanError>;
}

/// Acts on a validated target scan. Typically reports violations, but the
/// whole scan is available so reporters can track any aspect of it.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, scan: &TargetScan);
}

/// Reconciles external state between two completed scans, canonically by
/// clearing metric series for addresses that disappeared.
pub trait ScanComparator: Send + Sync {
    fn compare(&self, previous: &dyn CompletedScan, current: &dyn CompletedScan);
}

pub type Discoveries = Vec<Arc<dyn Discovery>>;
pub type Processors = Vec<Arc<dyn Processor>>;
pub type Validations = Vec<Arc<dyn Validation>>;
pub type Reporters = Vec<Arc<dyn Reporter>>;
pub type ScanComparators = Vec<Arc<dyn ScanComparator>>;
