// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod tls;

use std::sync::Arc;

use scan_model::{Processor, Processors};

use crate::registry::{configured, Factory};
use crate::settings::Settings;

/// Builds every processor enabled in the `processors` configuration
/// group. The TLS state prober is on by default.
pub fn create_processors(settings: &Settings) -> anyhow::Result<Processors> {
    let factories: Vec<Factory<Arc<dyn Processor>>> = vec![(
        "tls-state",
        Box::new(|_settings: &Settings| {
            Ok(Some(
                Arc::new(tls::TlsStateRetrieval::new()) as Arc<dyn Processor>
            ))
        }),
    )];
    configured(settings, "processors", factories)
}
