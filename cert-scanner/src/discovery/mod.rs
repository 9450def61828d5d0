// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod file;

use std::sync::Arc;

use scan_model::{Discoveries, Discovery};

use crate::registry::{configured, Factory};
use crate::settings::Settings;

/// Builds every discovery enabled in the `discovery` configuration group.
pub fn create_discoveries(settings: &Settings) -> anyhow::Result<Discoveries> {
    let factories: Vec<Factory<Arc<dyn Discovery>>> = vec![(
        "files",
        Box::new(|settings: &Settings| {
            let discovery = file::FileDiscovery::from_settings(settings)?;
            Ok(Some(Arc::new(discovery) as Arc<dyn Discovery>))
        }),
    )];
    configured(settings, "discovery", factories)
}
