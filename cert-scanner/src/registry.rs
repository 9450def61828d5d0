// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use crate::settings::Settings;

/// A named constructor within a factory group. Returning `Ok(None)` means
/// the factory chose not to produce a component; errors abort assembly.
pub type Factory<T> = (
    &'static str,
    Box<dyn Fn(&Settings) -> anyhow::Result<Option<T>>>,
);

/// Whether `<group>.<name>` is switched on: an explicit
/// `<group>.<name>.enabled: true`, or any `<group>.<name>.*` key present
/// without an explicit `enabled: false`.
pub fn is_enabled(settings: &Settings, group: &str, name: &str) -> bool {
    let key = format!("{group}.{name}");
    let flag = settings.bool_flag(&format!("{key}.enabled"));
    flag == Some(true) || (settings.is_set(&key) && flag != Some(false))
}

/// Instantiates every enabled factory in the group, in the given order.
pub fn configured<T>(
    settings: &Settings,
    group: &str,
    factories: Vec<Factory<T>>,
) -> anyhow::Result<Vec<T>> {
    let mut created = Vec::new();
    for (name, factory) in factories {
        if !is_enabled(settings, group, name) {
            debug!(group, factory = name, "factory not enabled");
            continue;
        }
        if let Some(component) = factory(settings)? {
            created.push(component);
        }
        debug!(group, factory = name, "created type via factory");
    }
    debug!(group, count = created.len(), "created all instances of type");
    Ok(created)
}
