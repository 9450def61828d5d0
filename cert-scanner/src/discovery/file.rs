// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use anyhow::bail;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use scan_model::{Address, Discovery, Labels, Metadata, Target};

use crate::settings::{keys, Settings};

#[derive(Debug, Deserialize)]
struct HostsFile {
    #[serde(default)]
    groups: Vec<HostsGroup>,
}

#[derive(Debug, Deserialize)]
struct HostsGroup {
    source: String,
    #[serde(default)]
    #[allow(dead_code)]
    additional_labels: Vec<String>,
    #[serde(default)]
    hosts: Vec<TargetHostEntry>,
}

#[derive(Debug, Deserialize)]
struct TargetHostEntry {
    host: String,
}

/// Loads target hosts from YAML files on the local filesystem.
pub struct FileDiscovery {
    paths: Vec<String>,
}

impl FileDiscovery {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        info!("creating file discovery");
        let paths = settings.get_strings(keys::DISCOVERY_FILE_PATHS);
        if paths.is_empty() {
            bail!(
                "no host file paths configured in {}",
                keys::DISCOVERY_FILE_PATHS
            );
        }
        Ok(FileDiscovery { paths })
    }
}

#[async_trait]
impl Discovery for FileDiscovery {
    /// Walks each configured file and emits a target per parseable host
    /// entry. Unreadable files and unparseable entries are logged and
    /// skipped; they never fail the discovery.
    async fn discover(
        &self,
        token: CancellationToken,
        targets: UnboundedSender<Target>,
    ) -> anyhow::Result<()> {
        let mut emitted = 0;
        for path in &self.paths {
            if token.is_cancelled() {
                break;
            }
            let data = match tokio::fs::read(path).await {
                Ok(data) => data,
                Err(err) => {
                    error!(file = %path, error = %err, "error reading host file contents");
                    continue;
                }
            };
            let details: HostsFile = match serde_yaml::from_slice(&data) {
                Ok(details) => details,
                Err(err) => {
                    error!(file = %path, error = %err, "error unmarshalling host file contents");
                    continue;
                }
            };
            debug!(file = %path, groups = details.groups.len(), "loaded host entries from file");

            for group in &details.groups {
                for host in &group.hosts {
                    let address = match Address::parse(&host.host) {
                        Ok(address) => address,
                        Err(err) => {
                            error!(source = %path, host = %host.host, error = %err,
                                "error parsing host from file source");
                            continue;
                        }
                    };
                    emitted += 1;
                    let target = Target {
                        address,
                        metadata: Metadata {
                            name: host.host.clone(),
                            source: group.source.clone(),
                            source_type: "file".to_string(),
                            labels: Labels::from([("file".to_string(), path.clone())]),
                        },
                    };
                    if targets.send(target).is_err() {
                        return Ok(());
                    }
                }
            }
        }
        info!(files = self.paths.len(), targets = emitted, "finished file discovery");
        Ok(())
    }
}
