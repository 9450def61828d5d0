// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use scan_model::{
    CompletedScan, Discoveries, Processors, Reporters, Target, TargetScan, Validations,
};

use crate::batch;
use crate::discovery::create_discoveries;
use crate::probe::create_processors;
use crate::reporters::create_reporters;
use crate::settings::Settings;
use crate::validations::create_validations;

/// One scan through the four-stage pipeline. Discovery failures abort
/// the scan; everything after discovery turns failures into data on the
/// target scans.
pub struct Scan {
    parallel: usize,
    discoveries: Discoveries,
    processors: Processors,
    validations: Validations,
    reporters: Reporters,
    results: Arc<Mutex<Vec<Arc<TargetScan>>>>,
}

impl Scan {
    pub fn new(
        discoveries: Discoveries,
        processors: Processors,
        validations: Validations,
        reporters: Reporters,
        parallel: usize,
    ) -> Self {
        Scan {
            parallel: parallel.max(1),
            discoveries,
            processors,
            validations,
            reporters,
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn scan(&self, token: &CancellationToken) -> anyhow::Result<()> {
        let targets = self.discover(token).await?;
        self.process(token, targets).await;
        self.validate(token).await;
        self.report(token).await;
        Ok(())
    }

    /// Runs every discovery concurrently, draining emitted targets into a
    /// single list. Any discovery error aborts the scan; with no targets
    /// there is nothing else to do.
    async fn discover(&self, token: &CancellationToken) -> anyhow::Result<Vec<Arc<Target>>> {
        let (targets_tx, mut targets_rx) = unbounded_channel::<Target>();
        let collector = tokio::spawn(async move {
            let mut aggregated = Vec::new();
            while let Some(target) = targets_rx.recv().await {
                aggregated.push(Arc::new(target));
            }
            aggregated
        });

        let group = batch::process(
            token,
            self.discoveries.clone(),
            self.parallel,
            move |token, discovery| {
                let targets = targets_tx.clone();
                async move {
                    info!("discovering targets");
                    discovery.discover(token, targets).await
                }
            },
        );
        let outcome = group.wait().await;
        // every sender clone is gone once the workers are done, which
        // closes the channel and lets the collector finish
        let targets = collector.await.unwrap_or_default();
        outcome?;
        info!(targets = targets.len(), "discovery complete");
        Ok(targets)
    }

    /// Hands every target to every processor. A single aggregator task
    /// appends emitted scans under the results lock.
    async fn process(&self, token: &CancellationToken, targets: Vec<Arc<Target>>) {
        let (results_tx, mut results_rx) = unbounded_channel::<Arc<TargetScan>>();
        let results = Arc::clone(&self.results);
        let aggregator = tokio::spawn(async move {
            while let Some(scan) = results_rx.recv().await {
                results.lock().unwrap().push(scan);
            }
        });

        let processors = self.processors.clone();
        let group = batch::process(token, targets, self.parallel, move |token, target| {
            let processors = processors.clone();
            let results = results_tx.clone();
            async move {
                if token.is_cancelled() {
                    return Ok(());
                }
                for processor in processors.iter() {
                    processor
                        .process(token.clone(), Arc::clone(&target), results.clone())
                        .await;
                }
                Ok(())
            }
        });
        if let Err(err) = group.wait().await {
            error!(err = %err, "error processing targets");
        }
        let _ = aggregator.await;
        info!(
            results = self.results.lock().unwrap().len(),
            "processing complete"
        );
    }

    /// Applies every validation to every completed target scan. The
    /// validations guard themselves against scans with no successful
    /// result, so they run unconditionally.
    async fn validate(&self, token: &CancellationToken) {
        let validations = self.validations.clone();
        let group = batch::process(
            token,
            self.results(),
            self.parallel,
            move |_token, scan: Arc<TargetScan>| {
                let validations = validations.clone();
                async move {
                    debug!(target = %scan.target().metadata.name, "validating result");
                    for validation in validations.iter() {
                        scan.add_violation(validation.validate(&scan));
                    }
                    Ok(())
                }
            },
        );
        if let Err(err) = group.wait().await {
            error!(err = %err, "error validating results");
        }
    }

    /// Fans the full scan list out to every reporter. Reporters run in
    /// parallel with each other and walk the scans serially.
    async fn report(&self, token: &CancellationToken) {
        let scans = Arc::new(self.results());
        let width = self.reporters.len();
        let group = batch::process(
            token,
            self.reporters.clone(),
            width,
            move |_token, reporter| {
                let scans = Arc::clone(&scans);
                async move {
                    for scan in scans.iter() {
                        reporter.report(scan).await;
                    }
                    Ok(())
                }
            },
        );
        if let Err(err) = group.wait().await {
            error!(err = %err, "error reporting results");
        }
    }

    pub fn results(&self) -> Vec<Arc<TargetScan>> {
        self.results.lock().unwrap().clone()
    }
}

impl CompletedScan for Scan {
    fn results(&self) -> Vec<Arc<TargetScan>> {
        Scan::results(self)
    }
}

/// Assembles the configured components and runs one scan. Component
/// construction errors are configuration errors and surface to the
/// caller; scan errors are logged and the (possibly partial) scan is
/// still returned for comparison against the next one.
pub async fn perform_scan(token: &CancellationToken, settings: &Settings) -> anyhow::Result<Scan> {
    let discoveries =
        create_discoveries(settings).map_err(log_config_error("discovery mechanisms"))?;
    let processors = create_processors(settings).map_err(log_config_error("processors"))?;
    let validations = create_validations(settings).map_err(log_config_error("validations"))?;
    let reporters = create_reporters(settings).map_err(log_config_error("reporters"))?;

    let scan = Scan::new(
        discoveries,
        processors,
        validations,
        reporters,
        settings.batch_size(),
    );
    if let Err(err) = scan.scan(token).await {
        error!(err = %err, "error running scan");
    }
    Ok(scan)
}

fn log_config_error(what: &'static str) -> impl FnOnce(anyhow::Error) -> anyhow::Error {
    move |err| {
        error!(err = %err, "error configuring {what}");
        err
    }
}
