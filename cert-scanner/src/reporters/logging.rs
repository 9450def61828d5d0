// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::error;

use scan_model::{Reporter, TargetScan};

use crate::digest::digest;
use crate::settings::{keys, Settings};

/// Writes one JSON line per violation, carrying the violation's full
/// label set. Identical label sets are only written once per process,
/// which keeps re-reported scans from duplicating output.
pub struct LoggingReporter {
    sink: Mutex<Box<dyn Write + Send>>,
    seen: Mutex<HashSet<String>>,
}

impl LoggingReporter {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        match settings.get_string(keys::REPORTERS_LOGGING_FILE) {
            None => Ok(Self::new(Box::new(std::io::stdout()))),
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("error opening logfile {path}"))?;
                Ok(Self::new(Box::new(file)))
            }
        }
    }

    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        LoggingReporter {
            sink: Mutex::new(sink),
            seen: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl Reporter for LoggingReporter {
    async fn report(&self, scan: &TargetScan) {
        for violation in scan.violations() {
            let labels = violation.labels();
            if !self.seen.lock().unwrap().insert(digest(&labels)) {
                continue;
            }
            let mut line = Map::new();
            line.insert(
                "time".to_string(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
            line.insert("msg".to_string(), Value::String("violation".to_string()));
            line.insert(
                "violation".to_string(),
                Value::String(violation.to_string()),
            );
            for (k, v) in labels {
                line.insert(k, Value::String(v));
            }
            let mut sink = self.sink.lock().unwrap();
            if let Err(err) = writeln!(sink, "{}", Value::Object(line)) {
                error!(error = %err, "error writing violation report");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_model::{Address, Labels, Metadata, ScanError, Target, TargetScan};
    use std::sync::Arc;

    /// A Write that appends into shared memory so tests can inspect what
    /// the reporter produced.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn violating_scan() -> TargetScan {
        let target = Arc::new(Target {
            address: Address::parse("10.2.3.4:443").unwrap(),
            metadata: Metadata {
                name: "logging-test".to_string(),
                source: "unit".to_string(),
                source_type: "file".to_string(),
                labels: Labels::new(),
            },
        });
        let scan = TargetScan::new(target);
        scan.add_violation(Some(ScanError::RequireTls { result: None }));
        scan
    }

    #[tokio::test]
    async fn writes_one_json_line_per_violation() {
        let buffer = SharedBuffer::default();
        let reporter = LoggingReporter::new(Box::new(buffer.clone()));
        let scan = violating_scan();
        reporter.report(&scan).await;

        let written = buffer.0.lock().unwrap().clone();
        let text = String::from_utf8(written).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["msg"], "violation");
        assert_eq!(parsed["type"], "require_tls");
        assert!(parsed["time"].is_string());
    }

    #[tokio::test]
    async fn re_reporting_the_same_scan_is_idempotent() {
        let buffer = SharedBuffer::default();
        let reporter = LoggingReporter::new(Box::new(buffer.clone()));
        let scan = violating_scan();
        reporter.report(&scan).await;
        reporter.report(&scan).await;

        let written = buffer.0.lock().unwrap().clone();
        let text = String::from_utf8(written).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
