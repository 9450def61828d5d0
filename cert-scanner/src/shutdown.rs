// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// A token cancelled when the process receives SIGINT or SIGTERM. The
/// whole pipeline derives from this one root.
pub fn signalled() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received, cancelling");
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// A child of `parent` that additionally cancels itself after `timeout`.
/// A zero timeout means no deadline.
pub fn with_timeout(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    if !timeout.is_zero() {
        let deadline = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = deadline.cancelled() => {}
                _ = tokio::time::sleep(timeout) => deadline.cancel(),
            }
        });
    }
    child
}
