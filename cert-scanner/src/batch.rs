// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Handle over a batch of in-flight workers. `wait` blocks until every
/// worker finishes and surfaces the first error; dropping the handle
/// aborts whatever is still running.
pub struct BatchGroup {
    tasks: JoinSet<anyhow::Result<()>>,
}

impl BatchGroup {
    /// Waits for every scheduled item. All items run to completion even
    /// when one of them fails; the first failure is returned.
    pub async fn wait(mut self) -> anyhow::Result<()> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(anyhow::anyhow!("worker panicked: {err}"));
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Like `wait`, but returns as soon as the token fires. Workers that
    /// are still running are aborted at their next await point; callers
    /// needing a softer landing must watch the token inside the worker.
    pub async fn wait_cancellable(self, token: &CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            _ = token.cancelled() => Ok(()),
            result = self.wait() => result,
        }
    }
}

/// Runs `worker` over every item with at most `width` concurrently in
/// flight. Each worker receives a child of the given token; the width is
/// clamped to the item count.
pub fn process<T, F, Fut>(
    token: &CancellationToken,
    items: Vec<T>,
    width: usize,
    worker: F,
) -> BatchGroup
where
    T: Send + 'static,
    F: Fn(CancellationToken, T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let width = width.min(items.len()).max(1);
    let permits = Arc::new(Semaphore::new(width));
    let mut tasks = JoinSet::new();
    for item in items {
        let permits = Arc::clone(&permits);
        let worker = worker.clone();
        let child = token.child_token();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.expect("semaphore closed");
            worker(child, item).await
        });
    }
    BatchGroup { tasks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_every_item() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let token = CancellationToken::new();
        let group = process(&token, (0..100).collect(), 4, move |_token, _item| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        group.wait().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn respects_the_width_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let (in_flight_handle, high_water_handle) =
            (Arc::clone(&in_flight), Arc::clone(&high_water));
        let group = process(&token, (0..32).collect(), 3, move |_token, _item: i32| {
            let in_flight = Arc::clone(&in_flight_handle);
            let high_water = Arc::clone(&high_water_handle);
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        });
        group.wait().await.unwrap();
        assert!(high_water.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn width_is_clamped_to_item_count() {
        let token = CancellationToken::new();
        let group = process(&token, vec![1, 2], 64, |_token, _item| async { Ok(()) });
        group.wait().await.unwrap();
    }

    #[tokio::test]
    async fn first_error_is_surfaced_but_every_item_still_runs() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let token = CancellationToken::new();
        let group = process(&token, (0..10).collect(), 2, move |_token, item: i32| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if item == 3 {
                    anyhow::bail!("item 3 failed");
                }
                Ok(())
            }
        });
        let err = group.wait().await.unwrap_err();
        assert!(err.to_string().contains("failed"));
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn cancellable_wait_returns_on_cancellation() {
        let token = CancellationToken::new();
        let group = process(&token, vec![()], 1, |_token, _item| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let waiter = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waiter.cancel();
        });
        tokio::time::timeout(Duration::from_secs(5), group.wait_cancellable(&token))
            .await
            .expect("wait should return promptly after cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn workers_see_the_cancellation_token() {
        let token = CancellationToken::new();
        token.cancel();
        let group = process(&token, vec![()], 1, |token, _item| async move {
            assert!(token.is_cancelled());
            Ok(())
        });
        group.wait().await.unwrap();
    }
}
