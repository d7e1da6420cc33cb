// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bounded worker pool shared by every stage that makes external calls
//! (extraction, embedding, initial labelling, merge labelling), per §5: a
//! `tokio::sync::Semaphore` gating a `tokio::task::JoinSet`.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Run `f` over every item in `items` with at most `workers` concurrent
/// invocations, returning results reassembled in input order regardless of
/// completion order (§5's ordering guarantee).
pub async fn run_bounded<I, F, Fut, R>(items: Vec<I>, workers: usize, f: F) -> Vec<R>
where
    I: Send + 'static,
    F: Fn(usize, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let f = Arc::new(f);
    let mut set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let f = Arc::clone(&f);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let result = f(index, item).await;
            (index, result)
        });
    }

    let mut results: Vec<(usize, R)> = Vec::new();
    while let Some(joined) = set.join_next().await {
        results.push(joined.expect("worker task panicked"));
    }
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, r)| r).collect()
}
