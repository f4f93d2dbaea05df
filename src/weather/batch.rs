use std::{future::Future, time::Duration};

use futures::future::join_all;
use tracing::debug;

/// Runs `f` over `items` at most `batch_size` at a time, pausing `delay`
/// between batches. Every outcome is returned in input order; a slow or
/// failing item only affects its own slot.
pub async fn process_in_batches<'a, I, T, F, Fut>(
    items: &'a [I],
    batch_size: usize,
    delay: Duration,
    mut f: F,
) -> Vec<T>
where
    F: FnMut(&'a I) -> Fut,
    Fut: Future<Output = T>,
{
    let batch_size = batch_size.max(1);
    let batches = items.len().div_ceil(batch_size);
    let mut results = Vec::with_capacity(items.len());

    for (index, chunk) in items.chunks(batch_size).enumerate() {
        debug!("processing batch {}/{batches} ({} items)", index + 1, chunk.len());
        results.extend(join_all(chunk.iter().map(&mut f)).await);

        if index + 1 < batches && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    results
}
