use std::future::Future;
use std::num::NonZeroUsize;

use futures_util::stream::{self, StreamExt};

/// Worker count used when `--workers` is not given.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Run `handler` over every item with at most `workers` in flight.
///
/// Completes once every item has been handled, so awaiting it is the barrier
/// between phases. Results come back in completion order.
pub async fn run_bounded<I, T, F, Fut, R>(items: I, workers: usize, handler: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(handler)
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}
