//! Bucketing and bounded fan-out.
//!
//! Large id sets are split into fixed-size buckets so each query stays within
//! what the remote accepts, and the buckets are dispatched concurrently under
//! a parallelism cap. Results come back in completion order, not input order.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Bucket size for key lookups through JQL.
pub const FIND_BY_KEY_BUCKET: usize = 10;

/// Bucket size for attaching tests to an execution.
pub const EXECUTION_BUCKET: usize = 49;

/// Bucket size for moving tests between folders.
pub const FOLDER_MOVE_BUCKET: usize = 100;

/// Split `ids` into buckets of at most `size` elements.
///
/// Produces `ceil(len / size)` buckets; a size of zero is treated as one.
pub fn partition<T: Clone>(ids: &[T], size: usize) -> Vec<Vec<T>> {
    ids.chunks(size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// The JQL filter selecting every key in `bucket`.
pub fn key_in_jql<S: AsRef<str>>(bucket: &[S]) -> String {
    let keys: Vec<&str> = bucket.iter().map(|k| k.as_ref().trim()).collect();
    format!("key in ({})", keys.join(","))
}

/// Run `f` over every item with at most `max_parallel` calls in flight.
///
/// The returned results are unordered.
pub async fn fan_out<I, T, F, Fut, R>(items: I, max_parallel: usize, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    stream::iter(items)
        .map(f)
        .buffer_unordered(max_parallel.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_partition_bucket_count() {
        for size in 1..=12usize {
            for n in 0..=40usize {
                let ids: Vec<usize> = (0..n).collect();
                let buckets = partition(&ids, size);
                assert_eq!(buckets.len(), n.div_ceil(size), "n={} size={}", n, size);
                assert!(buckets.iter().all(|b| !b.is_empty() && b.len() <= size));
                let flattened: Vec<usize> = buckets.into_iter().flatten().collect();
                assert_eq!(flattened, ids);
            }
        }
    }

    #[test]
    fn test_partition_zero_size() {
        let buckets = partition(&["A-1", "A-2"], 0);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn test_key_in_jql() {
        assert_eq!(key_in_jql(&["DEMO-1", " DEMO-2 "]), "key in (DEMO-1,DEMO-2)");
    }

    #[test]
    fn test_fan_out_union_matches_backing_store() {
        let store: HashSet<String> = (1..=23).map(|i| format!("DEMO-{}", i)).collect();
        let mut requested: Vec<String> = (1..=30).map(|i| format!("DEMO-{}", i)).collect();
        requested.sort();

        let buckets = partition(&requested, FIND_BY_KEY_BUCKET);
        assert_eq!(buckets.len(), 3);

        let store_ref = &store;
        let results: Vec<Vec<String>> = tokio_test::block_on(fan_out(buckets, 2, |bucket| async move {
            bucket
                .into_iter()
                .filter(|k| store_ref.contains(k))
                .collect::<Vec<_>>()
        }));

        let union: HashSet<String> = results.into_iter().flatten().collect();
        assert_eq!(union, store);
    }

    #[tokio::test]
    async fn test_fan_out_respects_parallelism_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = fan_out(0..20, 3, |i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
