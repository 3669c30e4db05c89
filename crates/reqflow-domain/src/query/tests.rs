use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::*;
use crate::cache::{RequestCache, RequestCacheConfig};
use crate::request::{Entry, Request};
use crate::resolver::{RequestResolver, Resolver};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key(u32);

impl Request for Key {
    type Success = u32;
    type Error = String;
}

type Calls = Arc<Mutex<Vec<Vec<Vec<u32>>>>>;

/// Records every `run_all` call as its steps of request keys. Key 0 fails.
struct Recorder {
    calls: Calls,
}

#[async_trait]
impl RequestResolver<Key> for Recorder {
    async fn run_all(&self, batches: Vec<Vec<Entry<Key>>>) -> Result<(), String> {
        self.calls.lock().unwrap().push(
            batches
                .iter()
                .map(|step| step.iter().map(|e| e.request().0).collect())
                .collect(),
        );
        for entry in batches.iter().flatten() {
            match entry.request().0 {
                0 => entry.fail("zero".to_string()),
                n => entry.succeed(n * 10),
            };
        }
        Ok(())
    }
}

fn recorder(name: &str) -> (Resolver<Key>, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let resolver = Resolver::new(
        name,
        Recorder {
            calls: Arc::clone(&calls),
        },
    );
    (resolver, calls)
}

fn get(n: u32, resolver: &Resolver<Key>) -> Query<u32, String> {
    from_request(Key(n), resolver.clone())
}

fn ctx() -> QueryContext {
    QueryContext::with_cache_instance(Arc::new(RequestCache::new(
        RequestCacheConfig::default().with_ttl(std::time::Duration::from_secs(60)),
    )))
}

// ============================================================
// Section 1: Pure combinators
// ============================================================

#[tokio::test]
async fn test_pure_queries_finish_without_dispatch() {
    let query = Query::<u32, String>::succeed(1)
        .map(|n| n + 1)
        .and_then(|n| Query::succeed(n * 3));

    assert_eq!(query.run(ctx()).await, Ok(6));
}

#[tokio::test]
async fn test_failure_short_circuits_and_exit_captures_it() {
    let failed = Query::<u32, String>::fail("nope".to_string()).map(|n| n + 1);
    assert_eq!(failed.run(ctx()).await, Err(Cause::Fail("nope".to_string())));

    let captured = Query::<u32, String>::fail("nope".to_string()).exit::<String>();
    assert_eq!(
        captured.run(ctx()).await,
        Ok(Err(Cause::Fail("nope".to_string())))
    );
}

#[tokio::test]
async fn test_map_err_reaches_failures_after_blocking() {
    let (keys, _) = recorder("keys");

    let query = get(0, &keys).map_err(|e| format!("mapped: {e}"));

    assert_eq!(
        query.run(ctx()).await,
        Err(Cause::Fail("mapped: zero".to_string()))
    );
}

#[tokio::test]
async fn test_from_future_lifts_plain_futures() {
    let query = Query::<u32, String>::from_future(async { Ok(5) });

    assert_eq!(query.run(ctx()).await, Ok(5));
}

// ============================================================
// Section 2: Batching
// ============================================================

#[tokio::test]
async fn test_zip_par_batches_both_sides() {
    let (keys, calls) = recorder("keys");

    let result = get(1, &keys).zip_par(get(2, &keys)).run(ctx()).await;

    assert_eq!(result, Ok((10, 20)));
    assert_eq!(*calls.lock().unwrap(), vec![vec![vec![1, 2]]]);
}

#[tokio::test]
async fn test_zip_par_without_batching_runs_sides_separately() {
    let (keys, calls) = recorder("keys");

    let result = get(1, &keys)
        .zip_par(get(2, &keys))
        .with_batching(false)
        .run(ctx())
        .await;

    assert_eq!(result, Ok((10, 20)));
    let mut seen = calls.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![vec![vec![1]], vec![vec![2]]]);
}

#[tokio::test]
async fn test_zip_pipelines_ordered_requests_to_one_resolver() {
    let (keys, calls) = recorder("keys");

    let result = get(1, &keys).zip(get(2, &keys)).run(ctx()).await;

    assert_eq!(result, Ok((10, 20)));
    assert_eq!(*calls.lock().unwrap(), vec![vec![vec![1], vec![2]]]);
}

#[tokio::test]
async fn test_and_then_dispatches_dependent_request_later() {
    let (keys, calls) = recorder("keys");
    let next = keys.clone();

    let result = get(1, &keys)
        .and_then(move |n| get(n, &next))
        .run(ctx())
        .await;

    assert_eq!(result, Ok(100));
    assert_eq!(*calls.lock().unwrap(), vec![vec![vec![1]], vec![vec![10]]]);
}

#[tokio::test]
async fn test_collect_all_par_keeps_input_order() {
    let (keys, calls) = recorder("keys");

    let query = Query::foreach_par(vec![3, 1, 2], |n| get(n, &keys));

    assert_eq!(query.run(ctx()).await, Ok(vec![30, 10, 20]));
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_collect_all_par_reports_first_failure_by_position() {
    let (keys, _) = recorder("keys");
    let (other, _) = recorder("other");

    let query = Query::collect_all_par(vec![
        get(1, &keys),
        Query::fail("first".to_string()),
        get(0, &other),
    ]);

    assert_eq!(query.run(ctx()).await, Err(Cause::Fail("first".to_string())));
}

#[tokio::test]
async fn test_collect_all_runs_in_order() {
    let (keys, calls) = recorder("keys");
    let (other, other_calls) = recorder("other");

    let query = Query::collect_all(vec![get(1, &keys), get(2, &other), get(3, &keys)]);

    assert_eq!(query.run(ctx()).await, Ok(vec![10, 20, 30]));
    assert_eq!(*calls.lock().unwrap(), vec![vec![vec![1]], vec![vec![3]]]);
    assert_eq!(*other_calls.lock().unwrap(), vec![vec![vec![2]]]);
}

#[tokio::test]
async fn test_collect_all_failure_waits_for_earlier_queries() {
    let (keys, calls) = recorder("keys");

    let query = Query::collect_all(vec![get(1, &keys), Query::fail("later".to_string())]);

    assert_eq!(query.run(ctx()).await, Err(Cause::Fail("later".to_string())));
    assert_eq!(*calls.lock().unwrap(), vec![vec![vec![1]]]);
}

#[tokio::test]
async fn test_large_parallel_fan_out_is_one_call() {
    let (keys, calls) = recorder("keys");

    let query = Query::foreach_par(1..=5_000, |n| get(n, &keys));

    let values = query.run(ctx()).await.unwrap();
    assert_eq!(values.len(), 5_000);
    assert_eq!(values[4_999], 50_000);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_loop_issued_request_chain_runs_one_round_per_request() {
    // Arrange: every request depends on the previous one finishing.
    let (keys, calls) = recorder("keys");
    let mut query = Query::<u64, String>::succeed(0);
    for n in 1..=20_000u32 {
        let keys = keys.clone();
        query = query.and_then(move |total| get(n, &keys).map(move |value| total + u64::from(value)));
    }

    // Act
    let result = query.run(ctx()).await;

    // Assert
    assert_eq!(result, Ok(10 * 20_000 * 20_001 / 2));
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 20_000);
    assert_eq!(calls[0], vec![vec![1]]);
    assert_eq!(calls[19_999], vec![vec![20_000]]);
}

#[tokio::test]
async fn test_failure_skips_the_rest_of_a_long_chain() {
    let (keys, calls) = recorder("keys");
    let mut query = get(1, &keys).map(u64::from);
    for n in [2, 0, 3] {
        let keys = keys.clone();
        query = query.and_then(move |total| get(n, &keys).map(move |value| total + u64::from(value)));
    }
    for _ in 0..10_000 {
        query = query.map(|total| total + 1);
    }

    let result = query.map_err(|e| format!("chain: {e}")).run(ctx()).await;

    assert_eq!(result, Err(Cause::Fail("chain: zero".to_string())));
    assert_eq!(
        *calls.lock().unwrap(),
        vec![vec![vec![1]], vec![vec![2]], vec![vec![0]]]
    );
}

// ============================================================
// Section 3: Caching
// ============================================================

#[tokio::test]
async fn test_identical_requests_share_one_entry_when_caching() {
    let (keys, calls) = recorder("keys");

    let result = get(1, &keys).zip_par(get(1, &keys)).run(ctx()).await;

    assert_eq!(result, Ok((10, 10)));
    assert_eq!(*calls.lock().unwrap(), vec![vec![vec![1]]]);
}

#[tokio::test]
async fn test_identical_requests_are_kept_apart_without_caching() {
    let (keys, calls) = recorder("keys");

    let result = get(1, &keys)
        .zip_par(get(1, &keys))
        .with_caching(false)
        .run(ctx())
        .await;

    assert_eq!(result, Ok((10, 10)));
    assert_eq!(*calls.lock().unwrap(), vec![vec![vec![1, 1]]]);
}

#[tokio::test]
async fn test_caching_toggle_reaches_continuations() {
    let (keys, calls) = recorder("keys");
    let again = keys.clone();

    get(1, &keys)
        .and_then(move |_| get(1, &again))
        .with_caching(false)
        .run(ctx())
        .await
        .unwrap();

    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_cached_answer_is_reused_across_runs() {
    let (keys, calls) = recorder("keys");
    let ctx = ctx();

    assert_eq!(get(1, &keys).run(ctx.clone()).await, Ok(10));
    assert_eq!(get(1, &keys).run(ctx.clone()).await, Ok(10));

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(ctx.cache().listeners(&Key(1)).unwrap().count(), 0);
}

#[tokio::test]
async fn test_with_cache_scopes_a_separate_cache() {
    let (keys, calls) = recorder("keys");
    let ctx = ctx();
    let private = Arc::new(RequestCache::default());

    get(1, &keys).run(ctx.clone()).await.unwrap();
    get(1, &keys)
        .with_cache(Arc::clone(&private))
        .run(ctx.clone())
        .await
        .unwrap();

    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(private.entry_count(), 1);
}

#[tokio::test]
async fn test_cache_request_result_warms_the_cache() {
    let (keys, calls) = recorder("keys");
    let ctx = ctx();

    cache_request_result::<Key, String>(Key(4), Ok(99))
        .run(ctx.clone())
        .await
        .unwrap();
    let value = get(4, &keys).run(ctx).await;

    assert_eq!(value, Ok(99));
    assert!(calls.lock().unwrap().is_empty());
}

// ============================================================
// Section 4: Resolver plumbing
// ============================================================

#[tokio::test]
async fn test_request_with_resolves_resolver_first() {
    let (keys, calls) = recorder("keys");

    let query = request_with(Key(2), Query::succeed(keys.clone()));

    assert_eq!(query.run(ctx()).await, Ok(20));
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_map_data_sources_redirects_requests() {
    let (primary, primary_calls) = recorder("primary");
    let (replica, replica_calls) = recorder("replica");
    let primary_id = primary.id();
    let target = replica.data_source();

    let query = get(1, &primary)
        .and_then({
            let primary = primary.clone();
            move |_| get(2, &primary)
        })
        .map_data_sources(move |resolver| {
            if resolver.id() == primary_id {
                Arc::clone(&target)
            } else {
                Arc::clone(resolver)
            }
        });

    assert_eq!(query.run(ctx()).await, Ok(20));
    assert!(primary_calls.lock().unwrap().is_empty());
    assert_eq!(
        *replica_calls.lock().unwrap(),
        vec![vec![vec![1]], vec![vec![2]]]
    );
}
