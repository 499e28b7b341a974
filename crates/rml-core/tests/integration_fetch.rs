//! Integration tests: queue ordering, single-flight caching, and transport
//! failures against a local HTTP server.

mod common;

use std::time::Duration;

use common::text_server::{start, Route};
use rml_core::fetch::{FetchError, FetchOptions, FetchQueue};

#[tokio::test]
async fn completions_are_delivered_in_submission_order() {
    let server = start(vec![
        (
            "/slow.js",
            Route::with_delay("slow body", Duration::from_millis(600)),
        ),
        ("/fast.js", Route::text("fast body")),
    ]);
    let queue = FetchQueue::new();

    let first = queue.fetch(&server.url("slow.js"), &FetchOptions::default());
    let mut second = Box::pin(queue.fetch(&server.url("fast.js"), &FetchOptions::default()));

    // The fast response arrives long before the slow one but must stay
    // pending until the queue head resolves.
    let early = tokio::time::timeout(Duration::from_millis(300), &mut second).await;
    assert!(early.is_err(), "fast fetch resolved ahead of the queue head");
    assert_eq!(server.hits("/fast.js"), 1);

    let slow_text = first.await.expect("slow fetch");
    assert_eq!(&*slow_text, "slow body");
    let fast_text = second.await.expect("fast fetch");
    assert_eq!(&*fast_text, "fast body");
}

#[tokio::test]
async fn concurrent_fetches_share_one_request() {
    let server = start(vec![(
        "/mod.js",
        Route::with_delay("shared body", Duration::from_millis(200)),
    )]);
    let queue = FetchQueue::new();
    let url = server.url("mod.js");

    let (a, b) = tokio::join!(
        queue.fetch(&url, &FetchOptions::default()),
        queue.fetch(&url, &FetchOptions::default()),
    );
    assert_eq!(&*a.expect("first caller"), "shared body");
    assert_eq!(&*b.expect("second caller"), "shared body");
    assert_eq!(server.hits("/mod.js"), 1);
}

#[tokio::test]
async fn results_are_memoized_for_the_queue_lifetime() {
    let server = start(vec![("/once.js", Route::text("cached body"))]);
    let queue = FetchQueue::new();
    let url = server.url("once.js");

    let first = queue.fetch(&url, &FetchOptions::default()).await.unwrap();
    let second = queue.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(server.hits("/once.js"), 1);
}

#[tokio::test]
async fn failed_results_stay_failed() {
    let server = start(vec![("/down.js", Route::with_status(500, "boom"))]);
    let queue = FetchQueue::new();
    let url = server.url("down.js");

    let err = queue
        .fetch(&url, &FetchOptions::default())
        .await
        .unwrap_err();
    match err {
        FetchError::Status { url: ref u, status } => {
            assert_eq!(status, 500);
            assert_eq!(u, &url);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Same failure again, without touching the network.
    let again = queue
        .fetch(&url, &FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(again, FetchError::Status { status: 500, .. }));
    assert_eq!(server.hits("/down.js"), 1);
}

#[tokio::test]
async fn missing_routes_fail_with_not_found() {
    let server = start(vec![]);
    let queue = FetchQueue::new();
    let url = server.url("missing.js");

    let err = queue
        .fetch(&url, &FetchOptions::default())
        .await
        .unwrap_err();
    match err {
        FetchError::NotFound { url: u } => assert_eq!(u, url),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn watchdog_timeout_carries_the_url() {
    let server = start(vec![(
        "/stall.js",
        Route::with_delay("too late", Duration::from_secs(3)),
    )]);
    let queue = FetchQueue::new();
    let url = server.url("stall.js");
    let options = FetchOptions {
        timeout: Some(Duration::from_millis(300)),
        ..FetchOptions::default()
    };

    let err = queue.fetch(&url, &options).await.unwrap_err();
    match err {
        FetchError::Timeout { url: u } => assert_eq!(u, url),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn nocache_busts_the_memoized_result() {
    let server = start(vec![("/fresh.js", Route::text("fresh body"))]);
    let queue = FetchQueue::new();
    let url = server.url("fresh.js");
    let options = FetchOptions {
        nocache: true,
        ..FetchOptions::default()
    };

    let first = queue.fetch(&url, &options).await.unwrap();
    // The buster is epoch millis; step past the first one.
    tokio::time::sleep(Duration::from_millis(2)).await;
    let second = queue.fetch(&url, &options).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(server.hits("/fresh.js"), 2);
    for target in server.requests_for("/fresh.js") {
        assert!(target.contains("?_="), "missing cache buster in {target}");
    }
}

#[tokio::test]
async fn sync_fetches_block_inline_and_share_the_cache() {
    let server = start(vec![("/sync.js", Route::text("sync body"))]);
    let queue = FetchQueue::new();
    let url = server.url("sync.js");
    let options = FetchOptions {
        sync: true,
        ..FetchOptions::default()
    };

    let text = queue.fetch(&url, &options).await.unwrap();
    assert_eq!(&*text, "sync body");

    // An async repeat is served from the same cache entry.
    let again = queue.fetch(&url, &FetchOptions::default()).await.unwrap();
    assert_eq!(again, text);
    assert_eq!(server.hits("/sync.js"), 1);
}
