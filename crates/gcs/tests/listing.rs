//! Pagination and batch-delete tests against the in-memory fake remote

mod common;

use std::sync::atomic::Ordering;

use common::FakeRemote;
use futures::TryStreamExt as _;
use gs_core::Error;
use gs_gcs::batch::{BatchSubRequest, bulk_delete, execute_batch};
use gs_gcs::list_objects;

const BUCKET: &str = "list-bucket";

fn seed_objects(remote: &FakeRemote, count: usize) {
    for i in 0..count {
        remote.put_object(BUCKET, &format!("obj-{i:03}"), b"x");
    }
}

#[tokio::test]
async fn uncapped_listing_ends_when_last_page_has_no_cursor() {
    let remote = FakeRemote::new();
    seed_objects(&remote, 10);
    remote.page_size.store(3, Ordering::Relaxed);
    let client = remote.client();

    let entries: Vec<_> = list_objects(client, BUCKET, None, None, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entries.len(), 10);

    // 10 items at 3 per page = 4 page requests
    let pages = remote
        .requests()
        .iter()
        .filter(|r| r.method == "GET")
        .count();
    assert_eq!(pages, 4);
}

#[tokio::test]
async fn capped_listing_yields_exactly_max_results() {
    let remote = FakeRemote::new();
    seed_objects(&remote, 50);
    remote.page_size.store(3, Ordering::Relaxed);
    let client = remote.client();

    let entries: Vec<_> = list_objects(client, BUCKET, None, None, Some(5))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);

    // The remaining count rides along as each page's upper bound
    let requests = remote.requests();
    assert!(requests[0].query.contains("maxResults=5"));
    assert!(requests[1].query.contains("maxResults=2"));
    assert!(requests[1].query.contains("pageToken="));
}

#[tokio::test]
async fn cap_larger_than_listing_terminates_on_missing_cursor() {
    let remote = FakeRemote::new();
    seed_objects(&remote, 4);
    let client = remote.client();

    let entries: Vec<_> = list_objects(client, BUCKET, None, None, Some(100))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entries.len(), 4);
}

#[tokio::test]
async fn prefixes_are_yielded_ahead_of_items() {
    let remote = FakeRemote::new();
    remote.put_object(BUCKET, "dir/inner.txt", b"x");
    remote.put_object(BUCKET, "zzz-top-level.txt", b"x");
    let client = remote.client();

    let entries: Vec<_> = list_objects(client, BUCKET, None, Some("/"), None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_prefix);
    assert_eq!(entries[0].name, "dir/");
    assert!(!entries[1].is_prefix);
    assert_eq!(entries[1].name, "zzz-top-level.txt");
}

#[tokio::test]
async fn caller_can_stop_pulling_early() {
    let remote = FakeRemote::new();
    seed_objects(&remote, 30);
    remote.page_size.store(5, Ordering::Relaxed);
    let client = remote.client();

    let mut stream = list_objects(client, BUCKET, None, None, None);
    let mut pulled = 0;
    while let Some(_entry) = stream.try_next().await.unwrap() {
        pulled += 1;
        if pulled == 7 {
            break;
        }
    }
    drop(stream);

    // Two pages were enough for seven entries; the rest was never fetched
    let pages = remote
        .requests()
        .iter()
        .filter(|r| r.method == "GET")
        .count();
    assert_eq!(pages, 2);
}

#[tokio::test]
async fn bulk_delete_removes_every_key_in_one_wire_call() {
    let remote = FakeRemote::new();
    seed_objects(&remote, 5);
    let client = remote.client();

    let keys: Vec<String> = (0..5).map(|i| format!("obj-{i:03}")).collect();
    bulk_delete(&client, BUCKET, &keys).await.unwrap();

    assert_eq!(remote.object_count(), 0);
    let batch_posts = remote
        .requests()
        .iter()
        .filter(|r| r.path == "/batch/storage/v1")
        .count();
    assert_eq!(batch_posts, 1);
}

#[tokio::test]
async fn batch_failure_identifies_the_missing_object() {
    let remote = FakeRemote::new();
    remote.put_object(BUCKET, "exists-0", b"x");
    remote.put_object(BUCKET, "exists-1", b"x");
    let client = remote.client();

    let keys = vec![
        "exists-0".to_string(),
        "missing".to_string(),
        "exists-1".to_string(),
    ];
    match bulk_delete(&client, BUCKET, &keys).await {
        Err(Error::Batch {
            index,
            method,
            url,
            status,
        }) => {
            assert_eq!(index, 1);
            assert_eq!(method, "DELETE");
            assert!(url.ends_with("/o/missing"));
            assert_eq!(status, 404);
        }
        other => panic!("expected Batch error, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_batch_is_rejected_locally() {
    let remote = FakeRemote::new();
    let client = remote.client();

    let requests: Vec<BatchSubRequest> = (0..101)
        .map(|i| BatchSubRequest::delete(BUCKET, &format!("k-{i}")))
        .collect();
    assert!(execute_batch(&client, &requests).await.is_err());
    // Nothing reached the wire
    assert!(remote.requests().is_empty());
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let remote = FakeRemote::new();
    let client = remote.client();
    let responses = execute_batch(&client, &[]).await.unwrap();
    assert!(responses.is_empty());
    assert!(remote.requests().is_empty());
}
