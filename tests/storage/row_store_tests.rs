//! RowStore interface tests.
//!
//! These tests verify the contract of the RowStore trait.
//! Each storage implementation should run these tests. Every test starts by
//! clearing the table, so they must run one after another.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use eventslog::{EventFilter, RowStore, StorageError};

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

async fn reset<S: RowStore>(store: &S) {
    store.ensure_schema().await.expect("schema should be created");
    store
        .delete_older_than(0)
        .await
        .expect("table should be cleared");
}

// =============================================================================
// Schema
// =============================================================================

pub async fn test_ensure_schema_is_idempotent<S: RowStore>(store: &S) {
    store.ensure_schema().await.expect("first ensure should succeed");
    store.ensure_schema().await.expect("second ensure should succeed");
    assert!(store.exists().await.expect("exists should succeed"));
    store.probe().await.expect("probe should succeed");
}

// =============================================================================
// RowStore::insert / query tests
// =============================================================================

pub async fn test_insert_and_query_groups_by_project<S: RowStore>(store: &S) {
    reset(store).await;
    let at = now();

    for (project, payload) in [("test_b", "1"), ("test_a", "2"), ("test_b", "3")] {
        store
            .insert(project, at, payload)
            .await
            .expect("insert should succeed");
    }

    let grouped = store
        .query(&EventFilter::all())
        .await
        .expect("query should succeed");
    assert_eq!(grouped.len(), 2, "should have 2 projects");

    let b: Vec<&str> = grouped["test_b"].iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(b, vec!["1", "3"]);
    assert!(grouped["test_b"][0].id < grouped["test_b"][1].id);
    assert!(grouped["test_b"][0].id < grouped["test_a"][0].id);
    assert!(grouped["test_a"][0].id < grouped["test_b"][1].id);
    assert_eq!(grouped["test_a"][0].timestamp, at);
}

pub async fn test_query_bounds_are_inclusive<S: RowStore>(store: &S) {
    reset(store).await;
    let at = now();

    store.insert("test_p", at - Duration::seconds(100), "before").await.unwrap();
    store.insert("test_p", at, "at").await.unwrap();
    store.insert("test_p", at + Duration::seconds(100), "after").await.unwrap();

    let grouped = store.query(&EventFilter::between(at, at)).await.unwrap();
    let payloads: Vec<&str> = grouped["test_p"].iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(payloads, vec!["at"]);

    let grouped = store
        .query(&EventFilter::between(at + Duration::seconds(100), at - Duration::seconds(100)))
        .await
        .unwrap();
    assert_eq!(grouped["test_p"].len(), 3);
}

pub async fn test_query_limit_keeps_oldest<S: RowStore>(store: &S) {
    reset(store).await;
    let at = now();

    for i in 0..5 {
        store.insert("test_p", at, &i.to_string()).await.unwrap();
    }

    let grouped = store.query(&EventFilter::all().with_limit(3)).await.unwrap();
    let payloads: Vec<&str> = grouped["test_p"].iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(payloads, vec!["0", "1", "2"]);
}

pub async fn test_query_reversed_bounds_is_malformed<S: RowStore>(store: &S) {
    let at = now();
    let filter = EventFilter {
        from: Some(at),
        to: Some(at - Duration::days(1)),
        limit: None,
    };

    let result = store.query(&filter).await;
    assert!(
        matches!(result, Err(StorageError::MalformedQuery(_))),
        "reversed bounds should be malformed"
    );
}

pub async fn test_query_all_in_insertion_order<S: RowStore>(store: &S) {
    reset(store).await;
    let at = now();

    store.insert("test_z", at, "1").await.unwrap();
    store.insert("test_a", at - Duration::days(3), "2").await.unwrap();
    store.insert("test_m", at, "3").await.unwrap();

    let entries = store.query_all().await.expect("query_all should succeed");
    let payloads: Vec<&str> = entries.iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(payloads, vec!["1", "2", "3"]);
    assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
}

// =============================================================================
// Deletes
// =============================================================================

pub async fn test_delete_older_than<S: RowStore>(store: &S) {
    reset(store).await;
    let at = now();

    store.insert("test_p", at - Duration::days(31), "old").await.unwrap();
    store.insert("test_p", at - Duration::days(29), "recent").await.unwrap();

    assert_eq!(store.delete_older_than(30).await.unwrap(), 1);
    assert_eq!(store.delete_older_than(30).await.unwrap(), 0);

    let entries = store.query_all().await.unwrap();
    let payloads: Vec<&str> = entries.iter().map(|e| e.payload.as_str()).collect();
    assert_eq!(payloads, vec!["recent"]);
}

pub async fn test_delete_zero_days_clears_everything<S: RowStore>(store: &S) {
    reset(store).await;

    store.insert("test_p", now(), "just now").await.unwrap();
    store.insert("test_p", now() + Duration::hours(1), "future").await.unwrap();

    assert_eq!(store.delete_older_than(0).await.unwrap(), 2);
    assert!(store.query_all().await.unwrap().is_empty());
}

pub async fn test_delete_project<S: RowStore>(store: &S) {
    reset(store).await;
    let at = now();

    store.insert("test_gone", at, "1").await.unwrap();
    store.insert("test_kept", at, "2").await.unwrap();
    store.insert("test_gone", at, "3").await.unwrap();

    assert_eq!(store.delete_project("test_gone").await.unwrap(), 2);

    let grouped = store.query(&EventFilter::all()).await.unwrap();
    assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["test_kept"]);
}

pub async fn test_payload_is_stored_verbatim<S: RowStore>(store: &S) {
    reset(store).await;
    let payload = r#"{"type":"comment-added","comment":"it's \"done\"; DROP TABLE x;--"}"#;

    store.insert("test_p'quote", now(), payload).await.unwrap();

    let entries = store.query_all().await.unwrap();
    assert_eq!(entries[0].payload, payload);
    assert_eq!(entries[0].project, "test_p'quote");
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all RowStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_row_store_tests {
    ($store:expr) => {
        use $crate::storage::row_store_tests::*;

        test_ensure_schema_is_idempotent($store).await;
        println!("  test_ensure_schema_is_idempotent: PASSED");

        test_insert_and_query_groups_by_project($store).await;
        println!("  test_insert_and_query_groups_by_project: PASSED");

        test_query_bounds_are_inclusive($store).await;
        println!("  test_query_bounds_are_inclusive: PASSED");

        test_query_limit_keeps_oldest($store).await;
        println!("  test_query_limit_keeps_oldest: PASSED");

        test_query_reversed_bounds_is_malformed($store).await;
        println!("  test_query_reversed_bounds_is_malformed: PASSED");

        test_query_all_in_insertion_order($store).await;
        println!("  test_query_all_in_insertion_order: PASSED");

        test_delete_older_than($store).await;
        println!("  test_delete_older_than: PASSED");

        test_delete_zero_days_clears_everything($store).await;
        println!("  test_delete_zero_days_clears_everything: PASSED");

        test_delete_project($store).await;
        println!("  test_delete_project: PASSED");

        test_payload_is_stored_verbatim($store).await;
        println!("  test_payload_is_stored_verbatim: PASSED");
    };
}
