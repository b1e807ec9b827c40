mod common;

use common::{event, in_memory, store_for, tags_query};
use fencedb::Error;
use futures::future::join_all;

#[tokio::test]
async fn append_within_unchanged_boundary_succeeds() {
    let backend = in_memory();
    let store = store_for(&backend, "acme");

    let e1 = event("order-created", &["order:123"]);
    let e1_id = e1.id;
    store.append(vec![e1], None, None).await.unwrap();

    // Nothing new inside the boundary since e1: the append passes.
    let boundary = tags_query(&["order:123"]);
    let e2 = event("order-updated", &["order:123"]);
    store
        .append(vec![e2], Some(&boundary), Some(e1_id))
        .await
        .unwrap();

    let streamed = store.stream(&boundary, None).await.unwrap();
    assert_eq!(streamed.len(), 2);
}

#[tokio::test]
async fn boundary_grown_past_expected_event_conflicts() {
    let backend = in_memory();
    let store = store_for(&backend, "acme");

    let e1 = event("order-created", &["order:123"]);
    let e1_id = e1.id;
    let e2 = event("order-updated", &["order:123"]);
    store.append(vec![e1], None, None).await.unwrap();
    store.append(vec![e2], None, None).await.unwrap();

    // e2 grew the boundary past e1: the writer's decision is stale.
    let boundary = tags_query(&["order:123"]);
    let e3 = event("order-shipped", &["order:123"]);
    let err = store
        .append(vec![e3.clone()], Some(&boundary), Some(e1_id))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }));

    // The failed append stored nothing.
    assert!(!backend.contains(e3.id));
    let streamed = store.stream(&boundary, None).await.unwrap();
    assert_eq!(streamed.len(), 2);
}

#[tokio::test]
async fn expect_none_conflicts_when_any_event_matches() {
    let backend = in_memory();
    let store = store_for(&backend, "acme");

    store
        .append(vec![event("order-created", &["order:123"])], None, None)
        .await
        .unwrap();

    let boundary = tags_query(&["order:123"]);
    let err = store
        .append(
            vec![event("order-created", &["order:123"])],
            Some(&boundary),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }));
}

#[tokio::test]
async fn unknown_expected_id_degenerates_to_expect_none() {
    let backend = in_memory();
    let store = store_for(&backend, "acme");

    // No matching events at all: the unknown id is treated as position -1
    // and the append passes.
    let boundary = tags_query(&["order:123"]);
    let ghost = uuid::Uuid::new_v4();
    store
        .append(
            vec![event("order-created", &["order:123"])],
            Some(&boundary),
            Some(ghost),
        )
        .await
        .unwrap();

    // Now a matching event exists; the same unknown id conflicts.
    let err = store
        .append(
            vec![event("order-updated", &["order:123"])],
            Some(&boundary),
            Some(ghost),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }));
}

#[tokio::test]
async fn non_overlapping_events_do_not_trip_the_boundary() {
    let backend = in_memory();
    let store = store_for(&backend, "acme");

    let e1 = event("order-created", &["order:123"]);
    let e1_id = e1.id;
    store.append(vec![e1], None, None).await.unwrap();
    // A different order entirely.
    store
        .append(vec![event("order-created", &["order:999"])], None, None)
        .await
        .unwrap();

    let boundary = tags_query(&["order:123"]);
    store
        .append(
            vec![event("order-updated", &["order:123"])],
            Some(&boundary),
            Some(e1_id),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn boundary_with_type_dimension_fences_only_those_types() {
    let backend = in_memory();
    let store = store_for(&backend, "acme");

    store
        .append(vec![event("order-note-added", &["order:123"])], None, None)
        .await
        .unwrap();

    // Fencing on shipment events only: the note does not conflict.
    let boundary = tags_query(&["order:123"])
        .with_event_type(common::ty("order-shipped"))
        .requiring_all_tags();
    store
        .append(
            vec![event("order-shipped", &["order:123"])],
            Some(&boundary),
            None,
        )
        .await
        .unwrap();

    // But now a shipment exists, so expect-none on the same boundary fails.
    let err = store
        .append(
            vec![event("order-shipped", &["order:123"])],
            Some(&boundary),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_on_one_boundary_produce_exactly_one_winner() {
    const WRITERS: usize = 16;

    let backend = in_memory();
    let store = store_for(&backend, "acme");

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                // Jitter the start so writers genuinely interleave.
                let delay = rand::random::<u64>() % 500;
                tokio::time::sleep(std::time::Duration::from_micros(delay)).await;

                let boundary = tags_query(&["order:123"]);
                store
                    .append(
                        vec![event("order-created", &["order:123"])],
                        Some(&boundary),
                        None,
                    )
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut conflicts = 0;
    for outcome in join_all(handles).await {
        match outcome.unwrap() {
            Ok(_) => successes += 1,
            Err(Error::ConcurrencyConflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1, "exactly one writer may pass the boundary");
    assert_eq!(conflicts, WRITERS - 1);
    assert_eq!(backend.len(), 1);
}
