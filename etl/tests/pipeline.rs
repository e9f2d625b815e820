#![cfg(feature = "test-utils")]

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use etl::concurrency::shutdown::create_shutdown_channel;
use etl::destination::Destination;
use etl::destination::memory::MemoryDestination;
use etl::error::ErrorKind;
use etl::index::IndexSchema;
use etl::pipeline::CycleOutcome;
use etl::source::ChangeOrigin;
use etl::source::memory::MemorySource;
use etl::state::{COMPLETED_IDS_KEY, IS_RUNNING_KEY, LAST_START_TIME_KEY, RUNNING_SINCE_KEY};
use etl::store::state::memory::MemoryStateStore;
use etl::store::state::{StateMap, StateStore};
use etl::sync::resolve;
use etl::test_utils::faulty_destination::FaultyDestination;
use etl::test_utils::fixtures::{
    TEST_GENRES_INDEX, TEST_MOVIES_INDEX, film_work, genre, minutes_ago, sorted_ids,
    test_pipeline,
};
use etl::types::{FilmWorkDocument, FilmWorkRow};
use serde_json::{Value, json};
use telemetry::tracing::init_test_tracing;
use uuid::Uuid;

async fn source_with_film_works(ids: &[Uuid]) -> MemorySource {
    let source = MemorySource::new();
    for (position, id) in ids.iter().enumerate() {
        source
            .insert_film_work(film_work(*id, &format!("Film {position}")), minutes_ago(30))
            .await;
    }
    source
}

fn completed_ids_of(state: &StateMap) -> BTreeSet<Uuid> {
    state
        .get(COMPLETED_IDS_KEY)
        .cloned()
        .map(|value| serde_json::from_value(value).unwrap())
        .unwrap_or_default()
}

#[tokio::test]
async fn chunks_are_recorded_then_cycle_commits() {
    init_test_tracing();

    let ids = sorted_ids(3);
    let source = source_with_film_works(&ids).await;
    let store = MemoryStateStore::new();
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(2, source, store.clone(), destination.clone());

    let before_cycle = Utc::now();
    let outcome = pipeline.run_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            film_works: 3,
            genres: 0
        }
    );
    assert_eq!(
        destination.bulk_requests_for(TEST_MOVIES_INDEX).await,
        vec![vec![ids[0], ids[1]], vec![ids[2]]]
    );

    // The first chunk was persisted on its own before the second one was loaded.
    let history = store.history().await;
    assert!(
        history
            .iter()
            .any(|state| completed_ids_of(state) == BTreeSet::from([ids[0], ids[1]]))
    );

    let progress = pipeline.progress();
    assert!(progress.completed_ids().await.unwrap().is_empty());
    assert!(!progress.is_running().await.unwrap());
    let watermark = progress.watermark().await.unwrap().unwrap();
    assert!(watermark >= before_cycle);

    let documents = destination.documents(TEST_MOVIES_INDEX).await;
    assert_eq!(documents.len(), 3);
    assert_eq!(
        destination.schema(TEST_MOVIES_INDEX).await,
        Some(IndexSchema::movies(TEST_MOVIES_INDEX))
    );
}

#[tokio::test]
async fn cycle_without_changes_only_moves_the_watermark() {
    init_test_tracing();

    let source = source_with_film_works(&sorted_ids(2)).await;
    let previous_watermark = minutes_ago(10);
    let mut state = StateMap::new();
    state.insert(
        LAST_START_TIME_KEY.to_string(),
        serde_json::to_value(previous_watermark).unwrap(),
    );
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(
        2,
        source.clone(),
        MemoryStateStore::with_state(state),
        destination.clone(),
    );

    let outcome = pipeline.run_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            film_works: 0,
            genres: 0
        }
    );
    assert!(source.film_work_row_requests().await.is_empty());
    assert!(
        destination
            .bulk_requests_for(TEST_MOVIES_INDEX)
            .await
            .is_empty()
    );
    assert_eq!(destination.schema(TEST_MOVIES_INDEX).await, None);

    let watermark = pipeline.progress().watermark().await.unwrap().unwrap();
    assert!(watermark > previous_watermark);
}

#[tokio::test]
async fn transient_failure_resumes_without_refetching_loaded_chunks() {
    init_test_tracing();

    let ids = sorted_ids(3);
    let source = source_with_film_works(&ids).await;
    let destination = FaultyDestination::wrap(MemoryDestination::new());
    destination.throttle_bulk_call(2).await;
    let pipeline = test_pipeline(
        2,
        source.clone(),
        MemoryStateStore::new(),
        destination.clone(),
    );

    let outcome = pipeline.run_cycle_with_retry().await.unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::Completed { film_works: 1, .. }
    ));
    assert_eq!(
        source.film_work_row_requests().await,
        vec![ids.clone(), vec![ids[2]]]
    );
    assert_eq!(destination.bulk_calls().await, 3);
    assert_eq!(
        destination
            .wrapped()
            .documents(TEST_MOVIES_INDEX)
            .await
            .len(),
        3
    );
    assert!(
        pipeline
            .progress()
            .completed_ids()
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn running_cycle_is_not_entered_twice() {
    init_test_tracing();

    let source = source_with_film_works(&sorted_ids(2)).await;
    let mut state = StateMap::new();
    state.insert(IS_RUNNING_KEY.to_string(), json!(true));
    state.insert(
        RUNNING_SINCE_KEY.to_string(),
        serde_json::to_value(minutes_ago(1)).unwrap(),
    );
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(
        2,
        source.clone(),
        MemoryStateStore::with_state(state),
        destination.clone(),
    );

    let outcome = pipeline.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Skipped);
    assert_eq!(source.total_calls().await, 0);
    assert_eq!(destination.total_calls().await, 0);
    assert!(pipeline.progress().is_running().await.unwrap());
}

#[tokio::test]
async fn stale_running_flag_is_taken_over() {
    init_test_tracing();

    let source = source_with_film_works(&sorted_ids(1)).await;
    let mut state = StateMap::new();
    state.insert(IS_RUNNING_KEY.to_string(), json!(true));
    state.insert(
        RUNNING_SINCE_KEY.to_string(),
        serde_json::to_value(minutes_ago(3 * 60)).unwrap(),
    );
    let pipeline = test_pipeline(
        2,
        source,
        MemoryStateStore::with_state(state),
        MemoryDestination::new(),
    );

    let outcome = pipeline.run_cycle().await.unwrap();

    assert!(matches!(
        outcome,
        CycleOutcome::Completed { film_works: 1, .. }
    ));
    assert!(!pipeline.progress().is_running().await.unwrap());
}

#[tokio::test]
async fn completed_ids_are_excluded_from_the_next_extraction() {
    init_test_tracing();

    let ids = sorted_ids(3);
    let source = source_with_film_works(&ids).await;
    let mut state = StateMap::new();
    state.insert(
        COMPLETED_IDS_KEY.to_string(),
        serde_json::to_value(BTreeSet::from([ids[0], ids[1]])).unwrap(),
    );
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(
        2,
        source.clone(),
        MemoryStateStore::with_state(state),
        destination.clone(),
    );

    pipeline.run_cycle().await.unwrap();

    assert_eq!(source.film_work_row_requests().await, vec![vec![ids[2]]]);
    assert_eq!(
        destination.bulk_requests_for(TEST_MOVIES_INDEX).await,
        vec![vec![ids[2]]]
    );
    assert!(
        pipeline
            .progress()
            .completed_ids()
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn rejected_documents_fail_the_cycle_without_recording_the_chunk() {
    init_test_tracing();

    let source = source_with_film_works(&sorted_ids(2)).await;
    let destination = MemoryDestination::new();
    // An existing index is never altered, so documents must match its mapping.
    destination
        .create_index(&IndexSchema::genres(TEST_MOVIES_INDEX))
        .await
        .unwrap();
    let pipeline = test_pipeline(2, source, MemoryStateStore::new(), destination.clone());

    let err = pipeline.run_cycle_with_retry().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationDocumentRejected);
    assert!(
        err.detail()
            .unwrap()
            .contains("strict_dynamic_mapping_exception")
    );
    assert_eq!(
        destination.schema(TEST_MOVIES_INDEX).await,
        Some(IndexSchema::genres(TEST_MOVIES_INDEX))
    );

    let progress = pipeline.progress();
    assert!(progress.completed_ids().await.unwrap().is_empty());
    assert_eq!(progress.watermark().await.unwrap(), None);
    assert!(!progress.is_running().await.unwrap());
}

#[tokio::test]
async fn invalid_rows_fail_the_cycle() {
    init_test_tracing();

    let source = MemorySource::new();
    source
        .insert_film_work(FilmWorkRow::new(Uuid::new_v4()), minutes_ago(5))
        .await;
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(2, source, MemoryStateStore::new(), destination.clone());

    let err = pipeline.run_cycle_with_retry().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(destination.total_calls().await, 0);
    assert!(!pipeline.progress().is_running().await.unwrap());
}

#[tokio::test]
async fn unusual_scalars_are_indexed_as_they_are() {
    init_test_tracing();

    let (rated, untitled) = (Uuid::new_v4(), Uuid::new_v4());
    let source = MemorySource::new();
    source
        .insert_film_work(
            FilmWorkRow {
                rating: Some(45.0),
                ..film_work(rated, "Rated on a hundred point scale")
            },
            minutes_ago(5),
        )
        .await;
    source
        .insert_film_work(
            FilmWorkRow {
                rating: None,
                ..film_work(untitled, "")
            },
            minutes_ago(5),
        )
        .await;
    source
        .insert_genre(genre(""), minutes_ago(5), Vec::<Uuid>::new())
        .await;
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(10, source, MemoryStateStore::new(), destination.clone());

    let outcome = pipeline.run_cycle_with_retry().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            film_works: 2,
            genres: 1
        }
    );
    let documents = destination.documents(TEST_MOVIES_INDEX).await;
    assert_eq!(documents[&rated]["imdb_rating"], json!(45.0));
    assert_eq!(documents[&untitled]["title"], json!(""));
    assert_eq!(documents[&untitled]["imdb_rating"], Value::Null);
}

#[tokio::test]
async fn transient_state_store_failure_is_retried() {
    init_test_tracing();

    let ids = sorted_ids(1);
    let source = source_with_film_works(&ids).await;
    let store = MemoryStateStore::new();
    store.set_unavailable(true).await;
    let pipeline = test_pipeline(2, source, store.clone(), MemoryDestination::new());

    let recovery = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set_unavailable(false).await;
    };
    let (outcome, ()) = tokio::join!(pipeline.run_cycle_with_retry(), recovery);

    assert!(matches!(
        outcome.unwrap(),
        CycleOutcome::Completed { film_works: 1, .. }
    ));
}

#[tokio::test]
async fn repeated_loads_leave_documents_unchanged() {
    init_test_tracing();

    let ids = sorted_ids(2);
    let source = source_with_film_works(&ids).await;
    let destination = MemoryDestination::new();

    // Fresh progress stores make both pipelines resync everything.
    test_pipeline(2, source.clone(), MemoryStateStore::new(), destination.clone())
        .run_cycle()
        .await
        .unwrap();
    let first = destination.documents(TEST_MOVIES_INDEX).await;
    test_pipeline(2, source, MemoryStateStore::new(), destination.clone())
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(destination.documents(TEST_MOVIES_INDEX).await, first);
    assert_eq!(destination.bulk_requests_for(TEST_MOVIES_INDEX).await.len(), 2);
}

#[tokio::test]
async fn null_aggregates_are_indexed_as_empty_lists() {
    init_test_tracing();

    let id = Uuid::new_v4();
    let source = MemorySource::new();
    let row = FilmWorkRow {
        title: Some("Solaris".to_string()),
        ..FilmWorkRow::new(id)
    };
    source.insert_film_work(row, minutes_ago(1)).await;
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(2, source, MemoryStateStore::new(), destination.clone());

    pipeline.run_cycle().await.unwrap();

    let stored = destination.documents(TEST_MOVIES_INDEX).await;
    let document: FilmWorkDocument = serde_json::from_value(stored[&id].clone()).unwrap();
    assert_eq!(document.title, "Solaris");
    assert!(document.actors.is_empty());
    assert!(document.genre.is_empty());
    assert!(document.directors.is_empty());
    assert_eq!(stored[&id]["writers_names"], json!([]));
}

#[tokio::test]
async fn transitive_changes_trigger_reindexing() {
    init_test_tracing();

    let ids = sorted_ids(3);
    let source = source_with_film_works(&ids).await;
    let person = Uuid::new_v4();
    source.insert_person(person, minutes_ago(30), [ids[1]]).await;
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(10, source.clone(), MemoryStateStore::new(), destination.clone());
    pipeline.run_cycle().await.unwrap();

    assert!(source.touch(ChangeOrigin::Person, person, Utc::now()).await);
    pipeline.run_cycle().await.unwrap();

    assert_eq!(
        destination.bulk_requests_for(TEST_MOVIES_INDEX).await,
        vec![ids.clone(), vec![ids[1]]]
    );
}

#[tokio::test]
async fn genres_are_resynced_every_cycle() {
    init_test_tracing();

    let source = MemorySource::new();
    for name in ["Comedy", "Drama", "Western"] {
        source
            .insert_genre(genre(name), minutes_ago(60), Vec::<Uuid>::new())
            .await;
    }
    let destination = MemoryDestination::new();
    let pipeline = test_pipeline(2, source, MemoryStateStore::new(), destination.clone());

    pipeline.run_cycle().await.unwrap();
    let outcome = pipeline.run_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Completed {
            film_works: 0,
            genres: 3
        }
    );
    assert_eq!(destination.documents(TEST_GENRES_INDEX).await.len(), 3);
    assert_eq!(destination.bulk_requests_for(TEST_GENRES_INDEX).await.len(), 4);
}

#[tokio::test]
async fn resolution_narrows_as_the_watermark_advances() {
    init_test_tracing();

    let source = MemorySource::new();
    let old = Uuid::new_v4();
    let recent = Uuid::new_v4();
    source
        .insert_film_work(film_work(old, "Old"), minutes_ago(60))
        .await;
    source
        .insert_film_work(film_work(recent, "Recent"), minutes_ago(5))
        .await;
    let none = BTreeSet::new();

    let all = resolve(&source, None, &none).await.unwrap();
    let since_t1 = resolve(&source, Some(minutes_ago(90)), &none).await.unwrap();
    let since_t2 = resolve(&source, Some(minutes_ago(30)), &none).await.unwrap();

    assert_eq!(all, BTreeSet::from([old, recent]));
    assert!(since_t2.is_subset(&since_t1));
    assert_eq!(since_t2, BTreeSet::from([recent]));
}

#[tokio::test]
async fn run_stops_when_shutdown_is_requested() {
    init_test_tracing();

    let source = source_with_film_works(&sorted_ids(1)).await;
    let store = MemoryStateStore::new();
    let pipeline = test_pipeline(2, source, store.clone(), MemoryDestination::new());
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let trigger = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.shutdown();
    };
    let (result, ()) = tokio::join!(pipeline.run(shutdown_rx), trigger);

    result.unwrap();
    let state = store.retrieve_state().await.unwrap();
    assert_eq!(state[IS_RUNNING_KEY], json!(false));
    assert!(pipeline.progress().watermark().await.unwrap().is_some());
}
