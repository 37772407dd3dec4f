//! Integration tests for `PgEventRepository`.
//!
//! Run with `cargo test -p hearth-event-store -- --ignored` against a
//! disposable PostgreSQL database named by `DATABASE_URL`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hearth_core::error::DomainError;
use hearth_core::repository::{EventRepository, StoredEvent};
use hearth_event_store::pg_event_repository::PgEventRepository;
use hearth_event_store::run_migrations;
use sqlx::PgPool;
use uuid::Uuid;

fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// A session event at `sequence_number`, one second after the previous one.
fn session_event(session_id: Uuid, sequence_number: i64) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::new_v4(),
        aggregate_id: session_id,
        event_type: "session.participant_joined".to_owned(),
        payload: serde_json::json!({ "participant_joined": { "participant_id": Uuid::new_v4() } }),
        sequence_number,
        correlation_id: Uuid::new_v4(),
        causation_id: Uuid::new_v4(),
        occurred_at: started_at() + Duration::seconds(sequence_number),
    }
}

fn stream(session_id: Uuid, positions: std::ops::RangeInclusive<i64>) -> Vec<StoredEvent> {
    positions.map(|n| session_event(session_id, n)).collect()
}

fn assert_conflict(result: Result<(), DomainError>, session_id: Uuid, expected: i64, actual: i64) {
    match result {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: e,
            actual: a,
        }) => {
            assert_eq!(aggregate_id, session_id);
            assert_eq!(e, expected);
            assert_eq!(a, actual);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_unknown_session_has_empty_stream(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let events = repo.load_events(Uuid::new_v4()).await.unwrap();

    assert!(events.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_appended_event_loads_with_every_field(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();
    let event = session_event(session_id, 1);

    // Act
    repo.append_events(session_id, 0, std::slice::from_ref(&event))
        .await
        .unwrap();

    // Assert
    assert_eq!(repo.load_events(session_id).await.unwrap(), vec![event]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_batches_accumulate_in_sequence_order(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();

    // Act
    repo.append_events(session_id, 0, &stream(session_id, 1..=3))
        .await
        .unwrap();
    repo.append_events(session_id, 3, &stream(session_id, 4..=5))
        .await
        .unwrap();

    // Assert
    let positions: Vec<i64> = repo
        .load_events(session_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.sequence_number)
        .collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_sessions_do_not_share_streams(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    repo.append_events(first, 0, &stream(first, 1..=2))
        .await
        .unwrap();
    repo.append_events(second, 0, &stream(second, 1..=1))
        .await
        .unwrap();

    let first_stream = repo.load_events(first).await.unwrap();
    let second_stream = repo.load_events(second).await.unwrap();
    assert_eq!(first_stream.len(), 2);
    assert_eq!(second_stream.len(), 1);
    assert!(first_stream.iter().all(|e| e.aggregate_id == first));
    assert_eq!(second_stream[0].aggregate_id, second);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_colliding_position_is_a_conflict(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();
    repo.append_events(session_id, 0, &stream(session_id, 1..=1))
        .await
        .unwrap();

    let result = repo
        .append_events(session_id, 0, &stream(session_id, 1..=1))
        .await;

    assert_conflict(result, session_id, 0, 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_stale_head_is_a_conflict_even_without_collision(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();
    repo.append_events(session_id, 0, &stream(session_id, 1..=2))
        .await
        .unwrap();

    // Positions 3-4 are free, but the writer decided against head 0.
    let result = repo
        .append_events(session_id, 0, &stream(session_id, 3..=4))
        .await;

    assert_conflict(result, session_id, 0, 2);
    assert_eq!(repo.load_events(session_id).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_empty_batch_writes_nothing(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();

    repo.append_events(session_id, 0, &[]).await.unwrap();

    assert!(repo.load_events(session_id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_nested_payload_and_microsecond_timestamp_survive(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();
    let mut event = session_event(session_id, 1);
    event.payload = serde_json::json!({
        "action_accepted": {
            "action": { "kind": "attack", "payload": { "target_id": Uuid::new_v4(), "weapon": null } },
            "advance": { "to": Uuid::new_v4(), "skipped": [], "turn_number": 2 },
            "turn_consuming": true
        }
    });
    event.occurred_at = started_at() + Duration::microseconds(123_456);

    // Act
    repo.append_events(session_id, 0, std::slice::from_ref(&event))
        .await
        .unwrap();

    // Assert
    let loaded = repo.load_events(session_id).await.unwrap();
    assert_eq!(loaded[0].payload, event.payload);
    assert_eq!(
        loaded[0].occurred_at.timestamp_micros(),
        event.occurred_at.timestamp_micros()
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_racing_appends_admit_exactly_one_writer(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.append_events(session_id, 0, &stream(session_id, 1..=1))
                .await
        }));
    }
    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => winners += 1,
            Err(DomainError::ConcurrencyConflict { actual, .. }) => assert_eq!(actual, 1),
            Err(other) => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(repo.load_events(session_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_failed_batch_writes_nothing(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let session_id = Uuid::new_v4();
    repo.append_events(session_id, 0, &stream(session_id, 1..=1))
        .await
        .unwrap();

    // The second event reuses a stored event id, so the batch rolls back.
    let mut colliding = session_event(session_id, 3);
    colliding.event_id = repo.load_events(session_id).await.unwrap()[0].event_id;
    let result = repo
        .append_events(session_id, 1, &[session_event(session_id, 2), colliding])
        .await;

    assert!(result.is_err());
    assert_eq!(repo.load_events(session_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires PostgreSQL via DATABASE_URL"]
async fn test_run_migrations_is_repeatable(pool: PgPool) {
    run_migrations(&pool).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let repo = PgEventRepository::new(pool);
    assert!(repo.load_events(Uuid::new_v4()).await.unwrap().is_empty());
}
