use sqlx::{Pool, Postgres};

use identity_eventstore::event::UniqueConstraintIntent;
use identity_eventstore::{Error, EventCommand, EventStore, PgEventStoreBuilder};

fn command(instance_id: &str, aggregate_id: &str, sequence: i64) -> EventCommand {
    EventCommand::new(
        instance_id.to_string(),
        "widget",
        aggregate_id.to_string(),
        "widget.added",
        serde_json::json!({}),
        instance_id.to_string(),
        "actor-1".to_string(),
    )
    .with_required_sequence(sequence)
}

#[sqlx::test]
async fn global_constraint_blocks_across_instances(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    let first = command("instance-a", "widget-1", 0).with_unique_constraint(UniqueConstraintIntent::Add {
        constraint_type: "widget.slug".to_string(),
        value: "acme".to_string(),
        error_message: "slug already taken".to_string(),
        instance_id: None,
    });
    store.push(vec![first]).await.unwrap();

    let second = command("instance-b", "widget-2", 0).with_unique_constraint(UniqueConstraintIntent::Add {
        constraint_type: "widget.slug".to_string(),
        value: "acme".to_string(),
        error_message: "slug already taken".to_string(),
        instance_id: None,
    });
    let err = store.push(vec![second]).await.unwrap_err();
    assert!(matches!(err, Error::UniqueConstraintViolation { .. }));
}

#[sqlx::test]
async fn instance_scoped_constraint_does_not_cross_instances(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    let first = command("instance-a", "widget-1", 0).with_unique_constraint(UniqueConstraintIntent::Add {
        constraint_type: "widget.slug".to_string(),
        value: "acme".to_string(),
        error_message: "slug already taken".to_string(),
        instance_id: Some("instance-a".to_string()),
    });
    store.push(vec![first]).await.unwrap();

    let second = command("instance-b", "widget-2", 0).with_unique_constraint(UniqueConstraintIntent::Add {
        constraint_type: "widget.slug".to_string(),
        value: "acme".to_string(),
        error_message: "slug already taken".to_string(),
        instance_id: Some("instance-b".to_string()),
    });
    store.push(vec![second]).await.unwrap();
}

#[sqlx::test]
async fn remove_then_readd_succeeds(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    let add = command("instance-a", "widget-1", 0).with_unique_constraint(UniqueConstraintIntent::Add {
        constraint_type: "widget.slug".to_string(),
        value: "acme".to_string(),
        error_message: "slug already taken".to_string(),
        instance_id: Some("instance-a".to_string()),
    });
    store.push(vec![add]).await.unwrap();

    let remove = command("instance-a", "widget-1", 1).with_unique_constraint(UniqueConstraintIntent::Remove {
        constraint_type: "widget.slug".to_string(),
        value: "acme".to_string(),
        instance_id: Some("instance-a".to_string()),
    });
    store.push(vec![remove]).await.unwrap();

    let readd = command("instance-a", "widget-2", 0).with_unique_constraint(UniqueConstraintIntent::Add {
        constraint_type: "widget.slug".to_string(),
        value: "acme".to_string(),
        error_message: "slug already taken".to_string(),
        instance_id: Some("instance-a".to_string()),
    });
    store.push(vec![readd]).await.unwrap();
}

#[sqlx::test]
async fn required_sequence_mismatch_is_a_concurrency_conflict(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    store.push(vec![command("instance-a", "widget-1", 0)]).await.unwrap();

    // The aggregate is now at version 1, but this command still expects 0.
    let err = store.push(vec![command("instance-a", "widget-1", 0)]).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ConcurrencyConflict {
            expected: 0,
            actual: 1,
            ..
        }
    ));
}

#[sqlx::test]
async fn versions_are_contiguous_and_never_reused(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();

    let events = store
        .push(vec![command("instance-a", "widget-1", 0), command("instance-a", "widget-1", 1)])
        .await
        .unwrap();

    assert_eq!(events[0].aggregate_version, 1);
    assert_eq!(events[1].aggregate_version, 2);

    store.push(vec![command("instance-a", "widget-1", 2)]).await.unwrap();
    let err = store.push(vec![command("instance-a", "widget-1", 0)]).await.unwrap_err();
    assert!(matches!(err, Error::ConcurrencyConflict { .. }));
}
