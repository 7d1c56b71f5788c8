use sqlx::{Pool, Postgres};

use identity_eventstore::commands::oidc_app::add_oidc_app;
use identity_eventstore::event::EventCommand;
use identity_eventstore::{EventStore, PgEventStoreBuilder};

use crate::support;

const PROJECT_AGGREGATE_TYPE: &str = "project";

async fn add_active_project(store: &dyn EventStore, instance_id: &str, actor: &str) -> String {
    let project_id = format!("project-{actor}");
    let command = EventCommand::new(
        instance_id.to_string(),
        PROJECT_AGGREGATE_TYPE,
        project_id.clone(),
        "project.added",
        serde_json::json!({}),
        instance_id.to_string(),
        actor.to_string(),
    )
    .with_required_sequence(0);
    store.push(vec![command]).await.unwrap();
    project_id
}

#[sqlx::test]
async fn add_app_returns_one_time_client_secret(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let project_id = add_active_project(&store, "instance-1", "actor-1").await;

    let (created, details) = add_oidc_app(&ctx, &store, &project_id, "My App", &["https://example.com/callback".to_string()])
        .await
        .unwrap();

    assert_eq!(details.sequence, 1);
    assert!(!created.client_secret.is_empty());
    assert_ne!(created.app_id, created.client_id);
}

#[sqlx::test]
async fn empty_redirect_uris_is_rejected(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let project_id = add_active_project(&store, "instance-1", "actor-1").await;

    let err = add_oidc_app(&ctx, &store, &project_id, "My App", &[]).await.unwrap_err();
    assert_eq!(err.code, "COMMAND-App10");
}

#[sqlx::test]
async fn inactive_project_is_rejected(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);

    let err = add_oidc_app(&ctx, &store, "nonexistent-project", "My App", &["https://example.com/callback".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.code, "COMMAND-App11");
}

#[sqlx::test]
async fn empty_name_is_rejected(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let project_id = add_active_project(&store, "instance-1", "actor-1").await;

    let err = add_oidc_app(&ctx, &store, &project_id, "", &["https://example.com/callback".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.code, "COMMAND-App1");
}
