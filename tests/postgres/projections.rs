use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres};

use identity_eventstore::commands::org::add_org;
use identity_eventstore::error::Error;
use identity_eventstore::event::Event;
use identity_eventstore::projection::{tick, Projection, ProjectionEngine};
use identity_eventstore::PgEventStoreBuilder;
use std::sync::Arc;
use std::time::Duration;

use crate::support;

struct OrgCountProjection;

#[async_trait]
impl Projection for OrgCountProjection {
    fn name(&self) -> &str {
        "org_count"
    }

    fn event_types(&self) -> &[&'static str] {
        &["org.added"]
    }

    async fn reduce(&self, event: &Event, connection: &mut PgConnection) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO org_count (instance_id, count) VALUES ($1, 1)
             ON CONFLICT (instance_id) DO UPDATE SET count = org_count.count + 1",
        )
        .bind(&event.instance_id)
        .execute(connection)
        .await?;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str, connection: &mut PgConnection) -> Result<(), Error> {
        sqlx::query("DELETE FROM org_count WHERE instance_id = $1")
            .bind(instance_id)
            .execute(connection)
            .await?;
        Ok(())
    }
}

async fn create_projection_table(pool: &Pool<Postgres>) {
    sqlx::query("CREATE TABLE org_count (instance_id TEXT PRIMARY KEY, count BIGINT NOT NULL)")
        .execute(pool)
        .await
        .unwrap();
}

async fn read_count(pool: &Pool<Postgres>, instance_id: &str) -> Option<i64> {
    sqlx::query_scalar("SELECT count FROM org_count WHERE instance_id = $1")
        .bind(instance_id)
        .fetch_optional(pool)
        .await
        .unwrap()
}

#[sqlx::test]
async fn tick_applies_events_and_advances_the_checkpoint(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    create_projection_table(&pool).await;
    let projection = OrgCountProjection;

    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    add_org(&ctx, &store, "Acme Corp").await.unwrap();
    add_org(&ctx, &store, "Globex").await.unwrap();

    let applied = tick(&pool, &projection, "instance-1").await.unwrap();
    assert_eq!(applied, 2);
    assert_eq!(read_count(&pool, "instance-1").await, Some(2));

    // Nothing new since the checkpoint: the next tick is a no-op.
    let applied = tick(&pool, &projection, "instance-1").await.unwrap();
    assert_eq!(applied, 0);
    assert_eq!(read_count(&pool, "instance-1").await, Some(2));
}

#[sqlx::test]
async fn tick_only_advances_for_the_requested_instance(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    create_projection_table(&pool).await;
    let projection = OrgCountProjection;

    let ctx_a = support::ctx("instance-a", "actor-1", &["instance-a"]);
    let ctx_b = support::ctx("instance-b", "actor-1", &["instance-b"]);
    add_org(&ctx_a, &store, "Acme Corp").await.unwrap();
    add_org(&ctx_b, &store, "Globex").await.unwrap();

    tick(&pool, &projection, "instance-a").await.unwrap();

    assert_eq!(read_count(&pool, "instance-a").await, Some(1));
    assert_eq!(read_count(&pool, "instance-b").await, None);
}

#[sqlx::test]
async fn engine_drives_the_tick_loop_until_stopped(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool.clone()).try_build().await.unwrap();
    create_projection_table(&pool).await;

    let engine = ProjectionEngine::new(pool.clone(), vec![Arc::new(OrgCountProjection) as Arc<dyn Projection>]);
    let handles = engine.spawn_all("instance-1");

    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    add_org(&ctx, &store, "Acme Corp").await.unwrap();

    // No bus attached, so the loop only picks this up on its next timer tick.
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.stop();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(read_count(&pool, "instance-1").await, Some(1));
}
