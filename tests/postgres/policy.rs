use sqlx::{Pool, Postgres};

use identity_eventstore::commands::org::add_org;
use identity_eventstore::commands::policy::{add_login_policy, remove_login_policy};
use identity_eventstore::PgEventStoreBuilder;

use crate::support;

#[sqlx::test]
async fn add_then_remove_reverts_to_default(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let setup_ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&setup_ctx, &store, "Acme Corp").await.unwrap();

    // The login_policy permission check is scoped to the org id, only known after creation.
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1", &org_id]);

    add_login_policy(&ctx, &store, &org_id, false, true).await.unwrap();
    remove_login_policy(&ctx, &store, &org_id).await.unwrap();

    // The default is restored, so a fresh add is allowed again.
    add_login_policy(&ctx, &store, &org_id, true, false).await.unwrap();
}

#[sqlx::test]
async fn adding_a_second_custom_policy_is_rejected(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let setup_ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&setup_ctx, &store, "Acme Corp").await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1", &org_id]);

    add_login_policy(&ctx, &store, &org_id, false, true).await.unwrap();

    let err = add_login_policy(&ctx, &store, &org_id, true, true).await.unwrap_err();
    assert_eq!(err.code, "COMMAND-LoginPolicy10");
}

#[sqlx::test]
async fn removing_a_default_policy_is_rejected(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let setup_ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&setup_ctx, &store, "Acme Corp").await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1", &org_id]);

    let err = remove_login_policy(&ctx, &store, &org_id).await.unwrap_err();
    assert_eq!(err.code, "COMMAND-LoginPolicy20");
}
