use sqlx::{Pool, Postgres};

use identity_eventstore::commands::org::add_org;
use identity_eventstore::commands::user::{add_human_user, remove_user};
use identity_eventstore::{Error, PgEventStoreBuilder};

use crate::support;

#[sqlx::test]
async fn add_then_remove_releases_username_and_email(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&ctx, &store, "Acme Corp").await.unwrap();

    let (user_id, _) = add_human_user(&ctx, &store, &org_id, "jdoe", "jdoe@example.com").await.unwrap();

    let err = add_human_user(&ctx, &store, &org_id, "jdoe", "other@example.com").await.unwrap_err();
    assert_eq!(err.code, "COMMAND-User11");

    let err = add_human_user(&ctx, &store, &org_id, "other", "jdoe@example.com").await.unwrap_err();
    assert_eq!(err.code, "COMMAND-User12");

    remove_user(&ctx, &store, &user_id).await.unwrap();

    // Both constraints are free again after removal.
    add_human_user(&ctx, &store, &org_id, "jdoe", "jdoe@example.com").await.unwrap();
}

#[sqlx::test]
async fn username_and_email_are_unique_per_instance_not_globally(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx_a = support::ctx("instance-a", "actor-1", &["instance-a"]);
    let ctx_b = support::ctx("instance-b", "actor-1", &["instance-b"]);
    let (org_a, _) = add_org(&ctx_a, &store, "Acme A").await.unwrap();
    let (org_b, _) = add_org(&ctx_b, &store, "Acme B").await.unwrap();

    add_human_user(&ctx_a, &store, &org_a, "jdoe", "jdoe@example.com").await.unwrap();

    // Same username/email, different instance: must not collide.
    add_human_user(&ctx_b, &store, &org_b, "jdoe", "jdoe@example.com").await.unwrap();
}

#[sqlx::test]
async fn remove_of_already_removed_user_is_not_found(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&ctx, &store, "Acme Corp").await.unwrap();
    let (user_id, _) = add_human_user(&ctx, &store, &org_id, "jdoe", "jdoe@example.com").await.unwrap();

    remove_user(&ctx, &store, &user_id).await.unwrap();

    let err = remove_user(&ctx, &store, &user_id).await.unwrap_err();
    assert_eq!(err.code, "COMMAND-User10");
    assert!(matches!(err.source, Error::NotFound(_)));
}

#[sqlx::test]
async fn empty_username_or_email_is_rejected(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&ctx, &store, "Acme Corp").await.unwrap();

    let err = add_human_user(&ctx, &store, &org_id, "", "jdoe@example.com").await.unwrap_err();
    assert_eq!(err.code, "COMMAND-User1");

    let err = add_human_user(&ctx, &store, &org_id, "jdoe", "").await.unwrap_err();
    assert_eq!(err.code, "COMMAND-User2");
}
