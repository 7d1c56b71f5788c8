use sqlx::{Pool, Postgres};

use identity_eventstore::commands::auth_request::{add_auth_request, check_password, select_user, succeed_auth_request};
use identity_eventstore::PgEventStoreBuilder;

use crate::support;

#[sqlx::test]
async fn full_flow_to_success(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);

    let (auth_request_id, _) = add_auth_request(&ctx, &store).await.unwrap();
    select_user(&ctx, &store, &auth_request_id, "user-1").await.unwrap();
    check_password(&ctx, &store, &auth_request_id, "a-long-enough-password").await.unwrap();

    let (auth_code, details) = succeed_auth_request(&ctx, &store, &auth_request_id, "code").await.unwrap();
    assert!(!auth_code.is_empty());
    assert_eq!(details.sequence, 4);
}

#[sqlx::test]
async fn too_short_password_does_not_advance_state(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);

    let (auth_request_id, _) = add_auth_request(&ctx, &store).await.unwrap();
    select_user(&ctx, &store, &auth_request_id, "user-1").await.unwrap();

    // A too-short password still succeeds at the command level (a failure event is recorded)...
    check_password(&ctx, &store, &auth_request_id, "short").await.unwrap();

    // ...but the write-model never reached PASSWORD_CHECKED, so succeeding is still rejected.
    let err = succeed_auth_request(&ctx, &store, &auth_request_id, "code").await.unwrap_err();
    assert_eq!(err.code, "COMMAND-Auth41");
}

#[sqlx::test]
async fn succeeding_twice_is_rejected(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);

    let (auth_request_id, _) = add_auth_request(&ctx, &store).await.unwrap();
    select_user(&ctx, &store, &auth_request_id, "user-1").await.unwrap();
    check_password(&ctx, &store, &auth_request_id, "a-long-enough-password").await.unwrap();
    succeed_auth_request(&ctx, &store, &auth_request_id, "code").await.unwrap();

    let err = succeed_auth_request(&ctx, &store, &auth_request_id, "code").await.unwrap_err();
    assert_eq!(err.code, "COMMAND-Auth41");
}

#[sqlx::test]
async fn select_user_requires_added_state(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);

    let (auth_request_id, _) = add_auth_request(&ctx, &store).await.unwrap();
    select_user(&ctx, &store, &auth_request_id, "user-1").await.unwrap();

    let err = select_user(&ctx, &store, &auth_request_id, "user-2").await.unwrap_err();
    assert_eq!(err.code, "COMMAND-Auth20");
}
