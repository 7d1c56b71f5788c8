use sqlx::{Pool, Postgres};

use identity_eventstore::commands::org::add_org;
use identity_eventstore::commands::user::add_human_user;
use identity_eventstore::commands::webauthn::{add_webauthn_token, remove_webauthn_token, verify_webauthn_token};
use identity_eventstore::PgEventStoreBuilder;

use crate::support;

#[sqlx::test]
async fn full_lifecycle(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&ctx, &store, "Acme Corp").await.unwrap();
    let (user_id, _) = add_human_user(&ctx, &store, &org_id, "jdoe", "jdoe@example.com").await.unwrap();

    let (token_id, challenge, _) = add_webauthn_token(&ctx, &store, &user_id).await.unwrap();
    assert!(!challenge.is_empty());

    verify_webauthn_token(&ctx, &store, &user_id, &token_id, "key-1", "pubkey-bytes").await.unwrap();
    remove_webauthn_token(&ctx, &store, &user_id, &token_id).await.unwrap();
}

#[sqlx::test]
async fn verify_requires_not_ready_state(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&ctx, &store, "Acme Corp").await.unwrap();
    let (user_id, _) = add_human_user(&ctx, &store, &org_id, "jdoe", "jdoe@example.com").await.unwrap();

    let (token_id, _, _) = add_webauthn_token(&ctx, &store, &user_id).await.unwrap();
    verify_webauthn_token(&ctx, &store, &user_id, &token_id, "key-1", "pubkey-bytes").await.unwrap();

    let err = verify_webauthn_token(&ctx, &store, &user_id, &token_id, "key-1", "pubkey-bytes")
        .await
        .unwrap_err();
    assert_eq!(err.code, "COMMAND-WebAuthN10");
}

#[sqlx::test]
async fn remove_requires_ready_state(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&ctx, &store, "Acme Corp").await.unwrap();
    let (user_id, _) = add_human_user(&ctx, &store, &org_id, "jdoe", "jdoe@example.com").await.unwrap();

    let (token_id, _, _) = add_webauthn_token(&ctx, &store, &user_id).await.unwrap();

    let err = remove_webauthn_token(&ctx, &store, &user_id, &token_id).await.unwrap_err();
    assert_eq!(err.code, "COMMAND-WebAuthN20");
}

#[sqlx::test]
async fn sibling_tokens_on_the_same_user_do_not_interfere(pool: Pool<Postgres>) {
    let store = PgEventStoreBuilder::new(pool).try_build().await.unwrap();
    let ctx = support::ctx("instance-1", "actor-1", &["instance-1"]);
    let (org_id, _) = add_org(&ctx, &store, "Acme Corp").await.unwrap();
    let (user_id, _) = add_human_user(&ctx, &store, &org_id, "jdoe", "jdoe@example.com").await.unwrap();

    let (token_a, _, _) = add_webauthn_token(&ctx, &store, &user_id).await.unwrap();
    let (token_b, _, _) = add_webauthn_token(&ctx, &store, &user_id).await.unwrap();

    verify_webauthn_token(&ctx, &store, &user_id, &token_a, "key-a", "pubkey-a").await.unwrap();

    // token_b is still NOT_READY: verifying it independently must succeed.
    verify_webauthn_token(&ctx, &store, &user_id, &token_b, "key-b", "pubkey-b").await.unwrap();
}
