//! # User Secret Service Tests
//!
//! User-scoped secrets: round trips, per-user isolation, the system-path
//! payload read, and aggregation.

mod common;

use common::*;
use secret_broker::crypto::EncryptContext;
use secret_broker::model::{
    Aggregate, CreateUserSecretParams, EnvelopeBundle, StatQuery,
};
use secret_broker::service::{ListUserSecretParams, UpdateUserSecretDataParams};

fn create_params(name: &str) -> CreateUserSecretParams {
    CreateUserSecretParams::new(name, data(&[("token", "abc")]))
}

#[tokio::test]
async fn test_plaintext_roundtrip() {
    let env = TestEnv::new(false);
    let ctx = user("d1", "u1");

    let created = env.users.create(&ctx, create_params("api")).await.unwrap();
    assert_eq!(created.user_id, "u1");
    assert!(created.user_secret_id.starts_with("user-secret-"));

    let fetched = env.users.get(&ctx, &created.user_secret_id).await.unwrap();
    assert_eq!(fetched.name, "api");

    let response = env
        .users
        .get_data(&system("d1"), &created.user_secret_id)
        .await
        .unwrap();
    assert!(!response.encrypted);
    assert_eq!(response.data.unwrap(), data(&[("token", "abc")]));
}

#[tokio::test]
async fn test_encrypted_roundtrip() {
    let env = TestEnv::new(true);
    let ctx = user("d1", "u1");
    let created = env.users.create(&ctx, create_params("enc")).await.unwrap();
    assert!(created.encrypted);

    let response = env
        .users
        .get_data(&system("d1"), &created.user_secret_id)
        .await
        .unwrap();
    let options = response.encrypt_options.unwrap();
    let bundle = EnvelopeBundle {
        encrypted_data: response.encrypted_data.unwrap(),
        nonce: options.nonce.clone().unwrap(),
    };
    let decrypted = env
        .engine
        .as_ref()
        .unwrap()
        .decrypt(
            &bundle,
            options.encrypt_data_key.as_deref().unwrap(),
            &EncryptContext::new("d1", &created.user_secret_id),
        )
        .await
        .unwrap();
    assert_eq!(decrypted, data(&[("token", "abc")]));
}

#[tokio::test]
async fn test_users_are_isolated() {
    let env = TestEnv::new(false);
    let owner = user("d1", "u1");
    let created = env.users.create(&owner, create_params("mine")).await.unwrap();

    let intruder = user("d1", "u2");
    let err = env
        .users
        .get(&intruder, &created.user_secret_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let err = env
        .users
        .delete(&intruder, &created.user_secret_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let (_, total) = env
        .users
        .list(&intruder, ListUserSecretParams::default())
        .await
        .unwrap();
    assert_eq!(total, 0);

    let (_, own_total) = env
        .users
        .list(&owner, ListUserSecretParams::default())
        .await
        .unwrap();
    assert_eq!(own_total, 1);
}

#[tokio::test]
async fn test_update_data_roundtrip() {
    let env = TestEnv::new(false);
    let ctx = user("d1", "u1");
    let created = env.users.create(&ctx, create_params("rotating")).await.unwrap();

    env.users
        .update_data(
            &ctx,
            UpdateUserSecretDataParams {
                user_secret_id: created.user_secret_id.clone(),
                data: data(&[("token", "xyz")]),
                schema_id: None,
                encrypted: None,
                encrypt_options: None,
            },
        )
        .await
        .unwrap();

    let response = env
        .users
        .get_data(&system("d1"), &created.user_secret_id)
        .await
        .unwrap();
    assert_eq!(response.data.unwrap(), data(&[("token", "xyz")]));
}

#[tokio::test]
async fn test_delete_removes_metadata_and_payload() {
    let env = TestEnv::new(false);
    let ctx = user("d1", "u1");
    let created = env.users.create(&ctx, create_params("gone")).await.unwrap();

    env.users.delete(&ctx, &created.user_secret_id).await.unwrap();
    assert!(!env.backend.contains(&created.user_secret_id));
    let err = env
        .users
        .get_data(&system("d1"), &created.user_secret_id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_stat_counts_own_records() {
    let env = TestEnv::new(false);
    let ctx = user("d1", "u1");
    env.users.create(&ctx, create_params("one")).await.unwrap();
    env.users.create(&ctx, create_params("two")).await.unwrap();
    env.users
        .create(&user("d1", "u2"), create_params("other"))
        .await
        .unwrap();

    let rows = env
        .users
        .stat(
            &ctx,
            StatQuery {
                filter: vec![],
                aggregate: Aggregate::Count {
                    name: "total".into(),
                },
            },
        )
        .await
        .unwrap();
    assert_eq!(rows, vec![serde_json::json!({"total": 2})]);
}
