//! Integration tests for the embedded SQLite backend.
//!
//! Tests verify that:
//! - Users and auth records round-trip through the flattened schema
//! - The unique email constraint surfaces as a duplicate-key error
//! - Tagged updates (increments, group set/clear) behave as specified
//! - Ad hoc execute and transactions produce the uniform envelope
//! - Failed transactions roll back completely

use polystore::{
    FieldUpdate, QueryParam, QueryRequest, SqlStatement, StoreConfig, StoreError, StoreManager,
    Subscription, TransactionStatement, Usage, User, UserLookup, UserUpdate,
};
use polystore::models::Auth;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

async fn setup() -> (StoreManager, polystore::Handle, TempDir) {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::new(StoreConfig::with_data_dir(dir.path()));
    let handle = manager.database("sqlite", "app", None).await.unwrap();
    (manager, handle, dir)
}

fn sample_user(id: &str, email: &str) -> User {
    User::new(id, email, "Alice", Utc::now())
}

#[tokio::test]
async fn test_user_roundtrip_without_optional_groups() {
    let (manager, handle, _dir) = setup().await;

    let user = sample_user("u1", "alice@example.com");
    let id = manager.insert_user(&handle, &user).await.unwrap();
    assert_eq!(id, "u1");

    let found = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap()
        .expect("user should exist");
    assert_eq!(found.email, "alice@example.com");
    assert!(found.subscription.is_none());
    assert!(found.usage.is_none());

    let by_email = manager
        .find_user(&handle, &UserLookup::by_email("alice@example.com"), None)
        .await
        .unwrap()
        .expect("lookup by email should find the same user");
    assert_eq!(by_email.id, "u1");
}

#[tokio::test]
async fn test_empty_lookup_finds_nothing() {
    let (manager, handle, _dir) = setup().await;
    let result = manager
        .find_user(&handle, &UserLookup::default(), None)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_duplicate_email_rejected_and_original_kept() {
    let (manager, handle, _dir) = setup().await;

    manager
        .insert_user(&handle, &sample_user("u1", "taken@example.com"))
        .await
        .unwrap();

    let err = manager
        .insert_user(&handle, &sample_user("u2", "taken@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));

    // The original row must be untouched and the failed one absent.
    let original = manager
        .find_user(&handle, &UserLookup::by_email("taken@example.com"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.id, "u1");
    let missing = manager
        .find_user(&handle, &UserLookup::by_id("u2"), None)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_increment_treats_absent_usage_as_zero() {
    let (manager, handle, _dir) = setup().await;
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();

    let update = UserUpdate::increment("usage.count", 3).unwrap();
    let modified = manager.update_user(&handle, "u1", &update).await.unwrap();
    assert_eq!(modified, 1);

    let update = UserUpdate::increment("usage.count", 2).unwrap();
    manager.update_user(&handle, "u1", &update).await.unwrap();

    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.usage.expect("usage group should now exist").count, 5);
}

#[tokio::test]
async fn test_increment_of_missing_user_modifies_nothing() {
    let (manager, handle, _dir) = setup().await;
    let update = UserUpdate::increment("usage.count", 1).unwrap();
    let modified = manager
        .update_user(&handle, "ghost", &update)
        .await
        .unwrap();
    assert_eq!(modified, 0);
}

#[tokio::test]
async fn test_set_and_clear_subscription_group() {
    let (manager, handle, _dir) = setup().await;
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();

    let subscription = Subscription {
        stripe_id: "sub_123".into(),
        expires_at: None,
        status: Some("active".into()),
    };
    let update = UserUpdate::SetFields(vec![FieldUpdate::Subscription(Some(subscription))]);
    assert_eq!(manager.update_user(&handle, "u1", &update).await.unwrap(), 1);

    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap()
        .unwrap();
    let sub = user.subscription.expect("subscription group should be set");
    assert_eq!(sub.stripe_id, "sub_123");
    assert_eq!(sub.status.as_deref(), Some("active"));

    // Clearing nulls the whole group.
    let update = UserUpdate::SetFields(vec![FieldUpdate::Subscription(None)]);
    manager.update_user(&handle, "u1", &update).await.unwrap();
    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap()
        .unwrap();
    assert!(user.subscription.is_none());
}

#[tokio::test]
async fn test_set_usage_group_whole() {
    let (manager, handle, _dir) = setup().await;
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();

    let update = UserUpdate::SetFields(vec![FieldUpdate::Usage(Some(Usage {
        count: 7,
        reset_at: Some(Utc::now()),
    }))]);
    manager.update_user(&handle, "u1", &update).await.unwrap();

    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap()
        .unwrap();
    let usage = user.usage.unwrap();
    assert_eq!(usage.count, 7);
    assert!(usage.reset_at.is_some());
}

#[tokio::test]
async fn test_update_from_unknown_json_keys_is_a_noop() {
    let (manager, handle, _dir) = setup().await;
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();

    let payload = json!({ "role": "admin", "email": "evil@example.com" });
    let serde_json::Value::Object(map) = payload else {
        unreachable!()
    };
    let update = UserUpdate::set_from_json(&map);
    let modified = manager.update_user(&handle, "u1", &update).await.unwrap();
    assert_eq!(modified, 0);

    // Email untouched.
    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.email, "a@example.com");
}

#[tokio::test]
async fn test_auth_roundtrip_and_duplicate() {
    let (manager, handle, _dir) = setup().await;
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();

    let auth = Auth {
        email: "a@example.com".into(),
        password: "$argon2id$stored-hash".into(),
        user_id: "u1".into(),
    };
    let key = manager.insert_auth(&handle, &auth).await.unwrap();
    assert_eq!(key, "a@example.com");

    let found = manager
        .find_auth(&handle, "a@example.com")
        .await
        .unwrap()
        .expect("auth should exist");
    assert_eq!(found.password, "$argon2id$stored-hash");
    assert_eq!(found.user_id, "u1");

    let err = manager.insert_auth(&handle, &auth).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));

    assert!(manager.find_auth(&handle, "nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_execute_select_produces_success_envelope() {
    let (manager, handle, _dir) = setup().await;
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();
    manager
        .insert_user(&handle, &sample_user("u2", "b@example.com"))
        .await
        .unwrap();

    let request = QueryRequest::sql(
        "SELECT id, email FROM users WHERE email = ?1",
        vec![QueryParam::String("b@example.com".into())],
    );
    let outcome = manager.execute(&handle, &request).await;
    assert!(outcome.success);
    assert_eq!(outcome.row_count, Some(1));
    assert_eq!(outcome.metadata.db_type, "sqlite");

    let rows = outcome.data.unwrap();
    assert_eq!(rows[0]["id"], "u2");
}

#[tokio::test]
async fn test_execute_write_reports_rows_affected() {
    let (manager, handle, _dir) = setup().await;
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();

    let request = QueryRequest::sql(
        "DELETE FROM users WHERE id = ?1",
        vec![QueryParam::String("u1".into())],
    );
    let outcome = manager.execute(&handle, &request).await;
    assert!(outcome.success);
    assert_eq!(outcome.row_count, Some(1));
}

#[tokio::test]
async fn test_execute_bad_sql_captured_in_envelope() {
    let (manager, handle, _dir) = setup().await;
    let request = QueryRequest::sql("SELEKT oops", vec![]);
    let outcome = manager.execute(&handle, &request).await;
    assert!(!outcome.success);
    assert!(outcome.error.is_some());
    assert!(outcome.data.is_none());
    assert_eq!(outcome.metadata.db_type, "sqlite");
}

#[tokio::test]
async fn test_document_request_on_sql_backend_fails_in_envelope() {
    let (manager, handle, _dir) = setup().await;
    let request: QueryRequest = serde_json::from_value(json!({
        "collection": "users",
        "operation": "findOne",
        "query": { "email": "a@example.com" }
    }))
    .unwrap();
    let outcome = manager.execute(&handle, &request).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("findOne"));
}

#[tokio::test]
async fn test_transaction_commits_all_operations() {
    let (manager, handle, _dir) = setup().await;

    let now = Utc::now().to_rfc3339();
    let operations = vec![
        TransactionStatement::Sql(SqlStatement {
            query: "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)"
                .into(),
            params: vec![
                QueryParam::String("u1".into()),
                QueryParam::String("a@example.com".into()),
                QueryParam::String("Alice".into()),
                QueryParam::String(now.clone()),
            ],
        }),
        TransactionStatement::Sql(SqlStatement {
            query: "INSERT INTO auth (email, password, user_id) VALUES (?1, ?2, ?3)".into(),
            params: vec![
                QueryParam::String("a@example.com".into()),
                QueryParam::String("hash".into()),
                QueryParam::String("u1".into()),
            ],
        }),
    ];
    let outcome = manager.execute_transaction(&handle, &operations).await;
    assert!(outcome.success, "transaction failed: {:?}", outcome.error);
    assert_eq!(outcome.row_count, Some(2));

    assert!(manager.find_auth(&handle, "a@example.com").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_transaction_rolls_back_everything() {
    let (manager, handle, _dir) = setup().await;

    let now = Utc::now().to_rfc3339();
    let operations = vec![
        TransactionStatement::Sql(SqlStatement {
            query: "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)"
                .into(),
            params: vec![
                QueryParam::String("u1".into()),
                QueryParam::String("a@example.com".into()),
                QueryParam::String("Alice".into()),
                QueryParam::String(now),
            ],
        }),
        // References a user that does not exist; foreign keys are enforced.
        TransactionStatement::Sql(SqlStatement {
            query: "INSERT INTO auth (email, password, user_id) VALUES (?1, ?2, ?3)".into(),
            params: vec![
                QueryParam::String("a@example.com".into()),
                QueryParam::String("hash".into()),
                QueryParam::String("missing-user".into()),
            ],
        }),
    ];
    let outcome = manager.execute_transaction(&handle, &operations).await;
    assert!(!outcome.success);
    assert!(outcome.error.is_some());

    // The first insert must have been rolled back too.
    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn test_inline_sql_transaction_via_execute() {
    let (manager, handle, _dir) = setup().await;

    let request: QueryRequest = serde_json::from_value(json!({
        "transaction": [
            {
                "query": "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                "params": ["u1", "a@example.com", "Alice", Utc::now().to_rfc3339()]
            },
            {
                "query": "UPDATE users SET name = ?1 WHERE id = ?2",
                "params": ["Alicia", "u1"]
            }
        ]
    }))
    .unwrap();
    let outcome = manager.execute(&handle, &request).await;
    assert!(outcome.success, "transaction failed: {:?}", outcome.error);

    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.name, "Alicia");
}

#[tokio::test]
async fn test_close_all_then_reopen_same_database() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::new(StoreConfig::with_data_dir(dir.path()));

    let handle = manager.database("sqlite", "app", None).await.unwrap();
    manager
        .insert_user(&handle, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();
    assert_eq!(manager.handle_count().await, 1);

    manager.close_all().await;
    assert_eq!(manager.handle_count().await, 0);

    // Fresh handle, same file: data persists.
    let handle = manager.database("sqlite", "app", None).await.unwrap();
    let user = manager
        .find_user(&handle, &UserLookup::by_id("u1"), None)
        .await
        .unwrap();
    assert!(user.is_some());
}

#[tokio::test]
async fn test_alias_spellings_reach_the_same_store() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::new(StoreConfig::with_data_dir(dir.path()));

    let via_sqlite = manager.database("sqlite", "app", None).await.unwrap();
    manager
        .insert_user(&via_sqlite, &sample_user("u1", "a@example.com"))
        .await
        .unwrap();

    let via_alias = manager.database("SQLite3", "app", None).await.unwrap();
    let user = manager
        .find_user(&via_alias, &UserLookup::by_id("u1"), None)
        .await
        .unwrap();
    assert!(user.is_some(), "alias spelling should reach the same store");
    assert_eq!(manager.handle_count().await, 1);
}

#[tokio::test]
async fn test_database_files_created_under_data_dir() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::new(StoreConfig::with_data_dir(dir.path()));
    manager.database("sqlite", "billing", None).await.unwrap();
    assert!(dir.path().join("billing.db").exists());
}
