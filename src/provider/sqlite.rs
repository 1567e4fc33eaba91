//! Embedded file-backed provider (SQLite).
//!
//! One process-local store per logical database name, no networked pooling:
//! the pool is capped at a single connection and SQLite's own locking plus
//! WAL journaling serialize physical access. Callers must not assume true
//! parallel writers here.
//!
//! Nested subscription/usage groups are flattened into prefixed columns; see
//! [`crate::mapping`].

use crate::error::{StoreError, StoreResult};
use crate::mapping;
use crate::models::{
    Auth, QueryOutcome, QueryParam, QueryRequest, SqlStatement, Subscription,
    TransactionStatement, Usage, User, UserLookup, UserUpdate,
};
use crate::provider::{BackendKind, Handle, Provider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value as JsonValue, json};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

const CREATE_USERS: &str = "\
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    subscription_stripe_id TEXT,
    subscription_expires_at TEXT,
    subscription_status TEXT,
    usage_count INTEGER,
    usage_reset_at TEXT
)";

const CREATE_AUTH: &str = "\
CREATE TABLE IF NOT EXISTS auth (
    email TEXT PRIMARY KEY,
    password TEXT NOT NULL,
    user_id TEXT NOT NULL REFERENCES users(id)
)";

/// Embedded-store provider. Handles are cached per logical database name and
/// created single-flight.
pub struct SqliteProvider {
    data_dir: PathBuf,
    handles: RwLock<HashMap<String, Arc<OnceCell<Handle>>>>,
}

impl SqliteProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(name: &str, connection_string: Option<&str>) -> String {
        format!("{}|{}", name, connection_string.unwrap_or(""))
    }

    fn connect_options(
        &self,
        name: &str,
        connection_string: Option<&str>,
    ) -> StoreResult<SqliteConnectOptions> {
        let options = match connection_string {
            Some(conn) => {
                if !conn.to_ascii_lowercase().starts_with("sqlite:") {
                    return Err(StoreError::configuration(format!(
                        "Invalid SQLite connection string '{}': expected sqlite:path/to/db",
                        conn
                    )));
                }
                SqliteConnectOptions::from_str(conn)
                    .map_err(|e| StoreError::configuration(format!(
                        "Invalid SQLite connection string: {}",
                        e
                    )))?
            }
            None => {
                let path = self.data_dir.join(format!("{}.db", name));
                SqliteConnectOptions::new().filename(path)
            }
        };
        Ok(options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true))
    }

    async fn create_handle(
        &self,
        name: &str,
        connection_string: Option<&str>,
    ) -> StoreResult<Handle> {
        let options = self.connect_options(name, connection_string)?;
        debug!(database = %name, "Opening embedded store");

        // Single connection: the embedded store serializes access internally.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::connection(
                    format!("Failed to open embedded store '{}': {}", name, e),
                    "Check the data directory is writable",
                )
            })?;

        ensure_schema(&pool).await?;
        info!(database = %name, "Embedded store ready");
        Ok(Handle::Sqlite(pool))
    }
}

/// Idempotent DDL; safe to run repeatedly and concurrently.
async fn ensure_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(CREATE_USERS).execute(pool).await?;
    sqlx::query(CREATE_AUTH).execute(pool).await?;
    debug!("Embedded schema ensured");
    Ok(())
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        // SQLite has no native JSON type, store as text
        QueryParam::Json(v) => query.bind(v.to_string()),
    }
}

fn is_read_statement(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(first.as_str(), "SELECT" | "WITH" | "EXPLAIN" | "PRAGMA" | "VALUES")
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<User> {
    let stripe_id: Option<String> = row.try_get("subscription_stripe_id")?;
    let subscription = match stripe_id {
        Some(stripe_id) => Some(Subscription {
            stripe_id,
            expires_at: row.try_get("subscription_expires_at")?,
            status: row.try_get("subscription_status")?,
        }),
        None => None,
    };

    let usage_count: Option<i64> = row.try_get("usage_count")?;
    let usage = match usage_count {
        Some(count) => Some(Usage {
            count,
            reset_at: row.try_get("usage_reset_at")?,
        }),
        None => None,
    };

    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        subscription,
        usage,
    })
}

/// SET-clause fragments plus bind values for a tagged update. Shared shape
/// with the relational provider, but placeholders differ per dialect.
enum UpdateBind {
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
    Int(Option<i64>),
}

fn set_fields_binds(fields: &[crate::models::FieldUpdate]) -> (Vec<&'static str>, Vec<UpdateBind>) {
    use crate::models::FieldUpdate;

    let mut columns = Vec::new();
    let mut binds = Vec::new();
    for field in fields {
        match field {
            FieldUpdate::Name(name) => {
                columns.push("name");
                binds.push(UpdateBind::Text(Some(name.clone())));
            }
            FieldUpdate::Subscription(sub) => {
                // One atomic multi-column assignment for the whole group.
                columns.extend_from_slice(mapping::SUBSCRIPTION_COLUMNS);
                match sub {
                    Some(s) => {
                        binds.push(UpdateBind::Text(Some(s.stripe_id.clone())));
                        binds.push(UpdateBind::Timestamp(s.expires_at));
                        binds.push(UpdateBind::Text(s.status.clone()));
                    }
                    None => {
                        binds.push(UpdateBind::Text(None));
                        binds.push(UpdateBind::Timestamp(None));
                        binds.push(UpdateBind::Text(None));
                    }
                }
            }
            FieldUpdate::Usage(usage) => {
                columns.extend_from_slice(mapping::USAGE_COLUMNS);
                match usage {
                    Some(u) => {
                        binds.push(UpdateBind::Int(Some(u.count)));
                        binds.push(UpdateBind::Timestamp(u.reset_at));
                    }
                    None => {
                        binds.push(UpdateBind::Int(None));
                        binds.push(UpdateBind::Timestamp(None));
                    }
                }
            }
        }
    }
    (columns, binds)
}

impl SqliteProvider {
    async fn run_statement(
        &self,
        pool: &SqlitePool,
        statement: &SqlStatement,
    ) -> StoreResult<(JsonValue, u64)> {
        debug!(sql = %statement.query, params = statement.params.len(), "Executing statement");
        if is_read_statement(&statement.query) {
            let mut query = sqlx::query(&statement.query);
            for param in &statement.params {
                query = bind_param(query, param);
            }
            let rows = query.fetch_all(pool).await?;
            let json_rows: Vec<JsonValue> = rows
                .iter()
                .map(|r| JsonValue::Object(super::row::sqlite_row_to_json(r)))
                .collect();
            let count = json_rows.len() as u64;
            Ok((JsonValue::Array(json_rows), count))
        } else {
            let mut query = sqlx::query(&statement.query);
            for param in &statement.params {
                query = bind_param(query, param);
            }
            let result = query.execute(pool).await?;
            let affected = result.rows_affected();
            Ok((json!({ "rowsAffected": affected }), affected))
        }
    }

    async fn run_transaction(
        &self,
        pool: &SqlitePool,
        operations: &[TransactionStatement],
    ) -> StoreResult<(JsonValue, u64)> {
        let mut tx = pool.begin().await?;
        let mut results = Vec::with_capacity(operations.len());
        let mut total: u64 = 0;

        for (index, operation) in operations.iter().enumerate() {
            let statement = match operation {
                TransactionStatement::Sql(statement) => statement,
                TransactionStatement::Document(doc) => {
                    tx.rollback().await.ok();
                    return Err(StoreError::transaction(format!(
                        "operation {} failed: document operation '{}' is not supported on the sqlite backend",
                        index, doc.operation
                    )));
                }
            };

            let mut query = sqlx::query(&statement.query);
            for param in &statement.params {
                query = bind_param(query, param);
            }

            let step = if is_read_statement(&statement.query) {
                match query.fetch_all(&mut *tx).await {
                    Ok(rows) => {
                        let json_rows: Vec<JsonValue> = rows
                            .iter()
                            .map(|r| JsonValue::Object(super::row::sqlite_row_to_json(r)))
                            .collect();
                        total += json_rows.len() as u64;
                        json!({ "rows": json_rows })
                    }
                    Err(e) => {
                        tx.rollback().await.ok();
                        return Err(StoreError::transaction(format!(
                            "operation {} failed: {}",
                            index,
                            StoreError::from(e)
                        )));
                    }
                }
            } else {
                match query.execute(&mut *tx).await {
                    Ok(result) => {
                        let affected = result.rows_affected();
                        total += affected;
                        json!({ "rowsAffected": affected })
                    }
                    Err(e) => {
                        tx.rollback().await.ok();
                        return Err(StoreError::transaction(format!(
                            "operation {} failed: {}",
                            index,
                            StoreError::from(e)
                        )));
                    }
                }
            };
            results.push(step);
        }

        tx.commit().await?;
        Ok((JsonValue::Array(results), total))
    }
}

#[async_trait]
impl Provider for SqliteProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn initialize(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| {
                StoreError::configuration(format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ))
            })?;
        info!(data_dir = %self.data_dir.display(), "SQLite provider initialized");
        Ok(())
    }

    async fn database(&self, name: &str, connection_string: Option<&str>) -> StoreResult<Handle> {
        let key = Self::cache_key(name, connection_string);

        let cell = {
            let handles = self.handles.read().await;
            if let Some(cell) = handles.get(&key) {
                Arc::clone(cell)
            } else {
                drop(handles);
                let mut handles = self.handles.write().await;
                Arc::clone(
                    handles
                        .entry(key)
                        .or_insert_with(|| Arc::new(OnceCell::new())),
                )
            }
        };

        let handle = cell
            .get_or_try_init(|| self.create_handle(name, connection_string))
            .await?;
        Ok(handle.clone())
    }

    async fn find_user(
        &self,
        handle: &Handle,
        lookup: &UserLookup,
        _projection: Option<&[String]>,
    ) -> StoreResult<Option<User>> {
        // Projection is accepted for interface symmetry only; rows are always
        // read whole and reshaped into the nested form.
        let pool = handle.sqlite()?;
        let Some(key) = lookup.key() else {
            return Ok(None);
        };

        let query = match key {
            crate::models::UserKey::Id(id) => {
                sqlx::query("SELECT * FROM users WHERE id = ?1").bind(id.to_string())
            }
            crate::models::UserKey::Email(email) => {
                sqlx::query("SELECT * FROM users WHERE email = ?1").bind(email.to_string())
            }
        };

        match query.fetch_optional(pool).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert_user(&self, handle: &Handle, user: &User) -> StoreResult<String> {
        let pool = handle.sqlite()?;
        sqlx::query(
            "INSERT INTO users (id, email, name, created_at, subscription_stripe_id, \
             subscription_expires_at, subscription_status, usage_count, usage_reset_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.created_at)
        .bind(user.subscription.as_ref().map(|s| s.stripe_id.clone()))
        .bind(user.subscription.as_ref().and_then(|s| s.expires_at))
        .bind(user.subscription.as_ref().and_then(|s| s.status.clone()))
        .bind(user.usage.as_ref().map(|u| u.count))
        .bind(user.usage.as_ref().and_then(|u| u.reset_at))
        .execute(pool)
        .await?;
        Ok(user.id.clone())
    }

    async fn update_user(
        &self,
        handle: &Handle,
        id: &str,
        update: &UserUpdate,
    ) -> StoreResult<u64> {
        let pool = handle.sqlite()?;
        match update {
            UserUpdate::Increment { field, amount } => {
                // Absent prior value counts as zero.
                let sql = format!(
                    "UPDATE users SET {col} = COALESCE({col}, 0) + ?1 WHERE id = ?2",
                    col = field.column()
                );
                let result = sqlx::query(&sql).bind(amount).bind(id).execute(pool).await?;
                Ok(result.rows_affected())
            }
            UserUpdate::SetFields(fields) => {
                let (columns, binds) = set_fields_binds(fields);
                if columns.is_empty() {
                    return Ok(0);
                }
                let assignments: Vec<String> = columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| format!("{} = ?{}", col, i + 1))
                    .collect();
                let sql = format!(
                    "UPDATE users SET {} WHERE id = ?{}",
                    assignments.join(", "),
                    columns.len() + 1
                );
                let mut query = sqlx::query(&sql);
                for bind in binds {
                    query = match bind {
                        UpdateBind::Text(v) => query.bind(v),
                        UpdateBind::Timestamp(v) => query.bind(v),
                        UpdateBind::Int(v) => query.bind(v),
                    };
                }
                let result = query.bind(id).execute(pool).await?;
                Ok(result.rows_affected())
            }
        }
    }

    async fn find_auth(&self, handle: &Handle, email: &str) -> StoreResult<Option<Auth>> {
        let pool = handle.sqlite()?;
        let row = sqlx::query("SELECT email, password, user_id FROM auth WHERE email = ?1")
            .bind(email)
            .fetch_optional(pool)
            .await?;
        match row {
            Some(row) => Ok(Some(Auth {
                email: row.try_get("email")?,
                password: row.try_get("password")?,
                user_id: row.try_get("user_id")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_auth(&self, handle: &Handle, auth: &Auth) -> StoreResult<String> {
        let pool = handle.sqlite()?;
        sqlx::query("INSERT INTO auth (email, password, user_id) VALUES (?1, ?2, ?3)")
            .bind(&auth.email)
            .bind(&auth.password)
            .bind(&auth.user_id)
            .execute(pool)
            .await?;
        Ok(auth.email.clone())
    }

    async fn execute(&self, handle: &Handle, request: &QueryRequest) -> QueryOutcome {
        let started = Instant::now();
        let db_type = self.kind().db_type();

        let pool = match handle.sqlite() {
            Ok(pool) => pool,
            Err(e) => return QueryOutcome::failure(&e, started, db_type),
        };

        let result = match request {
            QueryRequest::Sql(sql) => {
                if let Some(transaction) = &sql.transaction {
                    let operations: Vec<TransactionStatement> = transaction
                        .iter()
                        .cloned()
                        .map(TransactionStatement::Sql)
                        .collect();
                    self.run_transaction(pool, &operations).await
                } else if let Some(query) = &sql.query {
                    self.run_statement(
                        pool,
                        &SqlStatement {
                            query: query.clone(),
                            params: sql.params.clone(),
                        },
                    )
                    .await
                } else {
                    Err(StoreError::configuration(
                        "SQL request needs a query or a transaction array",
                    ))
                }
            }
            QueryRequest::Document(doc) => Err(StoreError::unsupported_operation(format!(
                "document operation '{}' on the sqlite backend",
                doc.operation
            ))),
        };

        match result {
            Ok((data, count)) => QueryOutcome::success(data, count, started, db_type),
            Err(e) => QueryOutcome::failure(&e, started, db_type),
        }
    }

    async fn execute_transaction(
        &self,
        handle: &Handle,
        operations: &[TransactionStatement],
    ) -> QueryOutcome {
        let started = Instant::now();
        let db_type = self.kind().db_type();

        let pool = match handle.sqlite() {
            Ok(pool) => pool,
            Err(e) => return QueryOutcome::failure(&e, started, db_type),
        };

        match self.run_transaction(pool, operations).await {
            Ok((data, count)) => QueryOutcome::success(data, count, started, db_type),
            Err(e) => QueryOutcome::failure(&e, started, db_type),
        }
    }

    async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut handles = self.handles.write().await;
            handles.drain().collect()
        };
        for (key, cell) in drained {
            if let Some(Handle::Sqlite(pool)) = cell.get() {
                info!(database = %key, "Closing embedded store");
                pool.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_statement_detection() {
        assert!(is_read_statement("SELECT * FROM users"));
        assert!(is_read_statement("  select 1"));
        assert!(is_read_statement("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(is_read_statement("PRAGMA table_info(users)"));
        assert!(!is_read_statement("INSERT INTO users VALUES (1)"));
        assert!(!is_read_statement("UPDATE users SET name = 'x'"));
        assert!(!is_read_statement("DELETE FROM users"));
    }

    #[test]
    fn test_connect_options_rejects_foreign_scheme() {
        let provider = SqliteProvider::new("data");
        let err = provider
            .connect_options("app", Some("postgres://localhost/db"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Configuration { .. }));
    }

    #[test]
    fn test_set_fields_binds_group_columns() {
        use crate::models::FieldUpdate;

        let (columns, binds) = set_fields_binds(&[
            FieldUpdate::Name("Ada".into()),
            FieldUpdate::Usage(Some(Usage {
                count: 5,
                reset_at: None,
            })),
        ]);
        assert_eq!(columns, vec!["name", "usage_count", "usage_reset_at"]);
        assert_eq!(binds.len(), columns.len());
    }

    #[test]
    fn test_set_fields_clear_subscription_nulls_whole_group() {
        use crate::models::FieldUpdate;

        let (columns, _) = set_fields_binds(&[FieldUpdate::Subscription(None)]);
        assert_eq!(
            columns,
            vec![
                "subscription_stripe_id",
                "subscription_expires_at",
                "subscription_status"
            ]
        );
    }
}
