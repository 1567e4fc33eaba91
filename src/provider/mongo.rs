//! Networked document provider (MongoDB).
//!
//! The only backend that stores the `subscription` and `usage` groups as
//! nested documents, honors field projections natively, and runs multi-step
//! transactions through driver sessions. Transient transaction errors and
//! unknown commit results are retried a bounded number of times.

use crate::config::PoolOptions;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Auth, DocumentStatement, DocumentVerb, QueryOutcome, QueryRequest, TransactionStatement,
    User, UserLookup, UserUpdate,
};
use crate::provider::{BackendKind, Handle, Provider, redact_connection_string};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document, doc, from_document, to_bson, to_document};
use mongodb::error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, ClientSession, Database, IndexModel};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// Networked document provider. Handles are cached per (database name,
/// connection string) and created single-flight.
pub struct MongoProvider {
    pool_options: PoolOptions,
    handles: RwLock<HashMap<String, Arc<OnceCell<Handle>>>>,
}

impl MongoProvider {
    pub fn new(pool_options: PoolOptions) -> Self {
        Self {
            pool_options,
            handles: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(name: &str, connection_string: &str) -> String {
        format!("{}|{}", name, connection_string)
    }

    async fn create_handle(&self, name: &str, connection_string: &str) -> StoreResult<Handle> {
        let lower = connection_string.to_ascii_lowercase();
        if !lower.starts_with("mongodb://") && !lower.starts_with("mongodb+srv://") {
            return Err(StoreError::configuration(
                "Invalid MongoDB connection string: expected mongodb:// or mongodb+srv://",
            ));
        }

        debug!(
            database = %name,
            url = %redact_connection_string(connection_string),
            "Connecting to MongoDB"
        );

        let mut options = ClientOptions::parse(connection_string).await.map_err(|e| {
            StoreError::configuration(format!("Invalid MongoDB connection string: {}", e))
        })?;
        options.max_pool_size = Some(self.pool_options.mongo_max_pool_size_or_default());
        options.server_selection_timeout =
            Some(self.pool_options.mongo_server_selection_timeout_or_default());

        let client = Client::with_options(options).map_err(|e| {
            StoreError::connection(
                format!("Failed to build MongoDB client: {}", e),
                "Check the connection string options",
            )
        })?;
        let db = client.database(name);

        ensure_schema(&db).await?;
        info!(database = %name, "MongoDB handle ready");
        Ok(Handle::Mongo(db))
    }
}

/// Idempotent: index creation is a no-op when the index already exists.
async fn ensure_schema(db: &Database) -> StoreResult<()> {
    for collection in ["users", "auth"] {
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        db.collection::<Document>(collection)
            .create_index(index)
            .await?;
    }
    debug!("MongoDB unique email indexes ensured");
    Ok(())
}

fn to_doc(value: &JsonValue, what: &str) -> StoreResult<Document> {
    to_document(value)
        .map_err(|e| StoreError::configuration(format!("Invalid {} document: {}", what, e)))
}

fn doc_to_json(doc: Document) -> JsonValue {
    Bson::Document(doc).into()
}

/// Wrap an operator-less update document in `$set` so a plain field map
/// replaces fields instead of the whole document.
fn wrap_update(update: Document) -> Document {
    if update.keys().any(|k| k.starts_with('$')) {
        update
    } else {
        doc! { "$set": update }
    }
}

fn filter_from(statement: &DocumentStatement) -> StoreResult<Document> {
    match &statement.query {
        Some(query) => to_doc(query, "filter"),
        None => Ok(Document::new()),
    }
}

fn opt_i64(options: Option<&JsonValue>, key: &str) -> Option<i64> {
    options.and_then(|o| o.get(key)).and_then(JsonValue::as_i64)
}

fn opt_u64(options: Option<&JsonValue>, key: &str) -> Option<u64> {
    options.and_then(|o| o.get(key)).and_then(JsonValue::as_u64)
}

fn opt_str<'a>(options: Option<&'a JsonValue>, key: &str) -> Option<&'a str> {
    options.and_then(|o| o.get(key)).and_then(JsonValue::as_str)
}

fn opt_doc(options: Option<&JsonValue>, key: &str) -> StoreResult<Option<Document>> {
    match options.and_then(|o| o.get(key)) {
        Some(value) => Ok(Some(to_doc(value, key)?)),
        None => Ok(None),
    }
}

/// Pipeline for an aggregate: the request-level `pipeline` field when
/// present, otherwise a stage array carried in `query`.
fn pipeline_from(
    statement: &DocumentStatement,
    pipeline: Option<&[JsonValue]>,
) -> StoreResult<Vec<Document>> {
    let stages: Vec<&JsonValue> = match (pipeline, &statement.query) {
        (Some(stages), _) => stages.iter().collect(),
        (None, Some(JsonValue::Array(stages))) => stages.iter().collect(),
        _ => {
            return Err(StoreError::configuration(
                "aggregate requires a pipeline array",
            ));
        }
    };
    stages
        .into_iter()
        .map(|s| to_doc(s, "pipeline stage"))
        .collect()
}

fn update_from(statement: &DocumentStatement) -> StoreResult<Document> {
    let update = statement
        .update
        .as_ref()
        .ok_or_else(|| StoreError::configuration("update operation requires an update document"))?;
    Ok(wrap_update(to_doc(update, "update")?))
}

/// Projection that keeps the identity fields so the result always
/// deserializes to a full entity.
fn user_projection(fields: &[String]) -> Document {
    let mut projection = doc! { "_id": 0, "id": 1, "email": 1, "name": 1, "created_at": 1 };
    for field in fields {
        projection.insert(field.as_str(), 1);
    }
    projection
}

/// Failure inside a session-bound operation. Driver errors keep their labels
/// so the transaction loop can classify transient ones.
enum TxFailure {
    Driver(mongodb::error::Error),
    Logic(StoreError),
}

impl From<mongodb::error::Error> for TxFailure {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Driver(err)
    }
}

impl MongoProvider {
    async fn run_statement(
        &self,
        db: &Database,
        statement: &DocumentStatement,
        pipeline: Option<&[JsonValue]>,
    ) -> StoreResult<(JsonValue, u64)> {
        let verb = DocumentVerb::parse(&statement.operation)?;
        let coll = db.collection::<Document>(&statement.collection);
        debug!(
            collection = %statement.collection,
            operation = %statement.operation,
            "Executing document operation"
        );

        match verb {
            DocumentVerb::FindOne => {
                let mut find = coll.find_one(filter_from(statement)?);
                if let Some(projection) = opt_doc(statement.options.as_ref(), "projection")? {
                    find = find.projection(projection);
                }
                match find.await? {
                    Some(doc) => Ok((doc_to_json(doc), 1)),
                    None => Ok((JsonValue::Null, 0)),
                }
            }
            DocumentVerb::FindMany => {
                let options = statement.options.as_ref();
                let mut find = coll.find(filter_from(statement)?);
                if let Some(limit) = opt_i64(options, "limit") {
                    find = find.limit(limit);
                }
                if let Some(skip) = opt_u64(options, "skip") {
                    find = find.skip(skip);
                }
                if let Some(sort) = opt_doc(options, "sort")? {
                    find = find.sort(sort);
                }
                if let Some(projection) = opt_doc(options, "projection")? {
                    find = find.projection(projection);
                }
                let docs: Vec<Document> = find.await?.try_collect().await?;
                let count = docs.len() as u64;
                let data = JsonValue::Array(docs.into_iter().map(doc_to_json).collect());
                Ok((data, count))
            }
            DocumentVerb::InsertOne => {
                let doc = statement
                    .query
                    .as_ref()
                    .ok_or_else(|| {
                        StoreError::configuration("insertOne requires a document in 'query'")
                    })
                    .and_then(|q| to_doc(q, "insert"))?;
                let result = coll.insert_one(doc).await?;
                Ok((json!({ "insertedId": JsonValue::from(result.inserted_id) }), 1))
            }
            DocumentVerb::InsertMany => {
                let JsonValue::Array(values) = statement.query.as_ref().ok_or_else(|| {
                    StoreError::configuration("insertMany requires a document array in 'query'")
                })?
                else {
                    return Err(StoreError::configuration(
                        "insertMany requires a document array in 'query'",
                    ));
                };
                let docs: Vec<Document> = values
                    .iter()
                    .map(|v| to_doc(v, "insert"))
                    .collect::<StoreResult<_>>()?;
                let result = coll.insert_many(docs).await?;
                let count = result.inserted_ids.len() as u64;
                Ok((json!({ "insertedCount": count }), count))
            }
            DocumentVerb::UpdateOne => {
                let result = coll
                    .update_one(filter_from(statement)?, update_from(statement)?)
                    .await?;
                Ok((
                    json!({
                        "matchedCount": result.matched_count,
                        "modifiedCount": result.modified_count
                    }),
                    result.modified_count,
                ))
            }
            DocumentVerb::UpdateMany => {
                let result = coll
                    .update_many(filter_from(statement)?, update_from(statement)?)
                    .await?;
                Ok((
                    json!({
                        "matchedCount": result.matched_count,
                        "modifiedCount": result.modified_count
                    }),
                    result.modified_count,
                ))
            }
            DocumentVerb::DeleteOne => {
                let result = coll.delete_one(filter_from(statement)?).await?;
                Ok((
                    json!({ "deletedCount": result.deleted_count }),
                    result.deleted_count,
                ))
            }
            DocumentVerb::DeleteMany => {
                let result = coll.delete_many(filter_from(statement)?).await?;
                Ok((
                    json!({ "deletedCount": result.deleted_count }),
                    result.deleted_count,
                ))
            }
            DocumentVerb::Aggregate => {
                let stages = pipeline_from(statement, pipeline)?;
                let docs: Vec<Document> = coll.aggregate(stages).await?.try_collect().await?;
                let count = docs.len() as u64;
                let data = JsonValue::Array(docs.into_iter().map(doc_to_json).collect());
                Ok((data, count))
            }
            DocumentVerb::Count => {
                let count = coll.count_documents(filter_from(statement)?).await?;
                Ok((json!({ "count": count }), count))
            }
            DocumentVerb::Distinct => {
                let field = opt_str(statement.options.as_ref(), "field").ok_or_else(|| {
                    StoreError::configuration("distinct requires options.field")
                })?;
                let values = coll.distinct(field, filter_from(statement)?).await?;
                let count = values.len() as u64;
                let data = JsonValue::Array(values.into_iter().map(JsonValue::from).collect());
                Ok((data, count))
            }
        }
    }

    async fn run_session_statement(
        &self,
        db: &Database,
        session: &mut ClientSession,
        statement: &DocumentStatement,
    ) -> Result<(JsonValue, u64), TxFailure> {
        let verb = DocumentVerb::parse(&statement.operation).map_err(TxFailure::Logic)?;
        let coll = db.collection::<Document>(&statement.collection);

        match verb {
            DocumentVerb::FindOne => {
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                match coll.find_one(filter).session(&mut *session).await? {
                    Some(doc) => Ok((doc_to_json(doc), 1)),
                    None => Ok((JsonValue::Null, 0)),
                }
            }
            DocumentVerb::FindMany => {
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                let mut cursor = coll.find(filter).session(&mut *session).await?;
                let mut docs = Vec::new();
                while let Some(doc) = cursor.next(&mut *session).await {
                    docs.push(doc?);
                }
                let count = docs.len() as u64;
                let data = JsonValue::Array(docs.into_iter().map(doc_to_json).collect());
                Ok((data, count))
            }
            DocumentVerb::InsertOne => {
                let doc = statement
                    .query
                    .as_ref()
                    .ok_or_else(|| {
                        StoreError::configuration("insertOne requires a document in 'query'")
                    })
                    .and_then(|q| to_doc(q, "insert"))
                    .map_err(TxFailure::Logic)?;
                let result = coll.insert_one(doc).session(&mut *session).await?;
                Ok((json!({ "insertedId": JsonValue::from(result.inserted_id) }), 1))
            }
            DocumentVerb::InsertMany => {
                let values = match statement.query.as_ref() {
                    Some(JsonValue::Array(values)) => values,
                    _ => {
                        return Err(TxFailure::Logic(StoreError::configuration(
                            "insertMany requires a document array in 'query'",
                        )));
                    }
                };
                let docs: Vec<Document> = values
                    .iter()
                    .map(|v| to_doc(v, "insert"))
                    .collect::<StoreResult<_>>()
                    .map_err(TxFailure::Logic)?;
                let result = coll.insert_many(docs).session(&mut *session).await?;
                let count = result.inserted_ids.len() as u64;
                Ok((json!({ "insertedCount": count }), count))
            }
            DocumentVerb::UpdateOne => {
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                let update = update_from(statement).map_err(TxFailure::Logic)?;
                let result = coll
                    .update_one(filter, update)
                    .session(&mut *session)
                    .await?;
                Ok((
                    json!({
                        "matchedCount": result.matched_count,
                        "modifiedCount": result.modified_count
                    }),
                    result.modified_count,
                ))
            }
            DocumentVerb::UpdateMany => {
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                let update = update_from(statement).map_err(TxFailure::Logic)?;
                let result = coll
                    .update_many(filter, update)
                    .session(&mut *session)
                    .await?;
                Ok((
                    json!({
                        "matchedCount": result.matched_count,
                        "modifiedCount": result.modified_count
                    }),
                    result.modified_count,
                ))
            }
            DocumentVerb::DeleteOne => {
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                let result = coll.delete_one(filter).session(&mut *session).await?;
                Ok((
                    json!({ "deletedCount": result.deleted_count }),
                    result.deleted_count,
                ))
            }
            DocumentVerb::DeleteMany => {
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                let result = coll.delete_many(filter).session(&mut *session).await?;
                Ok((
                    json!({ "deletedCount": result.deleted_count }),
                    result.deleted_count,
                ))
            }
            DocumentVerb::Aggregate => {
                let stages = pipeline_from(statement, None).map_err(TxFailure::Logic)?;
                let mut cursor = coll.aggregate(stages).session(&mut *session).await?;
                let mut docs = Vec::new();
                while let Some(doc) = cursor.next(&mut *session).await {
                    docs.push(doc?);
                }
                let count = docs.len() as u64;
                let data = JsonValue::Array(docs.into_iter().map(doc_to_json).collect());
                Ok((data, count))
            }
            DocumentVerb::Count => {
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                let count = coll
                    .count_documents(filter)
                    .session(&mut *session)
                    .await?;
                Ok((json!({ "count": count }), count))
            }
            DocumentVerb::Distinct => {
                let field = opt_str(statement.options.as_ref(), "field").ok_or_else(|| {
                    TxFailure::Logic(StoreError::configuration("distinct requires options.field"))
                })?;
                let filter = filter_from(statement).map_err(TxFailure::Logic)?;
                let values = coll
                    .distinct(field, filter)
                    .session(&mut *session)
                    .await?;
                let count = values.len() as u64;
                let data = JsonValue::Array(values.into_iter().map(JsonValue::from).collect());
                Ok((data, count))
            }
        }
    }

    /// All-or-nothing batch through one session. Transient transaction errors
    /// restart the whole batch; an unknown commit result retries the commit.
    /// Both retries are bounded.
    async fn run_transaction(
        &self,
        db: &Database,
        operations: &[TransactionStatement],
    ) -> StoreResult<(JsonValue, u64)> {
        let mut session = db.client().start_session().await?;
        let mut attempt: u32 = 0;

        'transaction: loop {
            attempt += 1;
            session.start_transaction().await?;

            let mut results = Vec::with_capacity(operations.len());
            let mut total: u64 = 0;

            for (index, operation) in operations.iter().enumerate() {
                let statement = match operation {
                    TransactionStatement::Document(statement) => statement,
                    TransactionStatement::Sql(_) => {
                        session.abort_transaction().await.ok();
                        return Err(StoreError::transaction(format!(
                            "operation {} failed: SQL statement is not supported on the mongodb backend",
                            index
                        )));
                    }
                };

                match self
                    .run_session_statement(db, &mut session, statement)
                    .await
                {
                    Ok((data, count)) => {
                        total += count;
                        results.push(data);
                    }
                    Err(TxFailure::Driver(e)) => {
                        session.abort_transaction().await.ok();
                        if e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                            && attempt < MAX_TRANSACTION_ATTEMPTS
                        {
                            warn!(attempt, "Transient transaction error, retrying");
                            continue 'transaction;
                        }
                        return Err(StoreError::transaction(format!(
                            "operation {} failed: {}",
                            index,
                            StoreError::from(e)
                        )));
                    }
                    Err(TxFailure::Logic(e)) => {
                        session.abort_transaction().await.ok();
                        return Err(StoreError::transaction(format!(
                            "operation {} failed: {}",
                            index, e
                        )));
                    }
                }
            }

            let mut commit_attempt: u32 = 0;
            loop {
                commit_attempt += 1;
                match session.commit_transaction().await {
                    Ok(()) => return Ok((JsonValue::Array(results), total)),
                    Err(e)
                        if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                            && commit_attempt < MAX_TRANSACTION_ATTEMPTS =>
                    {
                        warn!(commit_attempt, "Unknown commit result, retrying commit");
                    }
                    Err(e)
                        if e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                            && attempt < MAX_TRANSACTION_ATTEMPTS =>
                    {
                        warn!(attempt, "Transient error at commit, retrying transaction");
                        continue 'transaction;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}

#[async_trait]
impl Provider for MongoProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Mongo
    }

    async fn initialize(&self) -> StoreResult<()> {
        debug!("MongoDB provider initialized");
        Ok(())
    }

    async fn database(&self, name: &str, connection_string: Option<&str>) -> StoreResult<Handle> {
        let connection_string = connection_string.ok_or_else(|| {
            StoreError::configuration(format!(
                "MongoDB database '{}' requires a connection string",
                name
            ))
        })?;
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
        projection: Option<&[String]>,
    ) -> StoreResult<Option<User>> {
        let db = handle.mongo()?;
        let Some(key) = lookup.key() else {
            return Ok(None);
        };

        let filter = match key {
            crate::models::UserKey::Id(id) => doc! { "id": id },
            crate::models::UserKey::Email(email) => doc! { "email": email },
        };

        let coll = db.collection::<Document>("users");
        let mut find = coll.find_one(filter);
        if let Some(fields) = projection {
            find = find.projection(user_projection(fields));
        }

        match find.await? {
            Some(doc) => {
                let user = from_document(doc)
                    .map_err(|e| StoreError::internal(format!("Malformed user document: {}", e)))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn insert_user(&self, handle: &Handle, user: &User) -> StoreResult<String> {
        let db = handle.mongo()?;
        let doc = to_document(user)
            .map_err(|e| StoreError::internal(format!("Failed to serialize user: {}", e)))?;
        db.collection::<Document>("users").insert_one(doc).await?;
        Ok(user.id.clone())
    }

    async fn update_user(
        &self,
        handle: &Handle,
        id: &str,
        update: &UserUpdate,
    ) -> StoreResult<u64> {
        let db = handle.mongo()?;
        let coll = db.collection::<Document>("users");

        match update {
            UserUpdate::Increment { field, amount } => {
                // $inc treats an absent field as zero.
                let result = coll
                    .update_one(doc! { "id": id }, doc! { "$inc": { field.logical(): *amount } })
                    .await?;
                Ok(result.modified_count)
            }
            UserUpdate::SetFields(fields) => {
                use crate::models::FieldUpdate;

                let mut set = Document::new();
                let mut unset = Document::new();
                for field in fields {
                    match field {
                        FieldUpdate::Name(name) => {
                            set.insert("name", name.as_str());
                        }
                        FieldUpdate::Subscription(Some(sub)) => {
                            let value = to_bson(sub).map_err(|e| {
                                StoreError::internal(format!(
                                    "Failed to serialize subscription: {}",
                                    e
                                ))
                            })?;
                            set.insert("subscription", value);
                        }
                        FieldUpdate::Subscription(None) => {
                            unset.insert("subscription", "");
                        }
                        FieldUpdate::Usage(Some(usage)) => {
                            let value = to_bson(usage).map_err(|e| {
                                StoreError::internal(format!("Failed to serialize usage: {}", e))
                            })?;
                            set.insert("usage", value);
                        }
                        FieldUpdate::Usage(None) => {
                            unset.insert("usage", "");
                        }
                    }
                }

                let mut update_doc = Document::new();
                if !set.is_empty() {
                    update_doc.insert("$set", set);
                }
                if !unset.is_empty() {
                    update_doc.insert("$unset", unset);
                }
                if update_doc.is_empty() {
                    return Ok(0);
                }

                let result = coll.update_one(doc! { "id": id }, update_doc).await?;
                Ok(result.modified_count)
            }
        }
    }

    async fn find_auth(&self, handle: &Handle, email: &str) -> StoreResult<Option<Auth>> {
        let db = handle.mongo()?;
        let doc = db
            .collection::<Document>("auth")
            .find_one(doc! { "email": email })
            .await?;
        match doc {
            Some(doc) => {
                let auth = from_document(doc)
                    .map_err(|e| StoreError::internal(format!("Malformed auth document: {}", e)))?;
                Ok(Some(auth))
            }
            None => Ok(None),
        }
    }

    async fn insert_auth(&self, handle: &Handle, auth: &Auth) -> StoreResult<String> {
        let db = handle.mongo()?;
        let doc = to_document(auth)
            .map_err(|e| StoreError::internal(format!("Failed to serialize auth: {}", e)))?;
        db.collection::<Document>("auth").insert_one(doc).await?;
        Ok(auth.email.clone())
    }

    async fn execute(&self, handle: &Handle, request: &QueryRequest) -> QueryOutcome {
        let started = Instant::now();
        let db_type = self.kind().db_type();

        let db = match handle.mongo() {
            Ok(db) => db,
            Err(e) => return QueryOutcome::failure(&e, started, db_type),
        };

        let result = match request {
            QueryRequest::Document(doc) => {
                if let Some(transaction) = &doc.transaction {
                    let operations: Vec<TransactionStatement> = transaction
                        .iter()
                        .cloned()
                        .map(TransactionStatement::Document)
                        .collect();
                    self.run_transaction(db, &operations).await
                } else {
                    self.run_statement(db, &doc.as_statement(), doc.pipeline.as_deref())
                        .await
                }
            }
            QueryRequest::Sql(_) => Err(StoreError::unsupported_operation(
                "SQL query on the mongodb backend",
            )),
        };

        match result {
            Ok((data, count)) => QueryOutcome::success(data, count, started, db_type),
            Err(e) => {
                warn!(error = %e, "Document operation failed");
                QueryOutcome::failure(&e, started, db_type)
            }
        }
    }

    async fn execute_transaction(
        &self,
        handle: &Handle,
        operations: &[TransactionStatement],
    ) -> QueryOutcome {
        let started = Instant::now();
        let db_type = self.kind().db_type();

        let db = match handle.mongo() {
            Ok(db) => db,
            Err(e) => return QueryOutcome::failure(&e, started, db_type),
        };

        match self.run_transaction(db, operations).await {
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
            if let Some(Handle::Mongo(db)) = cell.get() {
                info!(database = %key, "Shutting down MongoDB client");
                db.client().clone().shutdown().await;
            }
        }
    }
}
