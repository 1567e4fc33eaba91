//! Ad hoc query objects for `execute` / `execute_transaction`.
//!
//! Two wire shapes exist, matching the two families of backends:
//!
//! - SQL (relational/embedded): a parameterized statement plus an ordered
//!   parameter list, `{query, params, transaction?}`.
//! - Document: a collection, an operation verb and its operands,
//!   `{collection, operation, query?, update?, pipeline?, options?,
//!   transaction?}`.
//!
//! Deserialization is untagged; the presence of `collection` selects the
//! document shape.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{StoreError, StoreResult};

/// A parameter value for parameterized SQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Structured value (bound as JSON on PostgreSQL, text on SQLite)
    Json(JsonValue),
}

impl QueryParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Type name for debug logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

/// One SQL statement inside a request or transaction array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlStatement {
    pub query: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

/// A SQL request: a single statement, a transaction array, or both (the
/// transaction array wins when present).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub params: Vec<QueryParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Vec<SqlStatement>>,
}

/// Fixed verb set for document-store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentVerb {
    FindOne,
    FindMany,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Aggregate,
    Count,
    Distinct,
}

impl DocumentVerb {
    /// Parse a verb string. Unrecognized verbs yield
    /// [`StoreError::UnsupportedOperation`] naming the verb; `execute`
    /// captures that into the failure envelope rather than propagating it.
    pub fn parse(verb: &str) -> StoreResult<Self> {
        match verb {
            "findOne" => Ok(Self::FindOne),
            "find" | "findMany" => Ok(Self::FindMany),
            "insertOne" => Ok(Self::InsertOne),
            "insertMany" => Ok(Self::InsertMany),
            "updateOne" => Ok(Self::UpdateOne),
            "updateMany" => Ok(Self::UpdateMany),
            "deleteOne" => Ok(Self::DeleteOne),
            "deleteMany" => Ok(Self::DeleteMany),
            "aggregate" => Ok(Self::Aggregate),
            "count" => Ok(Self::Count),
            "distinct" => Ok(Self::Distinct),
            other => Err(StoreError::unsupported_operation(other)),
        }
    }

    /// True for verbs that only read.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::FindOne | Self::FindMany | Self::Aggregate | Self::Count | Self::Distinct
        )
    }
}

/// One document-store operation inside a request or transaction array.
///
/// The operation verb stays a string at the wire level so an unrecognized
/// verb can be echoed back in the failure envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStatement {
    pub collection: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,
}

/// A document-store request.
///
/// For `insertOne`/`insertMany` the document(s) travel in `query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub collection: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Vec<DocumentStatement>>,
}

impl DocumentRequest {
    /// View this request as a single transaction member.
    pub fn as_statement(&self) -> DocumentStatement {
        DocumentStatement {
            collection: self.collection.clone(),
            operation: self.operation.clone(),
            query: self.query.clone(),
            update: self.update.clone(),
            options: self.options.clone(),
        }
    }
}

/// A query object accepted by `execute`. `Document` is tried first during
/// deserialization because its `collection` field is required and
/// unambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryRequest {
    Document(DocumentRequest),
    Sql(SqlRequest),
}

impl QueryRequest {
    /// A single SQL statement.
    pub fn sql(query: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self::Sql(SqlRequest {
            query: Some(query.into()),
            params,
            transaction: None,
        })
    }

    /// A SQL transaction array.
    pub fn sql_transaction(statements: Vec<SqlStatement>) -> Self {
        Self::Sql(SqlRequest {
            query: None,
            params: Vec::new(),
            transaction: Some(statements),
        })
    }
}

/// A transaction member for `execute_transaction`: either family of
/// operation. SQL providers reject document members and vice versa, inside
/// the failure envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionStatement {
    Document(DocumentStatement),
    Sql(SqlStatement),
}
