//! Data models shared by every backend.

pub mod entities;
pub mod envelope;
pub mod query;
pub mod update;

pub use entities::{Auth, Subscription, Usage, User, UserKey, UserLookup};
pub use envelope::{OutcomeMetadata, QueryOutcome};
pub use query::{
    DocumentRequest, DocumentStatement, DocumentVerb, QueryParam, QueryRequest, SqlRequest,
    SqlStatement, TransactionStatement,
};
pub use update::{CounterField, FieldUpdate, UserUpdate};
