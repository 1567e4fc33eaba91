//! polystore: one persistence surface over three storage engines.
//!
//! The same logical operations (user and auth CRUD, ad hoc queries,
//! multi-step transactions) run unchanged against an embedded SQLite file, a
//! PostgreSQL server, or a MongoDB deployment. Backend-specific behavior is
//! confined to the provider implementations; callers select a backend by
//! name and get uniform results back.
//!
//! ```no_run
//! use polystore::{StoreConfig, StoreManager, UserLookup};
//!
//! # async fn run() -> polystore::StoreResult<()> {
//! let manager = StoreManager::new(StoreConfig::with_data_dir("data"));
//! let handle = manager.database("sqlite", "app", None).await?;
//! let user = manager
//!     .find_user(&handle, &UserLookup::by_email("a@b.c"), None)
//!     .await?;
//! assert!(user.is_none());
//! manager.close_all().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod mapping;
pub mod models;
pub mod provider;

pub use config::{PoolOptions, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use manager::StoreManager;
pub use models::{
    Auth, DocumentRequest, DocumentStatement, DocumentVerb, FieldUpdate, QueryOutcome,
    QueryParam, QueryRequest, SqlRequest, SqlStatement, Subscription, TransactionStatement,
    Usage, User, UserLookup, UserUpdate,
};
pub use provider::{BackendKind, Handle, Provider};
