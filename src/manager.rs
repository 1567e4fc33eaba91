//! The store manager: one explicit context object owning all providers.
//!
//! A [`StoreManager`] is created from a [`StoreConfig`] by the process's
//! composition root and passed around by reference; there is no global
//! instance. Providers are created lazily and single-flight, one per backend
//! kind, so concurrent first calls for the same backend share one
//! initialization. Aliased kind spellings ("postgres"/"postgresql") resolve
//! to the same provider and the same cached handles.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Auth, QueryOutcome, QueryRequest, TransactionStatement, User, UserLookup, UserUpdate,
};
use crate::provider::{
    BackendKind, Handle, MongoProvider, PostgresProvider, Provider, SqliteProvider,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

/// Identity of an open handle, for bookkeeping only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandleKey {
    kind: BackendKind,
    name: String,
    connection_string: Option<String>,
}

/// Owns the three backend providers and routes unified operations to them.
pub struct StoreManager {
    config: StoreConfig,
    providers: RwLock<HashMap<BackendKind, Arc<OnceCell<Arc<dyn Provider>>>>>,
    open_handles: RwLock<HashSet<HandleKey>>,
}

impl StoreManager {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            providers: RwLock::new(HashMap::new()),
            open_handles: RwLock::new(HashSet::new()),
        }
    }

    fn build_provider(&self, kind: BackendKind) -> Arc<dyn Provider> {
        match kind {
            BackendKind::Sqlite => Arc::new(SqliteProvider::new(self.config.data_dir.clone())),
            BackendKind::Postgres => Arc::new(PostgresProvider::new(self.config.pool.clone())),
            BackendKind::Mongo => Arc::new(MongoProvider::new(self.config.pool.clone())),
        }
    }

    /// Get or create the provider for a backend kind. Creation and
    /// `initialize` run exactly once per kind; concurrent first callers wait
    /// on the same cell.
    pub async fn provider(&self, kind: BackendKind) -> StoreResult<Arc<dyn Provider>> {
        let cell = {
            let providers = self.providers.read().await;
            if let Some(cell) = providers.get(&kind) {
                Arc::clone(cell)
            } else {
                drop(providers);
                let mut providers = self.providers.write().await;
                Arc::clone(
                    providers
                        .entry(kind)
                        .or_insert_with(|| Arc::new(OnceCell::new())),
                )
            }
        };

        let provider = cell
            .get_or_try_init(|| async {
                let provider = self.build_provider(kind);
                provider.initialize().await?;
                info!(backend = %kind, "Provider ready");
                Ok::<_, StoreError>(provider)
            })
            .await?;
        Ok(Arc::clone(provider))
    }

    /// Resolve a backend kind string (aliases accepted, case-insensitive) and
    /// get or create the handle for a logical database.
    pub async fn database(
        &self,
        kind: &str,
        name: &str,
        connection_string: Option<&str>,
    ) -> StoreResult<Handle> {
        let kind = BackendKind::parse(kind)?;
        let provider = self.provider(kind).await?;
        let handle = provider.database(name, connection_string).await?;

        self.open_handles.write().await.insert(HandleKey {
            kind,
            name: name.to_string(),
            connection_string: connection_string.map(String::from),
        });
        Ok(handle)
    }

    async fn provider_for(&self, handle: &Handle) -> StoreResult<Arc<dyn Provider>> {
        self.provider(handle.kind()).await
    }

    /// Find a user by id or email.
    pub async fn find_user(
        &self,
        handle: &Handle,
        lookup: &UserLookup,
        projection: Option<&[String]>,
    ) -> StoreResult<Option<User>> {
        self.provider_for(handle)
            .await?
            .find_user(handle, lookup, projection)
            .await
    }

    /// Insert a user; returns the inserted id.
    pub async fn insert_user(&self, handle: &Handle, user: &User) -> StoreResult<String> {
        self.provider_for(handle).await?.insert_user(handle, user).await
    }

    /// Apply a tagged update to a user; returns the modified count.
    pub async fn update_user(
        &self,
        handle: &Handle,
        id: &str,
        update: &UserUpdate,
    ) -> StoreResult<u64> {
        if update.is_empty() {
            return Ok(0);
        }
        self.provider_for(handle)
            .await?
            .update_user(handle, id, update)
            .await
    }

    /// Find an auth credential by email.
    pub async fn find_auth(&self, handle: &Handle, email: &str) -> StoreResult<Option<Auth>> {
        self.provider_for(handle).await?.find_auth(handle, email).await
    }

    /// Insert an auth credential; returns its email.
    pub async fn insert_auth(&self, handle: &Handle, auth: &Auth) -> StoreResult<String> {
        self.provider_for(handle).await?.insert_auth(handle, auth).await
    }

    /// Run an ad hoc query object; the result is always an envelope.
    pub async fn execute(&self, handle: &Handle, request: &QueryRequest) -> QueryOutcome {
        let started = Instant::now();
        match self.provider_for(handle).await {
            Ok(provider) => provider.execute(handle, request).await,
            Err(e) => QueryOutcome::failure(&e, started, handle.kind().db_type()),
        }
    }

    /// Run a multi-step transaction; all-or-nothing, always an envelope.
    pub async fn execute_transaction(
        &self,
        handle: &Handle,
        operations: &[TransactionStatement],
    ) -> QueryOutcome {
        let started = Instant::now();
        match self.provider_for(handle).await {
            Ok(provider) => provider.execute_transaction(handle, operations).await,
            Err(e) => QueryOutcome::failure(&e, started, handle.kind().db_type()),
        }
    }

    /// Number of distinct open handles across all backends.
    pub async fn handle_count(&self) -> usize {
        self.open_handles.read().await.len()
    }

    /// Close every pool and clear all caches. Idempotent; handles obtained
    /// after this call are built fresh.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut providers = self.providers.write().await;
            providers.drain().collect()
        };
        for (kind, cell) in drained {
            if let Some(provider) = cell.get() {
                info!(backend = %kind, "Closing provider");
                provider.close_all().await;
            }
        }
        self.open_handles.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alias_spellings_share_one_provider() {
        let manager = StoreManager::new(StoreConfig::default());
        let a = manager
            .provider(BackendKind::parse("postgres").unwrap())
            .await
            .unwrap();
        let b = manager
            .provider(BackendKind::parse("PostgreSQL").unwrap())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected() {
        let manager = StoreManager::new(StoreConfig::default());
        let err = manager.database("cassandra", "app", None).await.unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedBackend { .. }));
    }

    #[tokio::test]
    async fn test_networked_backends_require_connection_string() {
        let manager = StoreManager::new(StoreConfig::default());
        let err = manager.database("postgres", "app", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Configuration { .. }));

        let err = manager.database("mongodb", "app", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_handle_count_starts_at_zero() {
        let manager = StoreManager::new(StoreConfig::default());
        assert_eq!(manager.handle_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_all_is_idempotent() {
        let manager = StoreManager::new(StoreConfig::default());
        manager.close_all().await;
        manager.close_all().await;
        assert_eq!(manager.handle_count().await, 0);
    }
}
