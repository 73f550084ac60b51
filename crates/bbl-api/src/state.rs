//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! The service keeps one [`Store`] of [`AccessRecord`]s keyed by user id.
//! The in-memory store is the fast path that every request reads; when a
//! Postgres pool is configured, writes go through to the database and the
//! store is hydrated from it on startup. Without a pool the service runs
//! in-memory only (development and testing).

use std::collections::HashMap;
use std::sync::Arc;

use bbl_state::AccessRecord;
use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not `tokio::sync`)
/// because we never hold the lock across `.await` points. `parking_lot::RwLock`
/// is non-poisonable — a panicking writer does not permanently corrupt the store.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        if let Some(entry) = guard.get_mut(id) {
            f(entry);
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure receives a `&mut T` and may inspect the current state,
    /// validate preconditions, mutate the record, and return `Ok(R)` or
    /// `Err(E)`. The entire operation runs under a single write lock,
    /// eliminating TOCTOU races between read and update.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with
    /// the closure's `Result`.
    pub fn try_update<R, E>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Like [`Store::try_update`], with a conflict predicate checked against
    /// every *other* record under the same write lock.
    ///
    /// The predicate's first `Err` aborts before the record is touched.
    /// Returns `None` if the record doesn't exist.
    pub fn try_update_where<R, E>(
        &self,
        id: &Uuid,
        conflicts: impl Fn(&T) -> Result<(), E>,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        let mut guard = self.data.write();
        if !guard.contains_key(id) {
            return None;
        }
        for (key, value) in guard.iter() {
            if key != id {
                if let Err(e) = conflicts(value) {
                    return Some(Err(e));
                }
            }
        }
        guard.get_mut(id).map(f)
    }

    /// Atomically validate a conflict predicate against every *other* record,
    /// then insert or update the record at `id`.
    ///
    /// The predicate's first `Err` aborts without writing. `apply` builds the
    /// new value from the existing one, if any. The whole operation holds one
    /// write lock, so the predicate cannot go stale before the write.
    ///
    /// Returns the stored value and the previous value (`None` when created),
    /// which lets the caller restore the prior state if a downstream write
    /// fails.
    pub fn check_and_upsert<E>(
        &self,
        id: Uuid,
        conflicts: impl Fn(&T) -> Result<(), E>,
        apply: impl FnOnce(Option<&T>) -> T,
    ) -> Result<(T, Option<T>), E> {
        let mut guard = self.data.write();
        for (key, value) in guard.iter() {
            if *key != id {
                conflicts(value)?;
            }
        }
        let previous = guard.get(&id).cloned();
        let value = apply(previous.as_ref());
        guard.insert(id, value.clone());
        Ok((value, previous))
    }

    /// Remove a record, returning it if present.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.data.read().contains_key(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Application State --------------------------------------------------------

/// Application configuration.
///
/// Custom `Debug` redacts the `auth_token` to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer token for Phase 1 authentication.
    /// If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// URL of the latest platform artifact, target of the gated redirect.
    /// If `None`, eligible download requests return 503.
    pub artifact_url: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("artifact_url", &self.artifact_url)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            artifact_url: None,
        }
    }
}

/// Shared application state accessible to all route handlers.
///
/// Clone-friendly via `Arc` internals in the `Store`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Download-access records keyed by user id.
    pub requests: Store<AccessRecord>,

    /// PostgreSQL connection pool for durable persistence.
    /// When `Some`, records are persisted to Postgres in addition to the
    /// in-memory store. When `None`, the API operates in in-memory-only mode.
    pub db_pool: Option<PgPool>,

    /// Application configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Create a new application state with default configuration and no database.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// Create a new application state with the given configuration and
    /// optional database pool.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            requests: Store::new(),
            db_pool,
            config,
        }
    }

    /// Hydrate the in-memory store from the database.
    ///
    /// Called once on startup when a database pool is available. Loads all
    /// persisted download requests into the in-memory store so that read
    /// operations remain fast and synchronous.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let records = crate::db::download_requests::load_all(pool)
            .await
            .map_err(|e| format!("failed to load download requests: {e}"))?;
        let count = records.len();
        for record in records {
            self.requests.insert(record.user_id, record);
        }

        tracing::info!(download_requests = count, "Hydrated in-memory store from database");
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
