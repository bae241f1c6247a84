//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Stores**: one in-memory [`Store`] per table, the source of truth for
//!   reads. When a database pool is configured every mutation is written
//!   through to Postgres, and the stores are hydrated from it at startup.
//! - **Auth**: the [`CredentialVerifier`] (hashing, token issuance) and the
//!   [`Authenticator`] (token → active identity) share one token issuer.
//!   The user store doubles as the identity directory.
//! - **Rate limiter** and **metrics** are explicit shared handles, injected
//!   into the middleware stack by [`crate::app`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sqlx::PgPool;
use stockroom_auth::{
    Authenticator, CredentialError, CredentialVerifier, IdentityResolver, PasswordHasher,
    ResolveError, TokenError, TokenIssuer,
};
use stockroom_core::{Identity, Role, SharedClock, SystemClock};
use tokio::sync::OwnedMutexGuard;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::RateLimiter;
use crate::webhooks::{DeliveryError, WebhookDispatcher};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory table keyed by integer id.
///
/// Ids come from a monotonic sequence and are never reused. Iteration is in
/// ascending id order. The data lock is `parking_lot` and is never held
/// across an `.await`.
///
/// Mutations that are written through to Postgres hold [`Store::lock_writes`]
/// from the memory change until the database write (or its rollback)
/// completes, so writers of one table commit in the same order in memory
/// and in the database, and a rollback never overwrites another writer's
/// change. Handlers touching several tables take their guards in the order
/// users, categories, locations, products, inventory, costs, webhooks.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<BTreeMap<i64, T>>>,
    seq: Arc<AtomicI64>,
    writes: Arc<tokio::sync::Mutex<()>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            seq: Arc::clone(&self.seq),
            writes: Arc::clone(&self.writes),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            seq: Arc::new(AtomicI64::new(0)),
            writes: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Serialize write-through mutations of this table.
    pub async fn lock_writes(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.writes).lock_owned().await
    }

    /// Insert a record under a known id, advancing the sequence past it.
    pub fn insert(&self, id: i64, value: T) -> Option<T> {
        self.seq.fetch_max(id, Ordering::SeqCst);
        self.data.write().insert(id, value)
    }

    /// Allocate an id and insert `make(id)`, unless an existing record
    /// satisfies `conflicts`. Check and insert happen under one write lock.
    pub fn try_insert(
        &self,
        conflicts: impl Fn(&T) -> bool,
        make: impl FnOnce(i64) -> T,
    ) -> Option<T> {
        let mut guard = self.data.write();
        if guard.values().any(conflicts) {
            return None;
        }
        let id = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let value = make(id);
        guard.insert(id, value.clone());
        Some(value)
    }

    pub fn get(&self, id: i64) -> Option<T> {
        self.data.read().get(&id).cloned()
    }

    /// All records in ascending id order.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// First record (lowest id) matching `pred`.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.data.read().values().find(|v| pred(*v)).cloned()
    }

    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.data.read().values().any(pred)
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: i64, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(&id)?;
        f(entry);
        Some(entry.clone())
    }

    /// Run `f` with exclusive access to the whole table, for changes that
    /// must validate against or touch several records at once.
    pub fn with_write<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<i64, T>, &dyn Fn() -> i64) -> R,
    ) -> R {
        let mut guard = self.data.write();
        let next_id = || self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        f(&mut *guard, &next_id)
    }

    pub fn remove(&self, id: i64) -> Option<T> {
        self.data.write().remove(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.data.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Record Types -------------------------------------------------------------

/// User account. The password hash is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[schema(value_type = String, example = "manager")]
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn identity(&self) -> Identity {
        Identity::new(self.username.clone(), self.role, self.is_active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Warehouse or other stock-holding location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LocationRecord {
    pub id: i64,
    /// Short unique warehouse code.
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProductRecord {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Stock level of one product at one location. At most one per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct InventoryRecord {
    pub id: i64,
    pub product_id: i64,
    pub location_id: i64,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CostRecord {
    pub id: i64,
    pub product_id: i64,
    pub unit_cost: f64,
    pub currency: String,
    pub effective_at: DateTime<Utc>,
}

/// Outbound webhook target. The signing secret is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct WebhookRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(skip)]
    pub secret: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// -- Identity Directory -------------------------------------------------------

impl IdentityResolver for Store<UserRecord> {
    fn resolve(&self, subject: &str) -> Result<Identity, ResolveError> {
        self.find(|u| u.username == subject)
            .map(|u| u.identity())
            .ok_or_else(|| ResolveError::NotFound(subject.to_string()))
    }
}

// -- Application State --------------------------------------------------------

/// Failure to assemble [`AppState`] from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("token configuration: {0}")]
    Token(#[from] TokenError),
    #[error("password hashing configuration: {0}")]
    Credential(#[from] CredentialError),
    #[error("webhook client: {0}")]
    Webhook(#[from] DeliveryError),
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub users: Store<UserRecord>,
    pub categories: Store<CategoryRecord>,
    pub locations: Store<LocationRecord>,
    pub products: Store<ProductRecord>,
    pub inventory: Store<InventoryRecord>,
    pub costs: Store<CostRecord>,
    pub webhooks: Store<WebhookRecord>,
    /// Postgres pool. `None` means in-memory only.
    pub db_pool: Option<PgPool>,
    pub config: Arc<AppConfig>,
    pub clock: SharedClock,
    pub credentials: Arc<CredentialVerifier>,
    pub authenticator: Authenticator,
    pub rate_limiter: RateLimiter,
    pub metrics: ApiMetrics,
    pub dispatcher: WebhookDispatcher,
}

impl AppState {
    /// Build state on the system clock.
    pub fn new(config: AppConfig, db_pool: Option<PgPool>) -> Result<Self, StateError> {
        Self::with_clock(config, db_pool, SystemClock::shared())
    }

    /// Build state on an explicit clock.
    pub fn with_clock(
        config: AppConfig,
        db_pool: Option<PgPool>,
        clock: SharedClock,
    ) -> Result<Self, StateError> {
        let tokens = Arc::new(TokenIssuer::new(&config.token_settings(), clock.clone())?);
        let credentials = Arc::new(CredentialVerifier::new(
            PasswordHasher::new(config.bcrypt_cost)?,
            tokens.clone(),
        )?);

        let users: Store<UserRecord> = Store::new();
        let authenticator = Authenticator::new(tokens, Arc::new(users.clone()));
        let rate_limiter = RateLimiter::new(
            config.rate_limit,
            config.rate_limit_exclude_paths.iter().cloned(),
            clock.clone(),
        );
        let dispatcher = WebhookDispatcher::new(
            std::time::Duration::from_secs(config.webhook_timeout_secs),
            config.webhook_signature_secret.clone(),
        )?;

        Ok(Self {
            users,
            categories: Store::new(),
            locations: Store::new(),
            products: Store::new(),
            inventory: Store::new(),
            costs: Store::new(),
            webhooks: Store::new(),
            db_pool,
            config: Arc::new(config),
            clock,
            credentials,
            authenticator,
            rate_limiter,
            metrics: ApiMetrics::new(),
            dispatcher,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Load all persisted records into the in-memory stores.
    ///
    /// No-op without a database pool. Sequences advance past the highest
    /// loaded id so new records never collide with persisted ones.
    pub async fn hydrate_from_db(&self) -> Result<(), sqlx::Error> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };

        let users = crate::db::users::load_all(pool).await?;
        let user_count = users.len();
        for record in users {
            self.users.insert(record.id, record);
        }

        let categories = crate::db::categories::load_all(pool).await?;
        let category_count = categories.len();
        for record in categories {
            self.categories.insert(record.id, record);
        }

        let locations = crate::db::locations::load_all(pool).await?;
        let location_count = locations.len();
        for record in locations {
            self.locations.insert(record.id, record);
        }

        let products = crate::db::products::load_all(pool).await?;
        let product_count = products.len();
        for record in products {
            self.products.insert(record.id, record);
        }

        let inventory = crate::db::inventory::load_all(pool).await?;
        let inventory_count = inventory.len();
        for record in inventory {
            self.inventory.insert(record.id, record);
        }

        let costs = crate::db::costs::load_all(pool).await?;
        let cost_count = costs.len();
        for record in costs {
            self.costs.insert(record.id, record);
        }

        let webhooks = crate::db::webhooks::load_all(pool).await?;
        let webhook_count = webhooks.len();
        for record in webhooks {
            self.webhooks.insert(record.id, record);
        }

        tracing::info!(
            users = user_count,
            categories = category_count,
            locations = location_count,
            products = product_count,
            inventory = inventory_count,
            costs = cost_count,
            webhooks = webhook_count,
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::{Clock, ManualClock};

    fn category(id: i64, name: &str) -> CategoryRecord {
        CategoryRecord {
            id,
            name: name.to_string(),
            description: None,
            created_at: ManualClock::at_epoch().now(),
        }
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let store: Store<CategoryRecord> = Store::new();
        let a = store.try_insert(|_| false, |id| category(id, "a")).unwrap();
        let b = store.try_insert(|_| false, |id| category(id, "b")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        store.remove(b.id);
        let c = store.try_insert(|_| false, |id| category(id, "c")).unwrap();
        assert_eq!(c.id, 3);
    }

    #[test]
    fn try_insert_refuses_conflicts() {
        let store: Store<CategoryRecord> = Store::new();
        store
            .try_insert(|_| false, |id| category(id, "tools"))
            .unwrap();
        let is_tools = |c: &CategoryRecord| c.name == "tools";
        let dup = store.try_insert(is_tools, |id| category(id, "tools"));
        assert!(dup.is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn insert_with_known_id_advances_sequence() {
        let store: Store<CategoryRecord> = Store::new();
        store.insert(41, category(41, "loaded"));
        let next = store
            .try_insert(|_| false, |id| category(id, "new"))
            .unwrap();
        assert_eq!(next.id, 42);
    }

    #[test]
    fn list_is_in_ascending_id_order() {
        let store: Store<CategoryRecord> = Store::new();
        store.insert(3, category(3, "c"));
        store.insert(1, category(1, "a"));
        store.insert(2, category(2, "b"));
        let ids: Vec<i64> = store.list().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn update_in_place() {
        let store: Store<CategoryRecord> = Store::new();
        store.insert(1, category(1, "a"));
        let updated = store.update(1, |c| c.name = "z".into()).unwrap();
        assert_eq!(updated.name, "z");
        assert!(store.update(9, |_| {}).is_none());
    }

    #[tokio::test]
    async fn write_lock_is_shared_across_clones_and_serializes_writers() {
        let store: Store<CategoryRecord> = Store::new();
        let first = store.lock_writes().await;

        let other = store.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock_writes().await;
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn user_store_resolves_identities() {
        let users: Store<UserRecord> = Store::new();
        users.insert(
            1,
            UserRecord {
                id: 1,
                username: "ann".into(),
                email: "ann@example.com".into(),
                password_hash: String::new(),
                role: Role::Viewer,
                is_active: false,
                created_at: ManualClock::at_epoch().now(),
            },
        );
        let identity = users.resolve("ann").unwrap();
        assert_eq!(identity, Identity::new("ann", Role::Viewer, false));
        assert_eq!(
            users.resolve("bob"),
            Err(ResolveError::NotFound("bob".into()))
        );
    }

    #[test]
    fn user_serialization_omits_password_hash() {
        let user = UserRecord {
            id: 1,
            username: "ann".into(),
            email: "ann@example.com".into(),
            password_hash: "$2b$04$secret".into(),
            role: Role::Admin,
            is_active: true,
            created_at: ManualClock::at_epoch().now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "admin");
    }

    #[test]
    fn state_builds_from_default_config() {
        let config = AppConfig {
            bcrypt_cost: 4,
            ..AppConfig::default()
        };
        let clock = ManualClock::at_epoch();
        let state = AppState::with_clock(config, None, clock.shared()).unwrap();
        assert!(state.db_pool.is_none());
        assert!(state.users.is_empty());
    }
}
