//! SQLite-backed debug store, for deployments that want debug flags to
//! survive a process restart. Built on `sqlx`, following a
//! functional-core/imperative-shell split: migrations run once at
//! construction via `sqlx::migrate!()`, and every query goes through a
//! connection pool.
//!
//! [`DebugStore`] is synchronous by design (see the `debug_store::mod` doc
//! comment), so this type owns a small current-thread Tokio runtime and
//! bridges each call with `block_on`. A short-lived read cache sits in
//! front of the three query methods, since the store is consulted on every
//! inbound event.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::runtime::Runtime;

use super::{DebugFlag, DebugStore};
use crate::error::DebugStoreError;
use crate::ids::{RouterId, TenantId};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// How long a cached read is trusted before the store re-queries SQLite.
const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(250);

fn backend_err(e: impl std::fmt::Display) -> DebugStoreError {
    DebugStoreError::Backend(e.to_string())
}

struct Cache {
    ttl: Duration,
    global: Mutex<Option<(Instant, DebugFlag)>>,
    tenants: Mutex<HashMap<TenantId, (Instant, DebugFlag)>>,
    routers: Mutex<HashMap<RouterId, (Instant, DebugFlag)>>,
}

impl Cache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            global: Mutex::new(None),
            tenants: Mutex::new(HashMap::new()),
            routers: Mutex::new(HashMap::new()),
        }
    }

    fn invalidate_all(&self) {
        *self.global.lock() = None;
        self.tenants.lock().clear();
        self.routers.lock().clear();
    }
}

/// SQLite-backed [`DebugStore`].
pub struct SqliteDebugStore {
    pool: SqlitePool,
    runtime: Runtime,
    cache: Cache,
}

impl SqliteDebugStore {
    /// Opens (creating if needed) a SQLite database at `path` and runs
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DebugStoreError> {
        Self::open_with_ttl(path, DEFAULT_CACHE_TTL)
    }

    /// Like [`Self::open`] but with a caller-chosen cache TTL, mainly for
    /// tests that want to observe a fresh read immediately.
    pub fn open_with_ttl(path: &Path, cache_ttl: Duration) -> Result<Self, DebugStoreError> {
        let runtime = Runtime::new().map_err(backend_err)?;
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = runtime.block_on(async {
            let pool = SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await?;
            MIGRATOR.run(&pool).await.map_err(sqlx::Error::from)?;
            Ok::<_, sqlx::Error>(pool)
        }).map_err(backend_err)?;

        Ok(Self {
            pool,
            runtime,
            cache: Cache::new(cache_ttl),
        })
    }
}

impl DebugStore for SqliteDebugStore {
    fn global_debug(&self) -> Result<DebugFlag, DebugStoreError> {
        if let Some((at, flag)) = self.cache.global.lock().clone() {
            if at.elapsed() < self.cache.ttl {
                return Ok(flag);
            }
        }
        let flag = self.runtime.block_on(async {
            let row: Option<(bool, Option<String>)> =
                sqlx::query_as("SELECT enabled, reason FROM global_debug WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            Ok::<_, sqlx::Error>(row.map_or((false, None), |(enabled, reason)| (enabled, reason)))
        }).map_err(backend_err)?;
        *self.cache.global.lock() = Some((Instant::now(), flag.clone()));
        Ok(flag)
    }

    fn tenant_in_debug(&self, tenant_id: TenantId) -> Result<DebugFlag, DebugStoreError> {
        if let Some((at, flag)) = self.cache.tenants.lock().get(&tenant_id).cloned() {
            if at.elapsed() < self.cache.ttl {
                return Ok(flag);
            }
        }
        let id = tenant_id.to_string();
        let flag = self.runtime.block_on(async {
            let row: Option<(Option<String>,)> =
                sqlx::query_as("SELECT reason FROM tenant_debug WHERE tenant_id = ?")
                    .bind(&id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok::<_, sqlx::Error>(row.map_or((false, None), |(reason,)| (true, reason)))
        }).map_err(backend_err)?;
        self.cache.tenants.lock().insert(tenant_id, (Instant::now(), flag.clone()));
        Ok(flag)
    }

    fn router_in_debug(&self, router_id: RouterId) -> Result<DebugFlag, DebugStoreError> {
        if let Some((at, flag)) = self.cache.routers.lock().get(&router_id).cloned() {
            if at.elapsed() < self.cache.ttl {
                return Ok(flag);
            }
        }
        let id = router_id.to_string();
        let flag = self.runtime.block_on(async {
            let row: Option<(Option<String>,)> =
                sqlx::query_as("SELECT reason FROM router_debug WHERE router_id = ?")
                    .bind(&id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok::<_, sqlx::Error>(row.map_or((false, None), |(reason,)| (true, reason)))
        }).map_err(backend_err)?;
        self.cache.routers.lock().insert(router_id, (Instant::now(), flag.clone()));
        Ok(flag)
    }

    fn tenants_in_debug(&self) -> Result<Vec<(TenantId, Option<String>)>, DebugStoreError> {
        self.runtime.block_on(async {
            let rows: Vec<(String, Option<String>)> =
                sqlx::query_as("SELECT tenant_id, reason FROM tenant_debug")
                    .fetch_all(&self.pool)
                    .await?;
            Ok::<_, sqlx::Error>(
                rows.into_iter()
                    .filter_map(|(id, reason)| {
                        TenantId::normalize(&id).ok().map(|t| (t, reason))
                    })
                    .collect(),
            )
        }).map_err(backend_err)
    }

    fn routers_in_debug(&self) -> Result<Vec<(RouterId, Option<String>)>, DebugStoreError> {
        self.runtime.block_on(async {
            let rows: Vec<(String, Option<String>)> =
                sqlx::query_as("SELECT router_id, reason FROM router_debug")
                    .fetch_all(&self.pool)
                    .await?;
            Ok::<_, sqlx::Error>(
                rows.into_iter()
                    .filter_map(|(id, reason)| {
                        uuid::Uuid::parse_str(&id).ok().map(|u| (RouterId::new(u), reason))
                    })
                    .collect(),
            )
        }).map_err(backend_err)
    }

    fn enable_global_debug(&self, reason: Option<String>) -> Result<(), DebugStoreError> {
        self.runtime.block_on(async {
            sqlx::query(
                "INSERT INTO global_debug (id, enabled, reason) VALUES (1, 1, ?)
                 ON CONFLICT(id) DO UPDATE SET enabled = 1, reason = excluded.reason",
            )
            .bind(reason)
            .execute(&self.pool)
            .await
        }).map_err(backend_err)?;
        self.cache.invalidate_all();
        Ok(())
    }

    fn disable_global_debug(&self) -> Result<(), DebugStoreError> {
        self.runtime.block_on(async {
            sqlx::query(
                "INSERT INTO global_debug (id, enabled, reason) VALUES (1, 0, NULL)
                 ON CONFLICT(id) DO UPDATE SET enabled = 0, reason = NULL",
            )
            .execute(&self.pool)
            .await
        }).map_err(backend_err)?;
        self.cache.invalidate_all();
        Ok(())
    }

    fn enable_tenant_debug(&self, tenant_id: TenantId, reason: Option<String>) -> Result<(), DebugStoreError> {
        let id = tenant_id.to_string();
        self.runtime.block_on(async {
            sqlx::query(
                "INSERT INTO tenant_debug (tenant_id, reason) VALUES (?, ?)
                 ON CONFLICT(tenant_id) DO UPDATE SET reason = excluded.reason",
            )
            .bind(id)
            .bind(reason)
            .execute(&self.pool)
            .await
        }).map_err(backend_err)?;
        self.cache.tenants.lock().remove(&tenant_id);
        Ok(())
    }

    fn disable_tenant_debug(&self, tenant_id: TenantId) -> Result<(), DebugStoreError> {
        let id = tenant_id.to_string();
        self.runtime.block_on(async {
            sqlx::query("DELETE FROM tenant_debug WHERE tenant_id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
        }).map_err(backend_err)?;
        self.cache.tenants.lock().remove(&tenant_id);
        Ok(())
    }

    fn enable_router_debug(&self, router_id: RouterId, reason: Option<String>) -> Result<(), DebugStoreError> {
        let id = router_id.to_string();
        self.runtime.block_on(async {
            sqlx::query(
                "INSERT INTO router_debug (router_id, reason) VALUES (?, ?)
                 ON CONFLICT(router_id) DO UPDATE SET reason = excluded.reason",
            )
            .bind(id)
            .bind(reason)
            .execute(&self.pool)
            .await
        }).map_err(backend_err)?;
        self.cache.routers.lock().remove(&router_id);
        Ok(())
    }

    fn disable_router_debug(&self, router_id: RouterId) -> Result<(), DebugStoreError> {
        let id = router_id.to_string();
        self.runtime.block_on(async {
            sqlx::query("DELETE FROM router_debug WHERE router_id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
        }).map_err(backend_err)?;
        self.cache.routers.lock().remove(&router_id);
        Ok(())
    }
}
