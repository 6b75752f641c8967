//! SQLite-backed host platform
//!
//! sqlx is async; the engine is synchronous. The platform owns a
//! current-thread runtime and blocks on each query, so it must not be used
//! from inside another tokio runtime.

use super::platform::{HostPlatform, Namespace};
use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::{Builder, Runtime};

const CREATE_OPTIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS options (
        namespace TEXT NOT NULL,
        entity_id INTEGER NOT NULL DEFAULT 0,
        name TEXT NOT NULL,
        value TEXT NOT NULL,
        autoload INTEGER,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (namespace, entity_id, name)
    )
"#;

/// Options rows stored in a single SQLite table
pub struct SqlitePlatform {
    pool: SqlitePool,
    runtime: Runtime,
    current_blog: AtomicU64,
}

impl SqlitePlatform {
    /// Open (creating if needed) a database file
    pub fn open(db_path: &Path) -> Result<Self> {
        let runtime = build_runtime()?;
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = runtime.block_on(async {
            let pool = SqlitePool::connect(&database_url)
                .await
                .with_context(|| format!("Failed to connect to database: {}", db_path.display()))?;

            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await
                .context("Failed to enable WAL mode")?;

            sqlx::query("PRAGMA synchronous = NORMAL")
                .execute(&pool)
                .await
                .context("Failed to set synchronous mode")?;

            Ok::<_, anyhow::Error>(pool)
        })?;

        log::debug!("Connected to SQLite database: {}", db_path.display());
        Self::with_pool(pool, runtime)
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self> {
        let runtime = build_runtime()?;

        // Every connection to :memory: is its own database, so pin the pool
        // to a single connection that never expires.
        let pool = runtime.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .context("Failed to connect to in-memory database")
        })?;

        log::debug!("Connected to in-memory SQLite database");
        Self::with_pool(pool, runtime)
    }

    fn with_pool(pool: SqlitePool, runtime: Runtime) -> Result<Self> {
        runtime.block_on(async {
            sqlx::query(CREATE_OPTIONS_TABLE)
                .execute(&pool)
                .await
                .context("Failed to create options table")
        })?;

        Ok(Self {
            pool,
            runtime,
            current_blog: AtomicU64::new(1),
        })
    }

    pub fn set_current_blog(&self, blog_id: u64) {
        self.current_blog.store(blog_id, Ordering::SeqCst);
    }

    /// Names of all rows in a namespace, sorted
    pub fn names(&self, ns: Namespace) -> Result<Vec<String>> {
        let (kind, entity) = ns.address();
        self.block_on(async {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT name FROM options WHERE namespace = ? AND entity_id = ? ORDER BY name",
            )
            .bind(&kind)
            .bind(entity_column(entity))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list rows in {}", ns))?;

            Ok(rows.into_iter().map(|(name,)| name).collect())
        })
    }

    /// Stored autoload flag of a row
    pub fn autoload(&self, ns: Namespace, name: &str) -> Result<Option<bool>> {
        let (kind, entity) = ns.address();
        self.block_on(async {
            let flag: Option<Option<bool>> = sqlx::query_scalar(
                "SELECT autoload FROM options WHERE namespace = ? AND entity_id = ? AND name = ?",
            )
            .bind(&kind)
            .bind(entity_column(entity))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read autoload flag of '{}' in {}", name, ns))?;

            Ok(flag.flatten())
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    async fn fetch(&self, ns: Namespace, name: &str) -> Result<Option<Value>> {
        let (kind, entity) = ns.address();
        let raw: Option<String> = sqlx::query_scalar(
            "SELECT value FROM options WHERE namespace = ? AND entity_id = ? AND name = ?",
        )
        .bind(&kind)
        .bind(entity_column(entity))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get '{}' from {}", name, ns))?;

        match raw {
            Some(raw) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("Stored value of '{}' in {} is not JSON", name, ns))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn upsert(
        &self,
        ns: Namespace,
        name: &str,
        value: &Value,
        autoload: Option<bool>,
    ) -> Result<()> {
        let (kind, entity) = ns.address();
        sqlx::query(
            "INSERT INTO options (namespace, entity_id, name, value, autoload, updated_at)
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(namespace, entity_id, name) DO UPDATE SET
                value = excluded.value,
                autoload = COALESCE(excluded.autoload, options.autoload),
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&kind)
        .bind(entity_column(entity))
        .bind(name)
        .bind(value.to_string())
        .bind(autoload)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to set '{}' in {}", name, ns))?;

        log::debug!("Set option row: {} in {}", name, ns);
        Ok(())
    }

    async fn insert_new(
        &self,
        ns: Namespace,
        name: &str,
        value: &Value,
        autoload: Option<bool>,
    ) -> Result<bool> {
        let (kind, entity) = ns.address();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO options (namespace, entity_id, name, value, autoload, updated_at)
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
        )
        .bind(&kind)
        .bind(entity_column(entity))
        .bind(name)
        .bind(value.to_string())
        .bind(autoload)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to add '{}' to {}", name, ns))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_row(&self, ns: Namespace, name: &str) -> Result<bool> {
        let (kind, entity) = ns.address();
        let result =
            sqlx::query("DELETE FROM options WHERE namespace = ? AND entity_id = ? AND name = ?")
                .bind(&kind)
                .bind(entity_column(entity))
                .bind(name)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to delete '{}' from {}", name, ns))?;

        if result.rows_affected() > 0 {
            log::debug!("Deleted option row: {} in {}", name, ns);
        }
        Ok(result.rows_affected() > 0)
    }
}

impl HostPlatform for SqlitePlatform {
    fn current_blog_id(&self) -> u64 {
        self.current_blog.load(Ordering::SeqCst)
    }

    fn read(&self, ns: Namespace, name: &str) -> Option<Value> {
        self.block_on(self.fetch(ns, name)).unwrap_or_else(|e| {
            log::error!("{:#}", e);
            None
        })
    }

    fn write(&self, ns: Namespace, name: &str, value: &Value, autoload: Option<bool>) -> bool {
        match self.block_on(self.upsert(ns, name, value, autoload)) {
            Ok(()) => true,
            Err(e) => {
                log::error!("{:#}", e);
                false
            }
        }
    }

    fn insert(&self, ns: Namespace, name: &str, value: &Value, autoload: Option<bool>) -> bool {
        self.block_on(self.insert_new(ns, name, value, autoload))
            .unwrap_or_else(|e| {
                log::error!("{:#}", e);
                false
            })
    }

    fn remove(&self, ns: Namespace, name: &str) -> bool {
        self.block_on(self.delete_row(ns, name)).unwrap_or_else(|e| {
            log::error!("{:#}", e);
            false
        })
    }
}

fn build_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start SQLite runtime")
}

/// SQLite integers are signed; ids are stored bit-for-bit
fn entity_column(entity: u64) -> i64 {
    entity as i64
}
