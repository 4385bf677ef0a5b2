//! SQLite job store (feature-gated).

use std::str::FromStr;

use async_trait::async_trait;
use remote_exec_core::{
    JobId, StoreConfig,
    traits::{JobStore, ReturnRecord, StoreError},
};
use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};

use super::{backend_error, map_insert_error};

const SCHEMA: [&str; 6] = [
    r"
    CREATE TABLE IF NOT EXISTS jids (
        jid   TEXT PRIMARY KEY,
        load  TEXT NOT NULL
    )
    ",
    r#"
    CREATE TABLE IF NOT EXISTS job_returns (
        added     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
        fun       TEXT NOT NULL,
        jid       TEXT NOT NULL,
        "return"  TEXT NOT NULL,
        id        TEXT NOT NULL,
        success   BOOLEAN
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_returns_added ON job_returns (added)",
    "CREATE INDEX IF NOT EXISTS idx_job_returns_id ON job_returns (id)",
    "CREATE INDEX IF NOT EXISTS idx_job_returns_jid ON job_returns (jid)",
    "CREATE INDEX IF NOT EXISTS idx_job_returns_fun ON job_returns (fun)",
];

/// Connection options for the `database` path of a store config.
///
/// The path is passed through as a filename, never spliced into a URL.
///
/// # Errors
/// Returns error if the config is incomplete.
pub fn connect_options(config: &StoreConfig) -> Result<SqliteConnectOptions, StoreError> {
    config.validate()?;
    if config.is_in_memory() {
        return SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| backend_error("parse database URL", &e));
    }
    Ok(SqliteConnectOptions::new()
        .filename(&config.database)
        .create_if_missing(true))
}

/// SQLite storage implementation.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Connect using the `database` path of a store config and create the
    /// schema. The file is created if missing.
    ///
    /// # Errors
    /// Returns error if the config is incomplete or the connection fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::connect_with(connect_options(config)?, config.max_connections, config.is_in_memory()).await
    }

    /// Connect to an SQLite URL and create the schema.
    ///
    /// # Errors
    /// Returns error if the URL is malformed, or the connection or schema
    /// creation fails.
    pub async fn connect_url(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| backend_error("parse database URL", &e))?;
        Self::connect_with(options, max_connections, database_url.contains(":memory:")).await
    }

    /// In-memory databases live as long as their connection, so their pool is
    /// pinned to one connection that never expires.
    async fn connect_with(
        options: SqliteConnectOptions,
        max_connections: u32,
        in_memory: bool,
    ) -> Result<Self, StoreError> {
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory {
            1
        } else {
            max_connections
        });
        if in_memory {
            pool_options = pool_options
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>);
        }

        tracing::info!(in_memory, "Connecting to SQLite job store");
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| backend_error("connect to database", &e))?;

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema is not touched.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if missing.
    ///
    /// # Errors
    /// Returns error if a statement fails.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| backend_error("initialize schema", &e))?;
        }
        tracing::debug!("SQLite job store schema ready");
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn jid_exists(&self, jid: &JobId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT jid FROM jids WHERE jid = ?")
            .bind(jid.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend_error("look up job id", &e))?;

        Ok(row.is_some())
    }

    async fn insert_load(&self, jid: &JobId, load_json: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO jids (jid, load) VALUES (?, ?)")
            .bind(jid.as_str())
            .bind(load_json)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(jid, e))?;

        Ok(())
    }

    async fn fetch_load(&self, jid: &JobId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT load FROM jids WHERE jid = ?")
            .bind(jid.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend_error("get load", &e))?;

        row.map(|row| row.try_get::<String, _>("load"))
            .transpose()
            .map_err(|e| backend_error("decode load", &e))
    }

    async fn fetch_loads(&self) -> Result<Vec<(JobId, String)>, StoreError> {
        let rows = sqlx::query("SELECT jid, load FROM jids ORDER BY jid")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend_error("list jobs", &e))?;

        rows.iter()
            .map(|row| -> Result<(JobId, String), sqlx::Error> {
                let jid: String = row.try_get("jid")?;
                let load: String = row.try_get("load")?;
                Ok((JobId::new(jid), load))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| backend_error("decode job row", &e))
    }

    async fn insert_return(&self, record: &ReturnRecord) -> Result<(), StoreError> {
        sqlx::query(r#"INSERT INTO job_returns (fun, jid, "return", id, success) VALUES (?, ?, ?, ?, ?)"#)
            .bind(&record.fun)
            .bind(record.jid.as_str())
            .bind(&record.return_json)
            .bind(&record.id)
            .bind(record.success)
            .execute(&self.pool)
            .await
            .map_err(|e| backend_error("insert result", &e))?;

        Ok(())
    }

    async fn fetch_returns(&self, jid: &JobId) -> Result<Vec<(String, String)>, StoreError> {
        let rows = sqlx::query(r#"SELECT id, "return" FROM job_returns WHERE jid = ? ORDER BY rowid"#)
            .bind(jid.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| backend_error("get results", &e))?;

        rows.iter()
            .map(|row| -> Result<(String, String), sqlx::Error> {
                Ok((row.try_get("id")?, row.try_get("return")?))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| backend_error("decode result row", &e))
    }
}
