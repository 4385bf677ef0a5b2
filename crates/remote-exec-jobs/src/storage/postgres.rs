//! PostgreSQL job store (feature-gated).

use async_trait::async_trait;
use remote_exec_core::{
    JobId, StoreConfig,
    traits::{JobStore, ReturnRecord, StoreError},
};
use sqlx::{
    PgPool, Row,
    postgres::{PgConnectOptions, PgPoolOptions},
};

use super::{backend_error, map_insert_error};

const SCHEMA: [&str; 6] = [
    r"
    CREATE TABLE IF NOT EXISTS jids (
        jid   text PRIMARY KEY,
        load  text NOT NULL
    )
    ",
    r#"
    CREATE TABLE IF NOT EXISTS job_returns (
        added     TIMESTAMP WITH TIME ZONE DEFAULT now(),
        fun       text NOT NULL,
        jid       text NOT NULL,
        "return"  text NOT NULL,
        id        text NOT NULL,
        success   boolean
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_returns_added ON job_returns (added)",
    "CREATE INDEX IF NOT EXISTS idx_job_returns_id ON job_returns (id)",
    "CREATE INDEX IF NOT EXISTS idx_job_returns_jid ON job_returns (jid)",
    "CREATE INDEX IF NOT EXISTS idx_job_returns_fun ON job_returns (fun)",
];

/// Connection options for a store config.
///
/// Credentials are set field by field, so they may contain any character.
///
/// # Errors
/// Returns error if host or user is missing.
pub fn connect_options(config: &StoreConfig) -> Result<PgConnectOptions, StoreError> {
    config.validate_server()?;
    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database))
}

/// PostgreSQL storage implementation.
#[derive(Debug)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    /// Connect with the host, user, password, database and port of a store
    /// config and create the schema.
    ///
    /// # Errors
    /// Returns error if the config is incomplete, or the connection or schema
    /// creation fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = connect_options(config)?;

        tracing::info!(host = %config.host, database = %config.database, "Connecting to PostgreSQL job store");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| backend_error("connect to database", &e))?;

        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool. The schema is not touched.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if missing.
    ///
    /// # Errors
    /// Returns error if a statement fails.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        tracing::info!("Initializing job cache schema");
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| backend_error("initialize schema", &e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn jid_exists(&self, jid: &JobId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT jid FROM jids WHERE jid = $1")
            .bind(jid.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend_error("look up job id", &e))?;

        Ok(row.is_some())
    }

    async fn insert_load(&self, jid: &JobId, load_json: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO jids (jid, load) VALUES ($1, $2)")
            .bind(jid.as_str())
            .bind(load_json)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(jid, e))?;

        Ok(())
    }

    async fn fetch_load(&self, jid: &JobId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT load FROM jids WHERE jid = $1")
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
                Ok((JobId::new(jid), row.try_get("load")?))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| backend_error("decode job row", &e))
    }

    async fn insert_return(&self, record: &ReturnRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_returns (fun, jid, "return", id, success)
            VALUES ($1, $2, $3, $4, $5)
        "#,
        )
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
        let rows = sqlx::query(r#"SELECT id, "return" FROM job_returns WHERE jid = $1 ORDER BY added"#)
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
