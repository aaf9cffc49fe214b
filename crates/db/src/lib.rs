//! SQLite connection handling for the catalog service.
//!
//! [`Db`] is the single store handle of the process: opened once at startup
//! (usually through [`wait_for_ready`]), handed explicitly to the modules that
//! need it and closed at shutdown.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use catalog_kernel::settings::DatabaseSettings;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub mod migrate;

/// Shared handle over the SQLite connection pool.
#[derive(Clone, Debug)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open a pool for the configured database, creating the file if missing.
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .with_context(|| format!("invalid database url '{}'", settings.url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await
            .context("failed to open database pool")?;

        Ok(Self { pool })
    }

    /// Private in-memory database. Pinned to one connection that never
    /// expires, since every SQLite memory connection is its own database.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("invalid in-memory database url")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("failed to open in-memory database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a trivial query to prove the store answers.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection. Pending acquires fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(target: "catalog-db", "database pool closed");
    }
}

/// Connect and ping until the store answers or the retry budget runs out.
pub async fn wait_for_ready(settings: &DatabaseSettings) -> anyhow::Result<Db> {
    let max_retries = settings.connect_max_retries.max(1);
    let interval = Duration::from_millis(settings.connect_retry_interval_ms);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match Db::connect(settings).await {
            Ok(db) => db.ping().await.map(|_| db).map_err(anyhow::Error::from),
            Err(err) => Err(err),
        };

        match result {
            Ok(db) => {
                tracing::info!(target: "catalog-db", attempt, "database connection established");
                return Ok(db);
            }
            Err(err) if attempt < max_retries => {
                tracing::warn!(
                    target: "catalog-db",
                    attempt,
                    max_retries,
                    error = %err,
                    "waiting for database"
                );
                tokio::time::sleep(interval).await;
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("database unavailable after {} attempts", max_retries)
                });
            }
        }
    }
}
