use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::info;
use tokio_postgres::NoTls;

use crate::config::DatabaseSettings;
use crate::error::{QueryError, Result};

/// Warehouse client with connection pooling.
///
/// Every query checks a connection out of a `deadpool-postgres` pool and
/// returns it when the pooled object is dropped, on success and failure
/// alike. There are no retries: a failed checkout or statement surfaces as
/// [`QueryError::QueryExecution`].
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    pub async fn new(settings: &DatabaseSettings) -> Result<Self> {
        info!("Connecting to warehouse at {}", settings.redacted_url());

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.name);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(settings.max_connections())
            .build()
            .map_err(|e| QueryError::execution("Failed to create warehouse connection pool", e))?;

        let client = Self { pool };

        // Fail fast on bad credentials instead of at the first query
        client.health_check().await?;
        info!(
            "Successfully connected to warehouse (max {} connections)",
            settings.max_connections()
        );

        Ok(client)
    }

    /// Verify a connection can be checked out and used.
    pub async fn health_check(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| QueryError::execution("Failed to acquire warehouse connection", e))?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| QueryError::execution("Warehouse health check failed", e))?;
        Ok(())
    }
}
