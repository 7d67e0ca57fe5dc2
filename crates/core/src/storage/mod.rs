pub mod metrics;
pub mod recommendations;
pub mod test_results;

use crate::config::Settings;
use crate::domain::recommendation::{NewRecommendation, RecommendationPage, RecommendationQuery};
use crate::domain::test_result::NewTestResult;
use anyhow::Context;
use self::metrics::Metrics;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use thiserror::Error;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Query(#[from] anyhow::Error),
}

/// Persistence seam used by the HTTP handlers. Each call performs one logical operation.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn insert_recommendation(&self, rec: &NewRecommendation) -> Result<i32, StoreError>;

    async fn list_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationPage, StoreError>;

    async fn insert_test_result(&self, result: &NewTestResult) -> Result<i32, StoreError>;

    async fn metrics(&self) -> Result<Metrics, StoreError>;
}

/// Postgres-backed store. Every operation checks out its own pooled connection, which goes
/// back to the pool when it is dropped on any exit path.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Option<PgPool>,
}

impl PgStore {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    /// Builds a lazily connecting pool so the service can start while the database is down.
    pub fn connect_lazy(settings: &Settings) -> anyhow::Result<Self> {
        let db_url = settings.require_database_url()?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(db_url)
            .context("invalid DATABASE_URL")?;
        Ok(Self::new(Some(pool)))
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    async fn conn(&self) -> Result<PoolConnection<Postgres>, StoreError> {
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("DATABASE_URL is not configured".to_string()))?;
        pool.acquire()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn insert_recommendation(&self, rec: &NewRecommendation) -> Result<i32, StoreError> {
        let mut conn = self.conn().await?;
        Ok(recommendations::insert(&mut conn, rec).await?)
    }

    async fn list_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationPage, StoreError> {
        let mut conn = self.conn().await?;
        Ok(recommendations::list(&mut conn, query).await?)
    }

    async fn insert_test_result(&self, result: &NewTestResult) -> Result<i32, StoreError> {
        let mut conn = self.conn().await?;
        Ok(test_results::insert(&mut conn, result).await?)
    }

    async fn metrics(&self) -> Result<Metrics, StoreError> {
        let mut conn = self.conn().await?;
        Ok(metrics::collect(&mut conn).await?)
    }
}
