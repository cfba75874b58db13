//! Postgres stores: retrieval tokens and processing status.

use crate::models::{Platform, ProcessingStatus, RetrievalToken};
use crate::services::keyed_lock::KeyedMutex;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
///
/// Writes to the token store are serialized per user and writes to the
/// status store per (user, resource), so concurrent crawl completions do
/// not interleave their read-modify-write sequences.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    locks: Arc<KeyedMutex>,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "crawler-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self {
            pool,
            locks: Arc::new(KeyedMutex::new()),
        })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Retrieval tokens
    // -------------------------------------------------------------------------

    /// Insert or replace the cursor for (user, service). The fresh cursor is
    /// marked `requires_update` so the background refresher picks it up once
    /// it ages past the overdue threshold.
    #[instrument(skip(self, token), fields(user_id = %user_id, service = service))]
    pub async fn upsert_retrieval_token(
        &self,
        user_id: Uuid,
        platform: &str,
        service: &str,
        token: &str,
    ) -> Result<RetrievalToken, AppError> {
        let _guard = self.locks.lock(&KeyedMutex::user_key(&user_id)).await;
        let started = std::time::Instant::now();

        let row = sqlx::query_as::<_, RetrievalToken>(
            r#"
            INSERT INTO retrieval_tokens (user_id, platform, service, retrieval_token, requires_update)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (user_id, service) DO UPDATE
                SET retrieval_token = EXCLUDED.retrieval_token,
                    platform = EXCLUDED.platform,
                    requires_update = TRUE,
                    updated_at = now()
            RETURNING id, user_id, platform, service, retrieval_token, requires_update, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .bind(service)
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert token: {}", e)))?;

        metrics::histogram!("crawler_db_query_duration_seconds", "operation" => "upsert_token")
            .record(started.elapsed().as_secs_f64());

        info!(service = service, "Retrieval token stored");
        Ok(row)
    }

    /// Delete every token the user holds on a platform (all its services).
    #[instrument(skip(self), fields(user_id = %user_id, platform = %platform))]
    pub async fn delete_retrieval_tokens(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<u64, AppError> {
        let _guard = self.locks.lock(&KeyedMutex::user_key(&user_id)).await;

        let result = sqlx::query(
            "DELETE FROM retrieval_tokens WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete tokens: {}", e)))?;

        Ok(result.rows_affected())
    }

    /// All tokens stored for a user, across platforms.
    pub async fn get_tokens_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RetrievalToken>, AppError> {
        let rows = sqlx::query_as::<_, RetrievalToken>(
            r#"
            SELECT id, user_id, platform, service, retrieval_token, requires_update, created_at, updated_at
            FROM retrieval_tokens
            WHERE user_id = $1
            ORDER BY service
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load tokens: {}", e)))?;

        Ok(rows)
    }

    /// Tokens across all users that are flagged for refresh and older than
    /// the overdue threshold.
    #[instrument(skip(self))]
    pub async fn get_overdue_tokens(
        &self,
        overdue_after_secs: i64,
    ) -> Result<Vec<RetrievalToken>, AppError> {
        let rows = sqlx::query_as::<_, RetrievalToken>(
            r#"
            SELECT id, user_id, platform, service, retrieval_token, requires_update, created_at, updated_at
            FROM retrieval_tokens
            WHERE requires_update
              AND updated_at < now() - ($1 * interval '1 second')
            ORDER BY updated_at
            "#,
        )
        .bind(overdue_after_secs as f64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load overdue tokens: {}", e))
        })?;

        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Processing status
    // -------------------------------------------------------------------------

    /// Record whether a resource has been processed. A freshly inserted row
    /// starts with `crawling_done = false`; the flag only flips via
    /// [`Database::set_crawling_done`] when the terminal signal arrives.
    #[instrument(skip(self), fields(user_id = %user_id, resource_id = resource_id))]
    pub async fn upsert_processing_status(
        &self,
        user_id: Uuid,
        resource_id: &str,
        platform: &str,
        is_processed: bool,
    ) -> Result<ProcessingStatus, AppError> {
        let _guard = self
            .locks
            .lock(&KeyedMutex::resource_key(&user_id, resource_id))
            .await;
        let started = std::time::Instant::now();

        let row = sqlx::query_as::<_, ProcessingStatus>(
            r#"
            INSERT INTO processing_status (user_id, resource_id, platform, is_processed, crawling_done)
            VALUES ($1, $2, $3, $4, FALSE)
            ON CONFLICT (user_id, resource_id) DO UPDATE
                SET is_processed = EXCLUDED.is_processed,
                    platform = EXCLUDED.platform,
                    updated_at = now()
            RETURNING id, user_id, resource_id, platform, is_processed, crawling_done, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(resource_id)
        .bind(platform)
        .bind(is_processed)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to upsert processing status: {}", e))
        })?;

        metrics::histogram!("crawler_db_query_duration_seconds", "operation" => "upsert_status")
            .record(started.elapsed().as_secs_f64());

        Ok(row)
    }

    /// Flip the crawl-done flag on every row of (user, platform).
    #[instrument(skip(self), fields(user_id = %user_id, platform = %platform))]
    pub async fn set_crawling_done(
        &self,
        user_id: Uuid,
        platform: Platform,
        done: bool,
    ) -> Result<u64, AppError> {
        let _guard = self.locks.lock(&KeyedMutex::user_key(&user_id)).await;

        let result = sqlx::query(
            r#"
            UPDATE processing_status
            SET crawling_done = $3, updated_at = now()
            WHERE user_id = $1 AND platform = $2
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(done)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set crawling done: {}", e))
        })?;

        Ok(result.rows_affected())
    }

    /// The processed map for (user, platform) plus whether the platform's
    /// crawl has fully completed. No rows means no crawl has run: not done.
    pub async fn get_processing_status(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<(HashMap<String, bool>, bool), AppError> {
        let rows = sqlx::query_as::<_, ProcessingStatus>(
            r#"
            SELECT id, user_id, resource_id, platform, is_processed, crawling_done, created_at, updated_at
            FROM processing_status
            WHERE user_id = $1 AND platform = $2
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load processing status: {}", e))
        })?;

        let crawling_done = !rows.is_empty() && rows.iter().all(|r| r.crawling_done);
        let map = rows
            .into_iter()
            .map(|r| (r.resource_id, r.is_processed))
            .collect();

        Ok((map, crawling_done))
    }

    /// Delete all processing rows for (user, platform).
    #[instrument(skip(self), fields(user_id = %user_id, platform = %platform))]
    pub async fn delete_processing_status(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<u64, AppError> {
        let _guard = self.locks.lock(&KeyedMutex::user_key(&user_id)).await;

        let result = sqlx::query(
            "DELETE FROM processing_status WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete processing status: {}", e))
        })?;

        Ok(result.rows_affected())
    }
}
