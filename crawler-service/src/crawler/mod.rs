//! Crawl orchestration.
//!
//! The orchestrator is connector-agnostic: it validates credentials, fans
//! one worker out per eligible service, joins them all, and only then emits
//! the platform's `<crawl_done>` marker and persists the workers' new
//! retrieval tokens. A worker that fails keeps its previous cursor so the
//! next refresh retries from known-good ground.

pub mod refresh;
pub mod validate;

use crate::bus::ChunkPublisher;
use crate::config::CrawlSettings;
use crate::connectors::http::bearer_client;
use crate::connectors::{connector_for, ConnectorContext, CrawlOutcome, Emitter};
use crate::models::{ChunkMetadata, Platform, RetrievalToken, Service, TextChunk};
use crate::services::{ChunkMapStore, Database, RateGovernor};
use futures::StreamExt;
use service_core::error::AppError;
use service_core::grpc::{retry_grpc_call, IntegrationClient, RetryConfig, VectorClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One unit of fan-out: a service plus the cursor to resume from, if any.
#[derive(Debug, Clone)]
struct CrawlJob {
    service: Service,
    cursor: Option<String>,
}

pub struct CrawlOrchestrator {
    db: Database,
    chunk_map: ChunkMapStore,
    publisher: ChunkPublisher,
    governor: Arc<RateGovernor>,
    integration: IntegrationClient,
    vector: VectorClient,
    settings: CrawlSettings,
    shutdown: CancellationToken,
}

impl CrawlOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        chunk_map: ChunkMapStore,
        publisher: ChunkPublisher,
        governor: Arc<RateGovernor>,
        integration: IntegrationClient,
        vector: VectorClient,
        settings: CrawlSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            db,
            chunk_map,
            publisher,
            governor,
            integration,
            vector,
            settings,
            shutdown,
        }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    fn emitter(&self) -> Emitter {
        Emitter::new(
            self.publisher.clone(),
            self.chunk_map.clone(),
            self.db.clone(),
        )
    }

    fn context(&self, user_id: Uuid, access_token: &str) -> Result<ConnectorContext, AppError> {
        Ok(ConnectorContext {
            user_id,
            access_token: access_token.to_string(),
            http: bearer_client(access_token)?,
            governor: self.governor.clone(),
            emitter: self.emitter(),
            cancel: self.shutdown.child_token(),
            fetch_workers: self.settings.fetch_workers,
            temp_dir: self.settings.temp_dir.clone(),
        })
    }

    /// Validate the token and run a full initial crawl for every connector
    /// the granted scopes allow. Returns the partial-failure report (empty
    /// when everything went through).
    pub async fn start_initial_crawl(
        &self,
        user_id: Uuid,
        access_token: &str,
        platform: Platform,
    ) -> Result<Vec<String>, AppError> {
        let scopes = validate::validate_token(platform, access_token).await?;
        let jobs = Self::jobs_for_scopes(platform, &scopes);
        if jobs.is_empty() {
            return Err(AppError::AuthInvalid(anyhow::anyhow!(
                "granted scopes allow no crawlable services on {}",
                platform
            )));
        }

        tracing::info!(
            user_id = %user_id,
            platform = %platform,
            workers = jobs.len(),
            "Starting initial crawl"
        );
        self.run_crawl(user_id, access_token, platform, jobs).await
    }

    /// Incremental refresh of one stored token, using a broker-issued
    /// access token.
    pub async fn refresh_token_row(&self, row: &RetrievalToken) -> Result<Vec<String>, AppError> {
        let platform = row.platform_enum().ok_or_else(|| {
            AppError::Malformed(anyhow::anyhow!("stored token has unknown platform: {}", row.platform))
        })?;
        let service = row.service_enum().ok_or_else(|| {
            AppError::Malformed(anyhow::anyhow!("stored token has unknown service: {}", row.service))
        })?;

        let access_token = self.broker_token(row.user_id, platform).await?;
        self.run_crawl(
            row.user_id,
            &access_token,
            platform,
            vec![CrawlJob {
                service,
                cursor: Some(row.retrieval_token.clone()),
            }],
        )
        .await
    }

    /// Manual refresh: every stored token for the user, grouped per
    /// platform so each platform gets a single crawl-done marker.
    pub async fn manual_refresh(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let tokens = self.db.get_tokens_by_user(user_id).await?;
        if tokens.is_empty() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "no retrieval tokens stored for user {}",
                user_id
            )));
        }

        let mut by_platform: Vec<(Platform, Vec<CrawlJob>)> = Vec::new();
        for row in &tokens {
            let (Some(platform), Some(service)) = (row.platform_enum(), row.service_enum())
            else {
                tracing::warn!(token_id = row.id, "Skipping token with unknown platform/service");
                continue;
            };
            let job = CrawlJob {
                service,
                cursor: Some(row.retrieval_token.clone()),
            };
            match by_platform.iter_mut().find(|(p, _)| *p == platform) {
                Some((_, jobs)) => jobs.push(job),
                None => by_platform.push((platform, vec![job])),
            }
        }

        let mut report = Vec::new();
        let mut platform_failures = Vec::new();
        let platform_count = by_platform.len();
        for (platform, jobs) in by_platform {
            let access_token = match self.broker_token(user_id, platform).await {
                Ok(token) => token,
                Err(e) => {
                    platform_failures.push(format!("{}: {}", platform, e));
                    continue;
                }
            };
            match self.run_crawl(user_id, &access_token, platform, jobs).await {
                Ok(mut platform_report) => report.append(&mut platform_report),
                Err(e) => platform_failures.push(format!("{}: {}", platform, e)),
            }
        }

        if platform_failures.len() == platform_count && platform_count > 0 {
            return Err(AppError::PartialFailure(platform_failures));
        }
        report.extend(platform_failures);
        Ok(report)
    }

    /// Refresh one platform now with a caller-supplied token: stored
    /// cursors when present, a fresh initial pass otherwise.
    pub async fn update_platform(
        &self,
        user_id: Uuid,
        access_token: &str,
        platform: Platform,
    ) -> Result<Vec<String>, AppError> {
        let scopes = validate::validate_token(platform, access_token).await?;

        let stored: Vec<RetrievalToken> = self
            .db
            .get_tokens_by_user(user_id)
            .await?
            .into_iter()
            .filter(|row| row.platform_enum() == Some(platform))
            .collect();

        let jobs = if stored.is_empty() {
            Self::jobs_for_scopes(platform, &scopes)
        } else {
            stored
                .iter()
                .filter_map(|row| {
                    row.service_enum().map(|service| CrawlJob {
                        service,
                        cursor: Some(row.retrieval_token.clone()),
                    })
                })
                .collect()
        };

        if jobs.is_empty() {
            return Err(AppError::AuthInvalid(anyhow::anyhow!(
                "granted scopes allow no crawlable services on {}",
                platform
            )));
        }
        self.run_crawl(user_id, access_token, platform, jobs).await
    }

    /// Drop all crawler state for (user, platform) and ask the vector
    /// service to delete the indexed files.
    pub async fn delete_user_data(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<(), AppError> {
        self.db.delete_retrieval_tokens(user_id, platform).await?;
        self.db.delete_processing_status(user_id, platform).await?;
        self.chunk_map.delete_document(user_id, platform).await?;

        let vector = self.vector.clone();
        let retry_config = RetryConfig::default();
        let deletion = retry_grpc_call(&retry_config, "vector.delete_files", || {
            let mut vector = vector.clone();
            let user = user_id.to_string();
            async move { vector.delete_files(&user, platform.as_str(), true).await }
        });
        let response = tokio::time::timeout(Duration::from_secs(30), deletion)
            .await
            .map_err(|_| AppError::Transport(anyhow::anyhow!("vector deletion timed out")))?
            .map_err(AppError::from)?;

        if !response.success {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "vector deletion failed: {}",
                response.message
            )));
        }

        tracing::info!(user_id = %user_id, platform = %platform, "Crawler data deleted");
        Ok(())
    }

    /// Resolve each metadata's short key and re-extract the chunk text,
    /// preserving request order, with bounded concurrency.
    pub async fn retrieve_chunks(
        &self,
        user_id: Uuid,
        platform: Platform,
        metadatas: Vec<ChunkMetadata>,
    ) -> Result<Vec<TextChunk>, AppError> {
        if metadatas.is_empty() {
            return Ok(Vec::new());
        }

        let access_token = self.broker_token(user_id, platform).await?;
        let ctx = self.context(user_id, &access_token)?;

        let total = metadatas.len();
        let results: Vec<(usize, Result<TextChunk, AppError>)> =
            futures::stream::iter(metadatas.into_iter().enumerate())
                .map(|(index, meta)| {
                    let ctx = ctx.clone();
                    let chunk_map = self.chunk_map.clone();
                    async move {
                        let outcome = Self::retrieve_one(&ctx, &chunk_map, platform, meta).await;
                        (index, outcome)
                    }
                })
                .buffer_unordered(self.settings.retrieval_workers.max(1))
                .collect()
                .await;

        let mut ordered: Vec<(usize, TextChunk)> = Vec::new();
        let mut failures = Vec::new();
        for (index, outcome) in results {
            match outcome {
                Ok(chunk) => ordered.push((index, chunk)),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Chunk retrieval failed");
                    failures.push(e.to_string());
                }
            }
        }

        if ordered.is_empty() && failures.len() == total {
            return Err(AppError::PartialFailure(failures));
        }

        ordered.sort_by_key(|(index, _)| *index);
        Ok(ordered.into_iter().map(|(_, chunk)| chunk).collect())
    }

    async fn retrieve_one(
        ctx: &ConnectorContext,
        chunk_map: &ChunkMapStore,
        platform: Platform,
        meta: ChunkMetadata,
    ) -> Result<TextChunk, AppError> {
        let mapping = chunk_map
            .resolve_short_key(ctx.user_id, platform, &meta.chunk_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("unknown chunk key: {}", meta.chunk_id))
            })?;

        let service: Service = mapping
            .service
            .parse()
            .map_err(|e: String| AppError::Malformed(anyhow::anyhow!(e)))?;
        let connector = connector_for(service);
        let content = connector
            .retrieve_chunk(ctx, &mapping.resource_id, &mapping.chunk_id)
            .await?;

        Ok(TextChunk {
            metadata: meta,
            content,
        })
    }

    /// Sweep overdue tokens and refresh each. Auth failures during refresh
    /// are logged and skipped rather than aborting the sweep.
    pub async fn refresh_overdue(&self) -> Result<usize, AppError> {
        let tokens = self
            .db
            .get_overdue_tokens(self.settings.token_overdue_secs)
            .await?;
        let count = tokens.len();

        for row in &tokens {
            match self.refresh_token_row(row).await {
                Ok(report) if report.is_empty() => {}
                Ok(report) => {
                    tracing::warn!(
                        user_id = %row.user_id,
                        service = %row.service,
                        skipped = report.len(),
                        "Refresh finished with skipped files"
                    );
                }
                Err(AppError::AuthInvalid(e)) => {
                    tracing::warn!(
                        user_id = %row.user_id,
                        service = %row.service,
                        error = %e,
                        "Skipping refresh for user with invalid credentials"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %row.user_id,
                        service = %row.service,
                        error = %e,
                        "Background refresh failed"
                    );
                }
            }
        }

        Ok(count)
    }

    fn jobs_for_scopes(platform: Platform, scopes: &[String]) -> Vec<CrawlJob> {
        platform
            .services()
            .iter()
            .filter(|service| match service.required_scope() {
                None => true,
                Some(fragment) => scopes.iter().any(|scope| scope.contains(fragment)),
            })
            .map(|service| CrawlJob {
                service: *service,
                cursor: None,
            })
            .collect()
    }

    async fn broker_token(&self, user_id: Uuid, platform: Platform) -> Result<String, AppError> {
        let integration = self.integration.clone();
        let response = retry_grpc_call(&RetryConfig::default(), "get_access_token", || {
            let mut integration = integration.clone();
            let user = user_id.to_string();
            async move {
                integration
                    .get_access_token(&user, platform.provider_name())
                    .await
            }
        })
        .await
        .map_err(AppError::from)?;
        Ok(response.access_token)
    }

    /// Fan the jobs out, join them all, then emit `<crawl_done>` and
    /// persist the new cursors if anything succeeded.
    async fn run_crawl(
        &self,
        user_id: Uuid,
        access_token: &str,
        platform: Platform,
        jobs: Vec<CrawlJob>,
    ) -> Result<Vec<String>, AppError> {
        let started = std::time::Instant::now();
        let mut set: JoinSet<(Service, Result<CrawlOutcome, AppError>)> = JoinSet::new();

        for job in jobs {
            let ctx = self.context(user_id, access_token)?;
            let connector = connector_for(job.service);
            set.spawn(async move {
                let result = match &job.cursor {
                    None => connector.initial(&ctx).await,
                    Some(cursor) => connector.incremental(&ctx, cursor).await,
                };
                (job.service, result)
            });
        }

        let mut successes: Vec<(Service, CrawlOutcome)> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((service, Ok(outcome))) => successes.push((service, outcome)),
                Ok((service, Err(e))) => {
                    tracing::error!(
                        user_id = %user_id,
                        service = %service,
                        error = %e,
                        "Crawl worker failed"
                    );
                    failures.push(format!("{}: {}", service, e));
                }
                Err(e) => failures.push(format!("worker panicked: {}", e)),
            }
        }

        if successes.is_empty() {
            metrics::counter!("crawler_crawls_total", "platform" => platform.as_str(), "outcome" => "failed")
                .increment(1);
            return Err(AppError::PartialFailure(failures));
        }

        // Every worker's file-done stream is complete; the platform marker
        // may now follow them onto the bus.
        let marker = ChunkMetadata {
            user_id,
            platform,
            service: successes[0].0,
            resource_id: String::new(),
            resource_type: String::new(),
            title: String::new(),
            file_url: String::new(),
            file_path: String::new(),
            date_created: None,
            date_last_modified: None,
            chunk_id: String::new(),
        };
        self.emitter().emit_crawl_done(&marker).await?;

        for (service, outcome) in &successes {
            self.db
                .upsert_retrieval_token(
                    user_id,
                    platform.as_str(),
                    service.as_str(),
                    &outcome.token,
                )
                .await?;
        }

        metrics::counter!("crawler_crawls_total", "platform" => platform.as_str(), "outcome" => "ok")
            .increment(1);
        metrics::histogram!("crawler_crawl_duration_seconds", "platform" => platform.as_str())
            .record(started.elapsed().as_secs_f64());

        let mut report = failures;
        for (service, outcome) in &successes {
            report.extend(
                outcome
                    .file_errors
                    .iter()
                    .map(|e| format!("{}: {}", service, e)),
            );
        }

        tracing::info!(
            user_id = %user_id,
            platform = %platform,
            duration_ms = started.elapsed().as_millis(),
            skipped_files = report.len(),
            "Crawl complete"
        );
        Ok(report)
    }
}
