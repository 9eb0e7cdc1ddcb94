use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cache::{CacheStore, MemoryCacheStore, PgCacheStore, ResolutionCache, RestCacheStore};
use crate::config::{CacheBackend, ResolverConfig};
use crate::db::{create_pool, ensure_cache_schema};
use crate::directory::{DirectoryClient, HttpDirectoryClient, RetryingDirectoryClient};
use crate::resolution::{
    enrich_companies, BatchContext, BatchOutcome, BatchSummary, CompanyQuery,
    ResolutionOrchestrator, TieredResolver,
};
use crate::telemetry::init_tracing;

/// Everything an enrichment pipeline needs to resolve companies, built once at startup.
#[derive(Clone)]
pub struct ResolverState {
    pub orchestrator: Arc<ResolutionOrchestrator>,
    pub config: ResolverConfig,
}

impl ResolverState {
    /// Installs logging at `config.rust_log` (unless the host already did) and
    /// wires the directory client, cache store and orchestrator.
    pub async fn from_config(config: ResolverConfig) -> Result<Self> {
        init_tracing(&config.rust_log);

        let http = HttpDirectoryClient::new(
            &config.directory_api_url,
            config.directory_api_key.clone(),
            config.directory_fallback_url.as_deref(),
            config.directory_timeout,
        )?;
        let directory: Arc<dyn DirectoryClient> =
            Arc::new(RetryingDirectoryClient::new(http, config.retry.clone()));
        info!("Directory client initialized ({})", config.directory_api_url);

        let store = build_store(&config).await?;
        let cache = ResolutionCache::new(store, config.settings.negative_ttl);
        let resolver = TieredResolver::new(directory, config.settings.clone());
        let orchestrator = Arc::new(ResolutionOrchestrator::new(
            cache,
            resolver,
            config.settings.clone(),
        ));

        info!(
            "Company resolver ready (threshold: {}, negative TTL: {} days, fallback tier: {})",
            config.settings.confidence_threshold,
            config.settings.negative_ttl.num_days(),
            config.settings.allow_fallback_tier
        );
        Ok(Self {
            orchestrator,
            config,
        })
    }

    /// Runs one enrichment batch at the configured concurrency.
    pub async fn enrich(
        &self,
        queries: Vec<CompanyQuery>,
        ctx: &mut BatchContext,
    ) -> (Vec<BatchOutcome>, BatchSummary) {
        enrich_companies(
            &self.orchestrator,
            queries,
            ctx,
            self.config.batch_concurrency,
        )
        .await
    }
}

async fn build_store(config: &ResolverConfig) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match &config.cache_backend {
        CacheBackend::Rest { url, api_key } => {
            info!("Using REST cache store at {url}");
            Arc::new(RestCacheStore::new(
                url,
                api_key.clone(),
                &config.cache_table,
                config.cache_timeout,
            )?)
        }
        CacheBackend::Postgres { database_url } => {
            let pool = create_pool(database_url).await?;
            let store = PgCacheStore::new(pool.clone(), &config.cache_table)?;
            ensure_cache_schema(&pool, &config.cache_table).await?;
            Arc::new(store)
        }
        CacheBackend::Memory => {
            info!("Using in-memory cache store; resolutions will not survive restarts");
            Arc::new(MemoryCacheStore::new())
        }
    };
    Ok(store)
}
