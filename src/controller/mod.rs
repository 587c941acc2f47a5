use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, DisabledCache, MemoryCache};
use crate::config::Config;
use crate::domain::PredictionInput;
use crate::ml::ModelRegistry;
use crate::predictor::{PredictionResolver, RuleBasedEstimator};
use crate::repo::{HistoricalStore, PredictionRecord, Repositories};
use crate::sources::{DataSources, SyntheticSources};

/// Everything a request handler needs, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub resolver: Arc<PredictionResolver>,
    pub sources: DataSources,
    pub repos: Arc<Repositories>,
    pub cache: Arc<dyn CacheStore>,
    /// Concrete handle for expiry sweeps; `None` when caching is disabled
    memory_cache: Option<Arc<MemoryCache>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Load model artifacts from `cfg.models.path` and wire the services
    pub fn new(cfg: Config) -> Result<Self> {
        let registry = ModelRegistry::load(&cfg.models.path);
        info!(
            models = registry.models().len(),
            scaler = registry.scaler().is_some(),
            "model registry ready"
        );
        Self::with_registry(cfg, registry)
    }

    pub fn with_registry(cfg: Config, registry: ModelRegistry) -> Result<Self> {
        cfg.validate()?;

        let memory_cache = cfg.cache.enabled.then(|| Arc::new(MemoryCache::new()));
        let cache: Arc<dyn CacheStore> = match &memory_cache {
            Some(mem) => mem.clone(),
            None => {
                warn!("cache disabled, every prediction will be resolved from scratch");
                Arc::new(DisabledCache)
            }
        };

        let resolver = PredictionResolver::new(Arc::new(registry), cache.clone())
            .with_seed(cfg.predictions.random_seed)
            .with_estimator(RuleBasedEstimator::with_perturbation_probability(
                cfg.predictions.perturbation_probability,
            ))
            .with_result_ttl(Duration::from_secs(cfg.cache.prediction_ttl_seconds));

        let sources = DataSources::synthetic(Arc::new(SyntheticSources::new(
            cache.clone(),
            &cfg.sources,
            Duration::from_secs(cfg.cache.default_ttl_seconds),
        )));

        let mut repos = Repositories::new(cfg.predictions.max_stored);
        if let Some(path) = &cfg.history.seed_file {
            repos = repos.with_history(HistoricalStore::load_json(path)?);
            info!(path = %path.display(), "historical records imported");
        }

        Ok(Self {
            cfg: Arc::new(cfg),
            resolver: Arc::new(resolver),
            sources,
            repos: Arc::new(repos),
            cache,
            memory_cache,
            started_at: Utc::now(),
        })
    }

    /// Enrich, resolve and store one prediction for `owner`
    pub async fn predict(&self, owner: &str, input: PredictionInput) -> PredictionRecord {
        let enriched = self.sources.enrich(input).await;
        let result = self.resolver.predict(&enriched);
        let record = PredictionRecord::new(owner, enriched, &result);
        self.repos.predictions.insert(record).await
    }

    /// Resolve several inputs and store them together
    pub async fn predict_batch(&self, owner: &str, inputs: Vec<PredictionInput>) -> Vec<PredictionRecord> {
        let enriched = join_all(inputs.into_iter().map(|input| self.sources.enrich(input))).await;
        let records = enriched
            .into_iter()
            .map(|input| {
                let result = self.resolver.predict(&input);
                PredictionRecord::new(owner, input, &result)
            })
            .collect();
        self.repos.predictions.insert_batch(records).await
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

/// Background maintenance: periodic removal of expired cache entries
pub fn spawn_controller_tasks(state: &AppState) {
    let Some(cache) = state.memory_cache.clone() else {
        return;
    };
    let every = Duration::from_secs(state.cfg.cache.sweep_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = cache.len(), "expired cache entries removed");
            }
        }
    });
}
