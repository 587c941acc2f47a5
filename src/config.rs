use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "LSP__";
/// Upper bound for any cache TTL (30 days)
pub const MAX_CACHE_TTL_SECONDS: u64 = 30 * 24 * 3600;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub models: ModelsConfig,
    pub cache: CacheConfig,
    pub sources: SourcesConfig,
    pub predictions: PredictionsConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            allowed_origins: Vec::new(),
            request_timeout_secs: 30,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// A caller allowed to use the prediction API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiClient {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub clients: Vec<ApiClient>,
}

impl AuthConfig {
    /// Client name for a presented bearer token
    pub fn client_for_token(&self, token: &str) -> Option<&str> {
        self.clients
            .iter()
            .find(|c| c.token == token)
            .map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding model and scaler artifacts
    pub path: PathBuf,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("models") }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON array of observed stage records imported at startup
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// TTL for any source entry without its own setting
    pub default_ttl_seconds: u64,
    pub prediction_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 300,
            prediction_ttl_seconds: 300,
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Unset falls back to `cache.default_ttl_seconds`
    pub weather_ttl_seconds: Option<u64>,
    pub grid_ttl_seconds: Option<u64>,
    pub historical_ttl_seconds: Option<u64>,
    pub random_seed: Option<u64>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            weather_ttl_seconds: None,
            grid_ttl_seconds: Some(120),
            historical_ttl_seconds: Some(3600),
            random_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionsConfig {
    pub max_batch: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub perturbation_probability: f64,
    pub random_seed: Option<u64>,
    /// Retention cap; the oldest predictions are evicted beyond it
    pub max_stored: usize,
}

impl Default for PredictionsConfig {
    fn default() -> Self {
        Self {
            max_batch: 10,
            default_page_size: 10,
            max_page_size: 100,
            perturbation_probability: 0.10,
            random_seed: None,
            max_stored: 10_000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// `path` (optional on disk) overlaid with `LSP__` environment variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let cfg: Config = figment.extract().context("Failed to load configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.predictions.perturbation_probability) {
            anyhow::bail!(
                "predictions.perturbation_probability must be within [0, 1], got {}",
                self.predictions.perturbation_probability
            );
        }
        if self.predictions.max_batch == 0
            || self.predictions.max_page_size == 0
            || self.predictions.max_stored == 0
        {
            anyhow::bail!(
                "predictions.max_batch, predictions.max_page_size and predictions.max_stored must be positive"
            );
        }
        let ttls = [
            ("cache.default_ttl_seconds", Some(self.cache.default_ttl_seconds)),
            ("cache.prediction_ttl_seconds", Some(self.cache.prediction_ttl_seconds)),
            ("sources.weather_ttl_seconds", self.sources.weather_ttl_seconds),
            ("sources.grid_ttl_seconds", self.sources.grid_ttl_seconds),
            ("sources.historical_ttl_seconds", self.sources.historical_ttl_seconds),
        ];
        for (name, ttl) in ttls {
            if let Some(secs) = ttl.filter(|secs| *secs > MAX_CACHE_TTL_SECONDS) {
                anyhow::bail!("{name} must be at most {MAX_CACHE_TTL_SECONDS}, got {secs}");
            }
        }
        if self.predictions.default_page_size > self.predictions.max_page_size {
            anyhow::bail!("predictions.default_page_size exceeds predictions.max_page_size");
        }
        if let Some(client) = self.auth.clients.iter().find(|c| c.token.trim().is_empty()) {
            anyhow::bail!("auth client '{}' has an empty token", client.name);
        }
        Ok(())
    }
}
