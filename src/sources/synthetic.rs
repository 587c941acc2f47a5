//! Synthetic signal feeds
//!
//! Plausible South African grid and weather values drawn from a seedable
//! generator. Every reading reads and writes through the shared cache so
//! repeated lookups inside the TTL stay stable.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{GridSource, GridStatus, HistoricalAverages, HistoricalSource, WeatherReading, WeatherSource};
use crate::cache::{get_json, set_json, CacheStore};
use crate::config::SourcesConfig;
use crate::domain::round_to;

pub const SOURCE_TAG: &str = "synthetic";

/// Hours treated as peaks when generating history
pub const HISTORY_PEAK_HOURS: [u32; 7] = [7, 8, 9, 17, 18, 19, 20];

const DESCRIPTIONS: [&str; 4] = ["clear sky", "few clouds", "scattered clouds", "overcast"];
const PEAK_STAGES: [u8; 5] = [0, 1, 2, 3, 4];
const OFF_PEAK_STAGES: [u8; 4] = [0, 0, 1, 2];

pub fn weather_key(location: &str) -> String {
    format!("weather:{location}")
}

pub const GRID_KEY: &str = "grid:status";

pub fn historical_key(location: &str, hour: u32) -> String {
    format!("historical:{location}:{hour}")
}

pub struct SyntheticSources {
    cache: Arc<dyn CacheStore>,
    rng: Mutex<StdRng>,
    weather_ttl: Duration,
    grid_ttl: Duration,
    historical_ttl: Duration,
}

impl SyntheticSources {
    /// `default_ttl` applies to every source without its own TTL setting
    pub fn new(cache: Arc<dyn CacheStore>, cfg: &SourcesConfig, default_ttl: Duration) -> Self {
        let rng = match cfg.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            cache,
            rng: Mutex::new(rng),
            weather_ttl: cfg.weather_ttl_seconds.map_or(default_ttl, Duration::from_secs),
            grid_ttl: cfg.grid_ttl_seconds.map_or(default_ttl, Duration::from_secs),
            historical_ttl: cfg.historical_ttl_seconds.map_or(default_ttl, Duration::from_secs),
        }
    }

    fn generate_weather(&self, location: &str) -> WeatherReading {
        let base = if location.to_lowercase().contains("cape town") { 22.0 } else { 25.0 };
        let mut rng = self.rng.lock();
        WeatherReading {
            temperature: round_to(base + rng.gen_range(-5.0..=8.0), 1),
            humidity: rng.gen_range(45..=85) as f64,
            wind_speed: round_to(rng.gen_range(2.0..=15.0), 1),
            description: DESCRIPTIONS.choose(&mut *rng).copied().unwrap_or("clear sky").to_string(),
            timestamp: Utc::now(),
            source: SOURCE_TAG.to_string(),
        }
    }

    fn generate_grid(&self) -> GridStatus {
        let mut rng = self.rng.lock();
        let demand = rng.gen_range(28_000..=35_000) as f64;
        let generation = rng.gen_range(25_000..=32_000) as f64;
        GridStatus {
            demand,
            generation,
            available_capacity: (generation - demand).max(0.0),
            eaf: round_to(rng.gen_range(0.65..=0.85), 3),
            timestamp: Utc::now(),
            source: SOURCE_TAG.to_string(),
        }
    }

    fn generate_history(&self, hour: u32) -> HistoricalAverages {
        let peak = HISTORY_PEAK_HOURS.contains(&hour);
        let mut rng = self.rng.lock();
        if peak {
            HistoricalAverages {
                avg_demand: rng.gen_range(30_000..=34_000) as f64,
                avg_generation: rng.gen_range(27_000..=31_000) as f64,
                avg_loadshedding_probability: rng.gen_range(0.2..=0.7),
                historical_stage: PEAK_STAGES.choose(&mut *rng).copied().unwrap_or(0),
            }
        } else {
            HistoricalAverages {
                avg_demand: rng.gen_range(25_000..=29_000) as f64,
                avg_generation: rng.gen_range(26_000..=30_000) as f64,
                avg_loadshedding_probability: rng.gen_range(0.1..=0.4),
                historical_stage: OFF_PEAK_STAGES.choose(&mut *rng).copied().unwrap_or(0),
            }
        }
    }
}

#[async_trait]
impl WeatherSource for SyntheticSources {
    async fn current(&self, location: &str) -> Result<WeatherReading> {
        let key = weather_key(location);
        if let Some(cached) = get_json(self.cache.as_ref(), &key) {
            return Ok(cached);
        }
        let reading = self.generate_weather(location);
        debug!(location, temperature = reading.temperature, "synthetic weather generated");
        set_json(self.cache.as_ref(), &key, &reading, self.weather_ttl);
        Ok(reading)
    }
}

#[async_trait]
impl GridSource for SyntheticSources {
    async fn status(&self) -> Result<GridStatus> {
        if let Some(cached) = get_json(self.cache.as_ref(), GRID_KEY) {
            return Ok(cached);
        }
        let status = self.generate_grid();
        debug!(demand = status.demand, generation = status.generation, "synthetic grid status generated");
        set_json(self.cache.as_ref(), GRID_KEY, &status, self.grid_ttl);
        Ok(status)
    }
}

#[async_trait]
impl HistoricalSource for SyntheticSources {
    async fn averages(&self, location: &str, hour: u32) -> Result<HistoricalAverages> {
        if hour > 23 {
            anyhow::bail!("hour of day out of range: {hour}");
        }
        let key = historical_key(location, hour);
        if let Some(cached) = get_json(self.cache.as_ref(), &key) {
            return Ok(cached);
        }
        let averages = self.generate_history(hour);
        set_json(self.cache.as_ref(), &key, &averages, self.historical_ttl);
        Ok(averages)
    }
}
