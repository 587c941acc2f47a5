//! External signal sources
//!
//! Weather, grid and historical signals are consumed through async traits so
//! a live client can replace the synthetic feeds without touching callers.
//! [`DataSources::enrich`] fills whatever a request left out.

pub mod synthetic;

pub use synthetic::SyntheticSources;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::PredictionInput;

/// Current conditions at a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// National grid snapshot (MW)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStatus {
    pub demand: f64,
    pub generation: f64,
    /// `max(0, generation - demand)`
    pub available_capacity: f64,
    /// Energy availability factor
    pub eaf: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Averages observed at a location for one hour of the day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalAverages {
    pub avg_demand: f64,
    pub avg_generation: f64,
    pub avg_loadshedding_probability: f64,
    pub historical_stage: u8,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, location: &str) -> Result<WeatherReading>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GridSource: Send + Sync {
    async fn status(&self) -> Result<GridStatus>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoricalSource: Send + Sync {
    async fn averages(&self, location: &str, hour: u32) -> Result<HistoricalAverages>;
}

/// The three sources, as handed around in application state
#[derive(Clone)]
pub struct DataSources {
    pub weather: Arc<dyn WeatherSource>,
    pub grid: Arc<dyn GridSource>,
    pub historical: Arc<dyn HistoricalSource>,
}

impl DataSources {
    pub fn new(
        weather: Arc<dyn WeatherSource>,
        grid: Arc<dyn GridSource>,
        historical: Arc<dyn HistoricalSource>,
    ) -> Self {
        Self { weather, grid, historical }
    }

    /// One synthetic feed serving all three roles
    pub fn synthetic(feed: Arc<SyntheticSources>) -> Self {
        Self {
            weather: feed.clone(),
            grid: feed.clone(),
            historical: feed,
        }
    }

    /// Fill missing signals from the sources
    ///
    /// Only sources with something to contribute are queried. A failing
    /// source leaves its fields empty; the resolver defaults them later.
    pub async fn enrich(&self, mut input: PredictionInput) -> PredictionInput {
        let needs_weather =
            input.temperature.is_none() || input.humidity.is_none() || input.wind_speed.is_none();
        let needs_grid = input.demand_forecast.is_none() || input.generation_capacity.is_none();
        let needs_history = input.historical_avg.is_none();
        let hour = input.timestamp.hour();

        let (weather, grid, history) = tokio::join!(
            async {
                if needs_weather {
                    Some(self.weather.current(&input.location).await)
                } else {
                    None
                }
            },
            async {
                if needs_grid {
                    Some(self.grid.status().await)
                } else {
                    None
                }
            },
            async {
                if needs_history {
                    Some(self.historical.averages(&input.location, hour).await)
                } else {
                    None
                }
            },
        );

        match weather {
            Some(Ok(w)) => {
                input.temperature.get_or_insert(w.temperature);
                input.humidity.get_or_insert(w.humidity);
                input.wind_speed.get_or_insert(w.wind_speed);
            }
            Some(Err(e)) => warn!(location = %input.location, error = %e, "weather source failed"),
            None => {}
        }

        match grid {
            Some(Ok(g)) => {
                input.demand_forecast.get_or_insert(g.demand);
                input.generation_capacity.get_or_insert(g.generation);
            }
            Some(Err(e)) => warn!(error = %e, "grid source failed"),
            None => {}
        }

        match history {
            Some(Ok(h)) => {
                input.historical_avg.get_or_insert(h.historical_stage as f64);
            }
            Some(Err(e)) => warn!(location = %input.location, hour, error = %e, "historical source failed"),
            None => {}
        }

        debug!(location = %input.location, needs_weather, needs_grid, needs_history, "input enriched");
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn reading() -> WeatherReading {
        WeatherReading {
            temperature: 30.0,
            humidity: 50.0,
            wind_speed: 4.0,
            description: "clear sky".to_string(),
            timestamp: Utc::now(),
            source: "test".to_string(),
        }
    }

    fn grid() -> GridStatus {
        GridStatus {
            demand: 33_000.0,
            generation: 29_000.0,
            available_capacity: 0.0,
            eaf: 0.7,
            timestamp: Utc::now(),
            source: "test".to_string(),
        }
    }

    fn history() -> HistoricalAverages {
        HistoricalAverages {
            avg_demand: 31_000.0,
            avg_generation: 29_000.0,
            avg_loadshedding_probability: 0.4,
            historical_stage: 3,
        }
    }

    fn input() -> PredictionInput {
        let ts = DateTime::parse_from_rfc3339("2024-06-12T18:00:00+02:00").unwrap();
        PredictionInput::new("Soweto", ts)
    }

    #[tokio::test]
    async fn test_enrich_fills_missing_fields() {
        let mut weather = MockWeatherSource::new();
        weather.expect_current().times(1).returning(|_| Ok(reading()));
        let mut grid_src = MockGridSource::new();
        grid_src.expect_status().times(1).returning(|| Ok(grid()));
        let mut hist = MockHistoricalSource::new();
        hist.expect_averages()
            .withf(|loc, hour| loc.to_string() == "Soweto" && *hour == 18)
            .times(1)
            .returning(|_, _| Ok(history()));

        let sources = DataSources::new(Arc::new(weather), Arc::new(grid_src), Arc::new(hist));
        let enriched = sources
            .enrich(PredictionInput { temperature: Some(12.0), ..input() })
            .await;
        assert_eq!(enriched.temperature, Some(12.0), "present values win");
        assert_eq!(enriched.humidity, Some(50.0));
        assert_eq!(enriched.wind_speed, Some(4.0));
        assert_eq!(enriched.demand_forecast, Some(33_000.0));
        assert_eq!(enriched.generation_capacity, Some(29_000.0));
        assert_eq!(enriched.historical_avg, Some(3.0));
    }

    #[tokio::test]
    async fn test_zero_values_are_not_replaced() {
        let weather = MockWeatherSource::new();
        let mut grid_src = MockGridSource::new();
        grid_src.expect_status().never();
        let hist = MockHistoricalSource::new();

        let sources = DataSources::new(Arc::new(weather), Arc::new(grid_src), Arc::new(hist));
        let full = input()
            .with_weather(0.0, 0.0, 0.0)
            .with_grid(0.0, 0.0)
            .with_historical_avg(0.0);
        let enriched = sources.enrich(full.clone()).await;
        assert_eq!(enriched, full);
    }

    #[tokio::test]
    async fn test_failing_source_leaves_fields_empty() {
        let mut weather = MockWeatherSource::new();
        weather
            .expect_current()
            .returning(|_| Err(anyhow::anyhow!("upstream timeout")));
        let mut grid_src = MockGridSource::new();
        grid_src.expect_status().returning(|| Ok(grid()));
        let mut hist = MockHistoricalSource::new();
        hist.expect_averages().returning(|_, _| Err(anyhow::anyhow!("no data")));

        let sources = DataSources::new(Arc::new(weather), Arc::new(grid_src), Arc::new(hist));
        let enriched = sources.enrich(input()).await;
        assert_eq!(enriched.temperature, None);
        assert_eq!(enriched.historical_avg, None);
        assert_eq!(enriched.demand_forecast, Some(33_000.0));
    }
}
