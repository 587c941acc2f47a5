use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ModelUsed, PredictionInput, PredictionResult};

/// A resolved prediction as kept for its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub owner: String,
    pub location: String,
    pub timestamp: DateTime<FixedOffset>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub demand_forecast: Option<f64>,
    pub generation_capacity: Option<f64>,
    pub historical_avg: Option<f64>,
    pub predicted_stage: u8,
    pub confidence_score: f64,
    pub model_used: ModelUsed,
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    /// Record for `owner` from the enriched input and its result
    pub fn new(owner: impl Into<String>, input: PredictionInput, result: &PredictionResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            location: input.location,
            timestamp: input.timestamp,
            temperature: input.temperature,
            humidity: input.humidity,
            wind_speed: input.wind_speed,
            demand_forecast: input.demand_forecast,
            generation_capacity: input.generation_capacity,
            historical_avg: input.historical_avg,
            predicted_stage: result.predicted_stage,
            confidence_score: result.confidence_score,
            model_used: result.model_used.clone(),
            created_at: Utc::now(),
        }
    }
}

pub const DEFAULT_MAX_STORED: usize = 10_000;

/// In-memory prediction history, scoped per owner
///
/// Holds at most `max_stored` records across all owners; inserting beyond
/// that evicts the oldest.
#[derive(Debug)]
pub struct PredictionStore {
    // insertion order == creation order
    records: RwLock<VecDeque<PredictionRecord>>,
    max_stored: usize,
}

impl Default for PredictionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STORED)
    }
}

impl PredictionStore {
    pub fn new(max_stored: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_stored: max_stored.max(1),
        }
    }

    pub async fn insert(&self, record: PredictionRecord) -> PredictionRecord {
        debug!(id = %record.id, owner = %record.owner, stage = record.predicted_stage, "prediction stored");
        let mut records = self.records.write().await;
        records.push_back(record.clone());
        self.evict_oldest(&mut records);
        record
    }

    /// Insert several records under one lock
    pub async fn insert_batch(&self, records: Vec<PredictionRecord>) -> Vec<PredictionRecord> {
        if records.is_empty() {
            return records;
        }
        let mut stored = self.records.write().await;
        stored.extend(records.iter().cloned());
        self.evict_oldest(&mut stored);
        debug!(count = records.len(), "prediction batch stored");
        records
    }

    fn evict_oldest(&self, records: &mut VecDeque<PredictionRecord>) {
        let excess = records.len().saturating_sub(self.max_stored);
        if excess > 0 {
            records.drain(..excess);
            debug!(evicted = excess, retained = records.len(), "oldest predictions evicted");
        }
    }

    /// Owner's records, newest first
    pub async fn list(&self, owner: &str, limit: usize, offset: usize) -> Vec<PredictionRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.owner == owner)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: Uuid, owner: &str) -> Option<PredictionRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id == id && r.owner == owner)
            .cloned()
    }

    /// Returns whether a record owned by `owner` was removed
    pub async fn delete(&self, id: Uuid, owner: &str) -> bool {
        let mut records = self.records.write().await;
        match records.iter().position(|r| r.id == id && r.owner == owner) {
            Some(idx) => {
                records.remove(idx);
                debug!(%id, owner, "prediction deleted");
                true
            }
            None => false,
        }
    }

    pub async fn count(&self, owner: &str) -> usize {
        self.records.read().await.iter().filter(|r| r.owner == owner).count()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}
