use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_HISTORICAL_LIMIT: usize = 100;
pub const MAX_HISTORICAL_LIMIT: usize = 1000;

/// An observed stage with the conditions at the time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub date_time: DateTime<Utc>,
    pub location: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub demand: Option<f64>,
    #[serde(default)]
    pub generation: Option<f64>,
    #[serde(default)]
    pub available_capacity: Option<f64>,
    pub actual_stage: u8,
}

impl HistoricalRecord {
    pub fn new(location: impl Into<String>, date_time: DateTime<Utc>, actual_stage: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            date_time,
            location: location.into(),
            temperature: None,
            humidity: None,
            wind_speed: None,
            demand: None,
            generation: None,
            available_capacity: None,
            actual_stage,
        }
    }
}

/// Filter for [`HistoricalStore::query`]
#[derive(Debug, Clone, Default)]
pub struct HistoricalQuery {
    /// Case-insensitive substring match
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Defaults to 100, capped at 1000
    pub limit: Option<usize>,
}

#[derive(Debug, Default)]
pub struct HistoricalStore {
    records: RwLock<Vec<HistoricalRecord>>,
}

impl HistoricalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<HistoricalRecord>) -> Self {
        Self { records: RwLock::new(records) }
    }

    /// Read a JSON array of records, e.g. an export of observed stages
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read historical data {}", path.display()))?;
        let records: Vec<HistoricalRecord> = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse historical data {}", path.display()))?;
        if let Some(bad) = records.iter().find(|r| r.actual_stage > 8) {
            anyhow::bail!("historical record {} has stage {} outside 0..=8", bad.id, bad.actual_stage);
        }
        Ok(Self::with_records(records))
    }

    pub async fn insert(&self, record: HistoricalRecord) {
        self.records.write().await.push(record);
    }

    pub async fn extend(&self, records: impl IntoIterator<Item = HistoricalRecord>) {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.extend(records);
        debug!(added = guard.len() - before, "historical records loaded");
    }

    /// Matching records, newest first
    pub async fn query(&self, q: &HistoricalQuery) -> Vec<HistoricalRecord> {
        let limit = q.limit.unwrap_or(DEFAULT_HISTORICAL_LIMIT).min(MAX_HISTORICAL_LIMIT);
        let needle = q.location.as_ref().map(|l| l.to_lowercase());

        let mut matched: Vec<HistoricalRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|r| {
                needle
                    .as_ref()
                    .map_or(true, |n| r.location.to_lowercase().contains(n.as_str()))
            })
            .filter(|r| q.start.map_or(true, |s| r.date_time >= s))
            .filter(|r| q.end.map_or(true, |e| r.date_time <= e))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.date_time.cmp(&a.date_time));
        matched.truncate(limit);
        matched
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn seeded() -> HistoricalStore {
        let store = HistoricalStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let records = (0..48).map(|h| {
            let loc = if h % 2 == 0 { "Cape Town" } else { "Johannesburg" };
            HistoricalRecord::new(loc, t0 + Duration::hours(h), (h % 5) as u8)
        });
        store.extend(records).await;
        store
    }

    #[tokio::test]
    async fn test_location_filter_is_case_insensitive_substring() {
        let store = seeded().await;
        let rows = store
            .query(&HistoricalQuery { location: Some("cape".into()), limit: Some(1000), ..Default::default() })
            .await;
        assert_eq!(rows.len(), 24);
        assert!(rows.iter().all(|r| r.location == "Cape Town"));
    }

    #[tokio::test]
    async fn test_time_bounds_inclusive_and_newest_first() {
        let store = seeded().await;
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let rows = store
            .query(&HistoricalQuery { start: Some(start), end: Some(end), ..Default::default() })
            .await;
        let times: Vec<_> = rows.iter().map(|r| r.date_time).collect();
        assert_eq!(times, vec![end, end - Duration::hours(1), start]);
    }

    #[tokio::test]
    async fn test_limit_default_and_cap() {
        let store = HistoricalStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store
            .extend((0..1500).map(|h| HistoricalRecord::new("Durban", t0 + Duration::hours(h), 1)))
            .await;

        assert_eq!(store.query(&HistoricalQuery::default()).await.len(), DEFAULT_HISTORICAL_LIMIT);
        let capped = store
            .query(&HistoricalQuery { limit: Some(5000), ..Default::default() })
            .await;
        assert_eq!(capped.len(), MAX_HISTORICAL_LIMIT);
        assert_eq!(store.len().await, 1500);
    }

    #[tokio::test]
    async fn test_load_json_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"[
                {"date_time": "2024-06-01T18:00:00Z", "location": "Soweto", "actual_stage": 4, "demand": 33100.0},
                {"date_time": "2024-06-01T03:00:00Z", "location": "Soweto", "actual_stage": 0}
            ]"#,
        )
        .unwrap();

        let store = HistoricalStore::load_json(&path).unwrap();
        assert_eq!(store.len().await, 2);
        let rows = store.query(&HistoricalQuery::default()).await;
        assert_eq!(rows[0].actual_stage, 4);
        assert_eq!(rows[0].demand, Some(33_100.0));
        assert_eq!(rows[1].temperature, None);
    }

    #[test]
    fn test_load_json_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HistoricalStore::load_json(dir.path().join("missing.json")).is_err());

        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"[{"date_time": "2024-06-01T18:00:00Z", "location": "X", "actual_stage": 11}]"#)
            .unwrap();
        assert!(HistoricalStore::load_json(&path).is_err());
    }
}
