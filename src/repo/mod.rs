pub mod historical;
pub mod predictions;

pub use historical::{HistoricalQuery, HistoricalRecord, HistoricalStore};
pub use predictions::{PredictionRecord, PredictionStore};

use std::sync::Arc;

/// Stores shared by the API handlers
#[derive(Clone, Default)]
pub struct Repositories {
    pub predictions: Arc<PredictionStore>,
    pub historical: Arc<HistoricalStore>,
}

impl Repositories {
    /// Empty stores keeping at most `max_stored` predictions
    pub fn new(max_stored: usize) -> Self {
        Self {
            predictions: Arc::new(PredictionStore::new(max_stored)),
            historical: Arc::default(),
        }
    }

    pub fn with_history(mut self, historical: HistoricalStore) -> Self {
        self.historical = Arc::new(historical);
        self
    }
}
