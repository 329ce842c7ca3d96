//! Result caching.
//!
//! The pipeline holds no state of its own; a cache is handed to
//! `Pipeline::run_cached` by the caller. Keys combine a SHA-256
//! fingerprint of the dataset with the resolved request, so two requests
//! that resolve to the same parameters share an entry.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::Dataset;
use crate::request::{AnalysisParameters, AnalysisType};
use crate::result::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub dataset_fingerprint: String,
    pub analysis_type: AnalysisType,
    /// Canonical JSON of the resolved parameters.
    pub parameters: String,
}

impl CacheKey {
    pub fn new(dataset: &Dataset, analysis_type: AnalysisType, parameters: &AnalysisParameters) -> Self {
        Self {
            dataset_fingerprint: fingerprint(dataset),
            analysis_type,
            parameters: parameters.canonical_json(),
        }
    }
}

/// Implementations decide eviction and any in-flight de-duplication.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<AnalysisResult>;
    fn put(&self, key: CacheKey, result: AnalysisResult);
}

/// Unbounded map behind a mutex. Suitable for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<CacheKey, AnalysisResult>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<AnalysisResult> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: CacheKey, result: AnalysisResult) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, result);
        }
    }
}

/// Hex SHA-256 over each point's timestamp and value, in input order.
/// Missing values hash differently from every number.
pub fn fingerprint(dataset: &Dataset) -> String {
    let mut hasher = Sha256::new();
    for point in dataset.points() {
        hasher.update(point.timestamp().timestamp_millis().to_le_bytes());
        match point.value() {
            Some(v) => {
                hasher.update([1u8]);
                hasher.update(v.to_bits().to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    format!("{:x}", hasher.finalize())
}
