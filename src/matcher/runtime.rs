use crate::matcher::index::CompiledIndex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("worker pool build error: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// Anything that can expose a key-text to the matcher.
pub trait KeyText {
    fn key_text(&self) -> &str;
}

impl KeyText for String {
    fn key_text(&self) -> &str {
        self
    }
}

impl KeyText for &str {
    fn key_text(&self) -> &str {
        self
    }
}

impl KeyText for crate::record::Record {
    fn key_text(&self) -> &str {
        &self.key_text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub is_hit: bool,
    pub template_id: Option<i64>,
    pub key_text: String,
}

impl MatchOutcome {
    fn new(key_text: &str, template_id: Option<i64>) -> Self {
        Self {
            is_hit: template_id.is_some(),
            template_id,
            key_text: key_text.to_string(),
        }
    }
}

/// Owns the match worker pools, one per requested width, created lazily.
///
/// The pipeline driver holds the single instance; dropping it joins every
/// pool's threads. Small batches run inline on the caller's thread.
pub struct MatcherRuntime {
    pools: Mutex<HashMap<usize, Arc<rayon::ThreadPool>>>,
}

impl Default for MatcherRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MatcherRuntime {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Match a batch against `index`, one result per input in input order.
    pub fn match_batch<T: KeyText + Sync>(
        &self,
        index: &CompiledIndex,
        records: &[T],
        workers: usize,
    ) -> Result<Vec<MatchOutcome>, MatcherError> {
        let workers = workers.max(1);
        if workers == 1 || records.len() <= 4 * workers {
            return Ok(records
                .iter()
                .map(|r| MatchOutcome::new(r.key_text(), index.match_one(r.key_text())))
                .collect());
        }

        // Look up each distinct key once, then scatter results back.
        let mut unique: Vec<&str> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for r in records {
            let key = r.key_text();
            if !positions.contains_key(key) {
                positions.insert(key, unique.len());
                unique.push(key);
            }
        }

        let pool = self.pool(workers)?;
        let resolved: Vec<Option<i64>> =
            pool.install(|| unique.par_iter().map(|k| index.match_one(k)).collect());

        Ok(records
            .iter()
            .map(|r| {
                let key = r.key_text();
                MatchOutcome::new(key, resolved[positions[key]])
            })
            .collect())
    }

    fn pool(&self, workers: usize) -> Result<Arc<rayon::ThreadPool>, MatcherError> {
        let mut pools = self.pools.lock().unwrap();
        if let Some(pool) = pools.get(&workers) {
            return Ok(pool.clone());
        }
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()?,
        );
        pools.insert(workers, pool.clone());
        Ok(pool)
    }
}
