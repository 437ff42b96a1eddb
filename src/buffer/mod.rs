use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// 160-bit fingerprint of a raw key-text (SHA-256 truncated).
type Fingerprint = [u8; 20];

fn fingerprint(text: &str) -> Fingerprint {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[..20]);
    out
}

/// Accumulates unmatched key-texts until the committee trigger threshold.
///
/// Guarantees: no duplicate sample across the lifetime of a run, at most one
/// outstanding locked batch, FIFO order within samples.
pub struct DiversityBuffer {
    size_threshold: usize,
    max_per_micro_batch: usize,
    samples: Vec<String>,
    seen: HashSet<Fingerprint>,
    locked: bool,
}

impl DiversityBuffer {
    pub fn new(size_threshold: usize, max_per_micro_batch: usize) -> Self {
        Self {
            size_threshold: size_threshold.max(1),
            max_per_micro_batch: max_per_micro_batch.max(1),
            samples: Vec::new(),
            seen: HashSet::new(),
            locked: false,
        }
    }

    /// Admit misses not seen before, in arrival order, up to the per-batch
    /// cap. Duplicates inside `misses` collapse to their first occurrence.
    pub fn pick_for_buffer(&self, misses: &[String]) -> Vec<String> {
        let mut picked = Vec::new();
        let mut batch_seen = HashSet::new();
        for miss in misses {
            if picked.len() >= self.max_per_micro_batch {
                break;
            }
            let fp = fingerprint(miss);
            if self.seen.contains(&fp) || !batch_seen.insert(fp) {
                continue;
            }
            picked.push(miss.clone());
        }
        picked
    }

    /// Extend the buffer with picked samples. Re-checks the fingerprint so
    /// the `|samples| == |seen|` invariant holds even on misuse.
    pub fn add(&mut self, picked: Vec<String>) {
        for sample in picked {
            let fp = fingerprint(&sample);
            if self.seen.insert(fp) {
                self.samples.push(sample);
            }
        }
    }

    pub fn reached_threshold(&self) -> bool {
        !self.locked && self.samples.len() >= self.size_threshold
    }

    /// Lock the buffer against further threshold firing and return a copy of
    /// the accumulated samples.
    pub fn snapshot_and_lock(&mut self) -> Vec<String> {
        self.locked = true;
        self.samples.clone()
    }

    /// Clear the locked batch and re-arm the threshold.
    pub fn clear_locked_batch(&mut self) {
        self.samples.clear();
        self.seen.clear();
        self.locked = false;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
