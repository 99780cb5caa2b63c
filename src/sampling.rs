//! Deterministic example sampling.
//!
//! Builds a set of instances for a learning problem from a short list of
//! known positives and a larger pool of candidate records: a third of the
//! instance budget is taken from the end of the positives list and the rest
//! is drawn at random from the pool. The same seed always yields the same
//! sample.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::LearningProblem;
use crate::error::{ClientError, Result};

/// Default number of instances per sample.
pub const DEFAULT_INSTANCES: usize = 10;

/// A sampled instance set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Distinct positives taken into the sample, last known positive first.
    pub positives: Vec<String>,
    /// Every sampled instance, positives first, without duplicates.
    pub instances: Vec<String>,
}

impl Sample {
    /// Instances that are not sampled positives.
    pub fn others(&self) -> Vec<&str> {
        self.instances
            .iter()
            .filter(|i| !self.positives.contains(i))
            .map(String::as_str)
            .collect()
    }

    /// Learning problem with the sampled positives against the remaining
    /// instances.
    pub fn into_problem(self) -> LearningProblem {
        let negatives: Vec<String> = self.others().into_iter().map(str::to_string).collect();
        LearningProblem::new(self.positives, negatives)
    }
}

/// Seeded sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleSampler {
    instances: usize,
    seed: u64,
}

impl ExampleSampler {
    pub fn new(instances: usize, seed: u64) -> Self {
        Self { instances, seed }
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// How many instances come from the known positives.
    pub fn positive_share(&self) -> usize {
        (self.instances as f64 / 3.0).round() as usize
    }

    /// Draw a sample.
    ///
    /// Makes up to `instances - positive_share` draws from `records`; a
    /// draw that repeats an instance already chosen is dropped, so the
    /// sample may come out smaller than the budget. Drawing stops early
    /// once every distinct record has been taken.
    pub fn sample(&self, positives: &[String], records: &[String]) -> Sample {
        let share = self.positive_share().min(self.instances);
        let mut chosen: Vec<String> = Vec::with_capacity(share.min(positives.len()));
        for positive in positives.iter().rev() {
            if chosen.len() == share {
                break;
            }
            if !chosen.contains(positive) {
                chosen.push(positive.clone());
            }
        }
        let mut instances = chosen.clone();

        let mut untaken = records
            .iter()
            .filter(|record| !chosen.contains(record))
            .collect::<HashSet<_>>()
            .len();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let draws = self.instances - share;
        let mut skipped = 0usize;
        for _ in 0..draws {
            if untaken == 0 {
                break;
            }
            let Some(record) = records.choose(&mut rng) else {
                break;
            };
            if instances.contains(record) {
                skipped += 1;
            } else {
                instances.push(record.clone());
                untaken -= 1;
            }
        }

        debug!(
            positives = chosen.len(),
            instances = instances.len(),
            skipped,
            seed = self.seed,
            "sampled instances"
        );

        Sample {
            positives: chosen,
            instances,
        }
    }
}

impl Default for ExampleSampler {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCES, 0)
    }
}

/// Read a record list: one identifier per line, blank lines ignored.
pub fn load_records(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| ClientError::storage(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
