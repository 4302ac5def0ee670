//! # Checkpoints
//!
//! One JSON file per generation, written after the generation is ranked:
//!
//! ```text
//! {
//!   "result": { "mean": .., "min": .., "max": .. },
//!   "gen": [ { "name": .., "fitness": [FitnessRecord, ..], "config": Genome }, .. ]
//! }
//! ```
//!
//! Entries are ordered by descending aggregate fitness and the summary is
//! computed over each individual's aggregate `total`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result, ResultExt};
use crate::fitness::FitnessRecord;
use crate::gene::Genome;
use crate::individual::{Individual, UNEVALUATED_FITNESS};
use crate::selection::sort_by_fitness;

/// Mean, min and max of aggregate fitness across a generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl GenerationSummary {
    /// # Errors
    ///
    /// Returns `OptimizerError::EmptyPopulation` for an empty slice.
    pub fn from_scores(scores: &[f64]) -> Result<Self> {
        if scores.is_empty() {
            return Err(OptimizerError::EmptyPopulation);
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Ok(Self { mean, min, max })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub name: String,
    pub fitness: Vec<FitnessRecord>,
    pub config: Genome,
}

impl CheckpointEntry {
    /// Mean `total` over the entry's records.
    pub fn aggregate_fitness(&self) -> f64 {
        if self.fitness.is_empty() {
            return UNEVALUATED_FITNESS;
        }
        self.fitness.iter().map(|r| r.total).sum::<f64>() / self.fitness.len() as f64
    }
}

impl From<&Individual> for CheckpointEntry {
    fn from(individual: &Individual) -> Self {
        Self {
            name: individual.name.clone(),
            fitness: individual.fitness.clone(),
            config: individual.genome.clone(),
        }
    }
}

/// Immutable snapshot of one evaluated generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub result: GenerationSummary,
    #[serde(rename = "gen")]
    pub individuals: Vec<CheckpointEntry>,
}

impl Checkpoint {
    /// Snapshots an evaluated generation. The input order does not matter.
    pub fn from_generation(generation: &[Individual]) -> Result<Self> {
        let mut sorted = generation.to_vec();
        sort_by_fitness(&mut sorted);

        let scores: Vec<f64> = sorted.iter().map(Individual::aggregate_fitness).collect();

        Ok(Self {
            result: GenerationSummary::from_scores(&scores)?,
            individuals: sorted.iter().map(CheckpointEntry::from).collect(),
        })
    }

    /// `{dir}/{run_name}-gen{generation}.json`
    pub fn path_for(dir: &Path, run_name: &str, generation: usize) -> PathBuf {
        dir.join(format!("{}-gen{}.json", run_name, generation))
    }

    /// Aggregate fitness of each entry, in file order.
    pub fn scores(&self) -> Vec<f64> {
        self.individuals
            .iter()
            .map(CheckpointEntry::aggregate_fitness)
            .collect()
    }

    pub fn best(&self) -> Option<&CheckpointEntry> {
        self.individuals.first()
    }

    /// Writes the checkpoint, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(format!(
                "Failed to create checkpoint directory {}",
                parent.display()
            ))?;
        }

        let file = File::create(path).map_err(|e| {
            OptimizerError::Checkpoint(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            OptimizerError::Checkpoint(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
