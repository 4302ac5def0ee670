//! # Individual
//!
//! One candidate strategy configuration plus the fitness records it has
//! accumulated, one per evaluated environment.

use serde::{Deserialize, Serialize};

use crate::fitness::FitnessRecord;
use crate::gene::Genome;

/// Aggregate score reported for an individual that has no fitness records yet.
pub const UNEVALUATED_FITNESS: f64 = -1.0;

/// A candidate configuration and its fitness history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// Unique name, also used as the engine instance name.
    pub name: String,
    pub genome: Genome,
    /// One record per environment, in environment order.
    pub fitness: Vec<FitnessRecord>,
    /// Trials are complete; the scheduler skips this individual.
    pub has_run: bool,
}

impl Individual {
    pub fn new(name: impl Into<String>, genome: Genome) -> Self {
        Self {
            name: name.into(),
            genome,
            fitness: Vec::new(),
            has_run: false,
        }
    }

    /// The canonical name of individual `index` in generation `generation`.
    pub fn name_for(run_name: &str, generation: usize, index: usize) -> String {
        format!("{}-gen{}-ind{}", run_name, generation, index)
    }

    pub fn record(&mut self, record: FitnessRecord) {
        self.fitness.push(record);
    }

    /// Mean of `metric` across all fitness records.
    pub fn mean_by<F>(&self, metric: F) -> f64
    where
        F: Fn(&FitnessRecord) -> f64,
    {
        if self.fitness.is_empty() {
            return UNEVALUATED_FITNESS;
        }
        self.fitness.iter().map(metric).sum::<f64>() / self.fitness.len() as f64
    }

    /// Mean composite `total` across environments. This is the score ranking
    /// and selection work with.
    pub fn aggregate_fitness(&self) -> f64 {
        self.mean_by(|r| r.total)
    }

    /// Per-component means, in the same shape as a single record.
    pub fn aggregate_record(&self) -> FitnessRecord {
        FitnessRecord {
            current_profit: self.mean_by(|r| r.current_profit),
            percent_trade_win: self.mean_by(|r| r.percent_trade_win),
            sharpe_ratio: self.mean_by(|r| r.sharpe_ratio),
            trade_frequency: self.mean_by(|r| r.trade_frequency),
            total: self.aggregate_fitness(),
        }
    }
}
