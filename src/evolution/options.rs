//! # GenerationConfig
//!
//! The `GenerationConfig` struct holds the run parameters of an optimization:
//! population shape, breeding rates, generation budget, worker pool size, the
//! environments every individual is evaluated against and the gene space being
//! searched.
//!
//! It can be built in code with [`GenerationConfig::builder`] or loaded from a
//! TOML or JSON file with [`GenerationConfig::load`].
//!
//! ## Example
//!
//! ```rust
//! use genoptim::evolution::options::{GenerationConfig, LogLevel};
//! use genoptim::engine::Environment;
//! use genoptim::gene::Gene;
//! use chrono::{TimeZone, Utc};
//!
//! let config = GenerationConfig::builder()
//!     .run_name("macd")
//!     .population_size(12)
//!     .elitism_count(2)
//!     .mutation_rate(0.2)
//!     .generation_count(5)
//!     .concurrency(4)
//!     .log_level(LogLevel::Minimal)
//!     .environment(Environment::new(
//!         Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
//!         Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
//!     ))
//!     .gene(Gene::numeric("short", 5.0, 20.0, true))
//!     .gene(Gene::numeric("long", 21.0, 60.0, true))
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Log levels
//!
//! - `Verbose`: every individual's fitness components each generation.
//! - `Minimal`: one summary line per generation.
//! - `None`: silent.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::Environment;
use crate::error::{OptimizerError, Result, ResultExt};
use crate::gene::{validate_genes, Gene, GeneValue, Genome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Verbose,
    #[default]
    Minimal,
    None,
}

fn default_run_name() -> String {
    "optimization".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_run_name")]
    run_name: String,
    population_size: usize,
    #[serde(default)]
    elitism_count: usize,
    mutation_rate: f64,
    generation_count: usize,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
    environments: Vec<Environment>,
    genes: Vec<Gene>,
    /// Known-good configuration kept as individual 0 of the first generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    baseline: Option<Genome>,
    #[serde(default)]
    log_level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checkpoint_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

fn default_concurrency() -> usize {
    1
}

impl GenerationConfig {
    /// Returns a builder for creating a `GenerationConfig` instance.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder::default()
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Loads a configuration file, choosing the format by extension
    /// (`.toml` or `.json`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .context(format!("Failed to read config {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&source),
            Some("json") => Self::from_json_str(&source),
            other => Err(OptimizerError::Configuration(format!(
                "Unsupported config format {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Checks every invariant the breeding engine and scheduler rely on.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::Breeding` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.run_name.trim().is_empty() {
            return Err(breeding("Run name cannot be empty"));
        }
        if self.population_size == 0 {
            return Err(breeding("Population size cannot be zero"));
        }
        if self.elitism_count >= self.population_size {
            return Err(OptimizerError::Breeding(format!(
                "Elitism count ({}) must be smaller than population size ({})",
                self.elitism_count, self.population_size
            )));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(OptimizerError::Breeding(format!(
                "Mutation rate {} is outside [0, 1]",
                self.mutation_rate
            )));
        }
        if self.generation_count == 0 {
            return Err(breeding("Generation count cannot be zero"));
        }
        if self.concurrency == 0 {
            return Err(breeding("Concurrency cannot be zero"));
        }
        if self.environments.is_empty() {
            return Err(breeding("At least one environment is required"));
        }
        if let Some(env) = self.environments.iter().find(|env| env.start >= env.stop) {
            return Err(OptimizerError::Breeding(format!(
                "Environment starting {} does not end after it starts",
                env.start
            )));
        }

        validate_genes(&self.genes)?;

        if let Some(baseline) = &self.baseline {
            self.validate_baseline(baseline)?;
        }

        Ok(())
    }

    fn validate_baseline(&self, baseline: &Genome) -> Result<()> {
        let expected: BTreeSet<&str> = self.genes.iter().map(|g| g.key.as_str()).collect();
        let actual: BTreeSet<&str> = baseline.keys().map(String::as_str).collect();

        if expected != actual {
            return Err(OptimizerError::Breeding(format!(
                "Baseline keys {:?} do not match gene keys {:?}",
                actual, expected
            )));
        }

        for gene in &self.genes {
            let kind_matches = matches!(
                (gene.is_categorical(), &baseline[&gene.key]),
                (true, GeneValue::Text(_)) | (false, GeneValue::Number(_))
            );
            if !kind_matches {
                return Err(OptimizerError::Breeding(format!(
                    "Baseline value for '{}' has the wrong type",
                    gene.key
                )));
            }
            if !gene.contains(&baseline[&gene.key]) {
                return Err(OptimizerError::Breeding(format!(
                    "Baseline value {} for '{}' is outside its gene's domain",
                    baseline[&gene.key], gene.key
                )));
            }
        }

        Ok(())
    }

    pub fn get_run_name(&self) -> &str {
        &self.run_name
    }

    pub fn get_population_size(&self) -> usize {
        self.population_size
    }

    pub fn get_elitism_count(&self) -> usize {
        self.elitism_count
    }

    pub fn get_mutation_rate(&self) -> f64 {
        self.mutation_rate
    }

    pub fn get_generation_count(&self) -> usize {
        self.generation_count
    }

    pub fn get_concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn get_environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn get_genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn get_baseline(&self) -> Option<&Genome> {
        self.baseline.as_ref()
    }

    pub fn get_log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn get_checkpoint_dir(&self) -> Option<&Path> {
        self.checkpoint_dir.as_deref()
    }

    pub fn get_seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn set_generation_count(&mut self, generation_count: usize) {
        self.generation_count = generation_count;
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    pub fn set_checkpoint_dir(&mut self, dir: Option<PathBuf>) {
        self.checkpoint_dir = dir;
    }
}

fn breeding(msg: &str) -> OptimizerError {
    OptimizerError::Breeding(msg.to_string())
}

/// Builder for `GenerationConfig`.
///
/// Unset fields fall back to the defaults below. The result is not validated
/// until [`GenerationConfig::validate`] runs.
#[derive(Debug, Clone, Default)]
pub struct GenerationConfigBuilder {
    run_name: Option<String>,
    population_size: Option<usize>,
    elitism_count: Option<usize>,
    mutation_rate: Option<f64>,
    generation_count: Option<usize>,
    concurrency: Option<usize>,
    environments: Vec<Environment>,
    genes: Vec<Gene>,
    baseline: Option<Genome>,
    log_level: Option<LogLevel>,
    checkpoint_dir: Option<PathBuf>,
    seed: Option<u64>,
}

impl GenerationConfigBuilder {
    pub fn run_name(mut self, value: impl Into<String>) -> Self {
        self.run_name = Some(value.into());
        self
    }

    pub fn population_size(mut self, value: usize) -> Self {
        self.population_size = Some(value);
        self
    }

    pub fn elitism_count(mut self, value: usize) -> Self {
        self.elitism_count = Some(value);
        self
    }

    pub fn mutation_rate(mut self, value: f64) -> Self {
        self.mutation_rate = Some(value);
        self
    }

    pub fn generation_count(mut self, value: usize) -> Self {
        self.generation_count = Some(value);
        self
    }

    pub fn concurrency(mut self, value: usize) -> Self {
        self.concurrency = Some(value);
        self
    }

    /// Appends one evaluation window. Windows are evaluated in insertion order.
    pub fn environment(mut self, value: Environment) -> Self {
        self.environments.push(value);
        self
    }

    pub fn environments(mut self, values: Vec<Environment>) -> Self {
        self.environments = values;
        self
    }

    pub fn gene(mut self, value: Gene) -> Self {
        self.genes.push(value);
        self
    }

    pub fn genes(mut self, values: Vec<Gene>) -> Self {
        self.genes = values;
        self
    }

    pub fn baseline(mut self, value: Genome) -> Self {
        self.baseline = Some(value);
        self
    }

    pub fn log_level(mut self, value: LogLevel) -> Self {
        self.log_level = Some(value);
        self
    }

    pub fn checkpoint_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(value.into());
        self
    }

    pub fn seed(mut self, value: u64) -> Self {
        self.seed = Some(value);
        self
    }

    /// Builds the `GenerationConfig` instance.
    pub fn build(self) -> GenerationConfig {
        GenerationConfig {
            run_name: self.run_name.unwrap_or_else(default_run_name),
            population_size: self.population_size.unwrap_or(20),
            elitism_count: self.elitism_count.unwrap_or(1),
            mutation_rate: self.mutation_rate.unwrap_or(0.3),
            generation_count: self.generation_count.unwrap_or(10),
            concurrency: self.concurrency.unwrap_or_else(default_concurrency),
            environments: self.environments,
            genes: self.genes,
            baseline: self.baseline,
            log_level: self.log_level.unwrap_or_default(),
            checkpoint_dir: self.checkpoint_dir,
            seed: self.seed,
        }
    }
}
