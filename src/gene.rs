//! # Gene Space
//!
//! A [`Gene`] describes the domain of one tunable strategy parameter: either a
//! numeric range (optionally integral) or a categorical list of strings. When
//! `list` is present it governs sampling and mutation and the numeric fields
//! are ignored.
//!
//! A [`Genome`] maps every gene key to one concrete [`GeneValue`].
//!
//! ## Example
//!
//! ```rust
//! use genoptim::gene::{Gene, GeneValue};
//! use genoptim::rng::RandomNumberGenerator;
//!
//! let period = Gene::numeric("period", 5.0, 50.0, true);
//! let mut rng = RandomNumberGenerator::from_seed(1);
//!
//! match period.sample(&mut rng) {
//!     GeneValue::Number(n) => assert!(n.fract() == 0.0 && (5.0..=50.0).contains(&n)),
//!     GeneValue::Text(_) => unreachable!(),
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::rng::RandomNumberGenerator;

/// A concrete value for one gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneValue {
    Number(f64),
    Text(String),
}

impl GeneValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for GeneValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for GeneValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for GeneValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A full parameter assignment, one entry per gene.
pub type Genome = BTreeMap<String, GeneValue>;

/// The domain of a single tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub key: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub integer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<String>>,
}

impl Gene {
    /// A numeric gene sampled from `[min, max]`.
    pub fn numeric(key: impl Into<String>, min: f64, max: f64, integer: bool) -> Self {
        Self {
            key: key.into(),
            min,
            max,
            integer,
            list: None,
        }
    }

    /// A categorical gene sampled from `list`.
    pub fn categorical<S: Into<String>>(key: impl Into<String>, list: Vec<S>) -> Self {
        Self {
            key: key.into(),
            min: 0.0,
            max: 0.0,
            integer: false,
            list: Some(list.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_categorical(&self) -> bool {
        self.list.is_some()
    }

    /// Width of the numeric range. Zero for categorical genes.
    pub fn range(&self) -> f64 {
        if self.is_categorical() {
            0.0
        } else {
            self.max - self.min
        }
    }

    /// Draws a fresh value for this gene.
    pub fn sample(&self, rng: &mut RandomNumberGenerator) -> GeneValue {
        match &self.list {
            Some(list) => GeneValue::Text(list[rng.index(list.len())].clone()),
            None => {
                let raw = rng.uniform_inclusive(self.min, self.max);
                GeneValue::Number(self.constrain(raw))
            }
        }
    }

    /// Clamps a candidate numeric value into `[min, max]`, flooring it for
    /// integer genes. The result of flooring never leaves the range.
    pub fn constrain(&self, value: f64) -> f64 {
        let clamped = if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        };

        if self.integer {
            clamped.floor().max(self.min.ceil()).min(self.max.floor())
        } else {
            clamped
        }
    }

    /// Returns `true` when `value` lies in this gene's domain.
    pub fn contains(&self, value: &GeneValue) -> bool {
        match (&self.list, value) {
            (Some(list), GeneValue::Text(s)) => list.iter().any(|item| item == s),
            (None, GeneValue::Number(n)) => {
                *n >= self.min && *n <= self.max && (!self.integer || n.fract() == 0.0)
            }
            _ => false,
        }
    }

    /// Checks that the gene describes a non-empty, well-formed domain.
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(OptimizerError::Breeding("Gene key cannot be empty".to_string()));
        }

        match &self.list {
            Some(list) if list.is_empty() => Err(OptimizerError::Breeding(format!(
                "Gene '{}' has an empty list",
                self.key
            ))),
            Some(_) => Ok(()),
            None => {
                if !self.min.is_finite() || !self.max.is_finite() {
                    return Err(OptimizerError::Breeding(format!(
                        "Gene '{}' has a non-finite range",
                        self.key
                    )));
                }
                if self.min > self.max {
                    return Err(OptimizerError::Breeding(format!(
                        "Gene '{}' has min {} greater than max {}",
                        self.key, self.min, self.max
                    )));
                }
                if !self.range().is_finite() {
                    return Err(OptimizerError::Breeding(format!(
                        "Gene '{}' range [{}, {}] is too wide to sample",
                        self.key, self.min, self.max
                    )));
                }
                if self.integer && self.min.ceil() > self.max.floor() {
                    return Err(OptimizerError::Breeding(format!(
                        "Integer gene '{}' has no integer in [{}, {}]",
                        self.key, self.min, self.max
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Samples every gene independently into a complete genome.
pub fn sample_genome(genes: &[Gene], rng: &mut RandomNumberGenerator) -> Genome {
    genes
        .iter()
        .map(|gene| (gene.key.clone(), gene.sample(rng)))
        .collect()
}

/// Validates a gene list as a whole: non-empty, unique keys, every gene valid.
pub fn validate_genes(genes: &[Gene]) -> Result<()> {
    if genes.is_empty() {
        return Err(OptimizerError::Breeding(
            "Gene list cannot be empty".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(genes.len());
    for gene in genes {
        gene.validate()?;
        if !seen.insert(gene.key.as_str()) {
            return Err(OptimizerError::Breeding(format!(
                "Duplicate gene key '{}'",
                gene.key
            )));
        }
    }

    Ok(())
}
