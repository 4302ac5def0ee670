//! # Error Types
//!
//! This module defines the error types for the optimizer. Errors fall into
//! two groups:
//!
//! - recoverable trial faults (`Trial`, `Simulation`), which the scheduler
//!   turns into a sentinel fitness record and never propagates, and
//! - fatal run errors (`Scheduler`, `Breeding`, `FatalRun`, ...), which end the
//!   whole optimization.
//!
//! ## Examples
//!
//! Using the `ResultExt` trait to add context to errors:
//!
//! ```rust
//! use genoptim::error::{Result, ResultExt};
//! use std::fs::File;
//!
//! fn open_config(path: &str) -> Result<()> {
//!     File::open(path).context("Failed to open optimizer config")?;
//!     Ok(())
//! }
//! ```
//!
//! Using the `OptionExt` trait to convert `Option` to `Result`:
//!
//! ```rust
//! use genoptim::error::{OptimizerError, OptionExt};
//!
//! fn first_score(scores: &[f64]) -> genoptim::error::Result<f64> {
//!     scores.first().copied().ok_or_else_optimizer(|| OptimizerError::EmptyPopulation)
//! }
//! ```

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Represents errors that can occur while optimizing a strategy configuration.
#[derive(Error, Debug)]
pub enum OptimizerError {
    /// A single trial of an individual failed. Recovered by the scheduler.
    #[error("Trial error: {0}")]
    Trial(String),

    /// The simulation engine reported a fault during initialize/start/stop.
    #[error("Simulation error: {0}")]
    Simulation(String),

    /// The worker pool could not be created, cleared or drained.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// A generation could not be built, usually because of an invalid configuration.
    #[error("Breeding error: {0}")]
    Breeding(String),

    /// A configuration source could not be read or parsed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A checkpoint could not be written or read back.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// An uncaught error during a generation. Terminates the run.
    #[error("Optimization run failed in generation {generation}: {source}")]
    FatalRun {
        generation: usize,
        #[source]
        source: Box<OptimizerError>,
    },

    /// Error that occurs when an empty population is encountered.
    #[error("Empty population error: Cannot operate on an empty population")]
    EmptyPopulation,

    /// Error that occurs when an I/O operation fails.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A generic error with a custom message.
    #[error("{0}")]
    Other(String),
}

impl OptimizerError {
    /// Returns `true` for errors that the scheduler absorbs into a sentinel record.
    pub fn is_trial_failure(&self) -> bool {
        matches!(self, Self::Trial(_) | Self::Simulation(_))
    }
}

/// A specialized Result type for optimizer operations.
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Extension trait for Result to add context to errors.
pub trait ResultExt<T, E> {
    /// Converts the error into an `OptimizerError::Other` prefixed with `context`.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| OptimizerError::Other(format!("{}: {}", context, e)))
    }
}

/// Extension trait for Option to convert to Result with a custom error.
pub trait OptionExt<T> {
    fn ok_or_else_optimizer<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> OptimizerError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_else_optimizer<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> OptimizerError,
    {
        self.ok_or_else(err_fn)
    }
}
