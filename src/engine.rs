//! # Simulation Engine contract
//!
//! The optimizer does not simulate anything itself. It asks an
//! [`EngineFactory`] for one [`SimulationEngine`] per trial, drives it through
//! `initialize → start → stop`, and reads back the engine's [`Portfolio`].
//!
//! Engine methods take `&self` so a running engine can be reached from another
//! thread when the optimizer has to request a graceful shutdown. Implementors
//! keep their mutable state behind interior mutability.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gene::Genome;

/// Indicator key holding the strategy's profit at the end of a trial.
pub const CURRENT_PROFIT: &str = "currentProfit";

/// A historical window a trial is simulated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl Environment {
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self { start, stop }
    }

    /// Whole days covered by the window. Never negative.
    pub fn days(&self) -> i64 {
        (self.stop - self.start).num_days().max(0)
    }
}

/// One closed trade reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(rename = "orderProfit")]
    pub order_profit: f64,
}

impl Trade {
    pub fn new(order_profit: f64) -> Self {
        Self { order_profit }
    }
}

/// The engine's account snapshot after a trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub trade_history: Vec<Trade>,
    pub indicators: BTreeMap<String, f64>,
}

impl Portfolio {
    pub fn current_profit(&self) -> Option<f64> {
        self.indicators.get(CURRENT_PROFIT).copied()
    }
}

/// Lifecycle state of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Created,
    Initialized,
    Running,
    Stopped,
    Faulted,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Faulted => "faulted",
        };
        f.write_str(label)
    }
}

/// Everything an engine needs to run one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSpec {
    /// Instance name, `{run}-gen{g}-ind{i}`.
    pub name: String,
    /// Strategy options derived from the individual's genome.
    pub genome: Genome,
    pub environment: Environment,
    /// Flush persisted engine state before initializing.
    pub flush: bool,
}

/// A simulation of one strategy configuration over one environment.
pub trait SimulationEngine: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Runs the simulation. Blocks until the engine has consumed its window.
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn status(&self) -> EngineStatus;

    fn portfolio(&self) -> Portfolio;
}

/// Builds engines for the scheduler.
pub trait EngineFactory: Send + Sync {
    fn create(&self, spec: &TrialSpec) -> Result<Arc<dyn SimulationEngine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(&TrialSpec) -> Result<Arc<dyn SimulationEngine>> + Send + Sync,
{
    fn create(&self, spec: &TrialSpec) -> Result<Arc<dyn SimulationEngine>> {
        self(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_environment_days() {
        let env = Environment::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        );
        assert_eq!(env.days(), 60);

        let backwards = Environment::new(env.stop, env.start);
        assert_eq!(backwards.days(), 0);
    }

    #[test]
    fn test_portfolio_current_profit() {
        let mut portfolio = Portfolio::default();
        assert_eq!(portfolio.current_profit(), None);

        portfolio.indicators.insert(CURRENT_PROFIT.to_string(), 0.12);
        assert_eq!(portfolio.current_profit(), Some(0.12));
    }

    #[test]
    fn test_environment_deserializes_from_rfc3339() {
        let env: Environment = serde_json::from_str(
            r#"{"start":"2023-01-01T00:00:00Z","stop":"2023-02-12T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(env.days(), 42);
    }
}
