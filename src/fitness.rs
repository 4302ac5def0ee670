//! # Fitness Evaluation
//!
//! Turns a finished trial into a [`FitnessRecord`]: four components and a
//! weighted composite `total`.
//!
//! ```text
//! total = currentProfit + 0.5·percentTradeWin + 0.5·tradeFrequency + sharpeRatio/4
//! ```
//!
//! `sharpeRatio` is clamped to `[0, 4]` before weighting, and a zero or missing
//! `currentProfit` is scored as `-1`.

use serde::{Deserialize, Serialize};

use crate::engine::{Environment, Portfolio, Trade};

/// A trade has to clear this profit to count as a win.
pub const WIN_THRESHOLD: f64 = 0.002;

/// Per-trade return subtracted before computing the Sharpe ratio.
pub const RISK_FREE_RETURN: f64 = 0.005;

/// Expected spacing between trades, in days, for a full frequency score.
pub const TRADE_INTERVAL_DAYS: i64 = 14;

pub const SHARPE_CAP: f64 = 4.0;

/// Composite weights. Tunable; the Sharpe weight caps its contribution at 1.0.
pub const WIN_WEIGHT: f64 = 0.5;
pub const FREQUENCY_WEIGHT: f64 = 0.5;
pub const SHARPE_WEIGHT: f64 = 1.0 / SHARPE_CAP;

/// Fitness of one individual in one environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitnessRecord {
    pub current_profit: f64,
    pub percent_trade_win: f64,
    pub sharpe_ratio: f64,
    pub trade_frequency: f64,
    pub total: f64,
}

impl FitnessRecord {
    /// Builds a record from raw components, applying the profit penalty and
    /// the Sharpe clamp before computing `total`.
    pub fn new(
        current_profit: Option<f64>,
        percent_trade_win: f64,
        sharpe_ratio: f64,
        trade_frequency: f64,
    ) -> Self {
        let current_profit = match current_profit {
            Some(p) if p != 0.0 && p.is_finite() => p,
            _ => -1.0,
        };
        let sharpe_ratio = clamp_sharpe(sharpe_ratio);

        Self {
            current_profit,
            percent_trade_win,
            sharpe_ratio,
            trade_frequency,
            total: composite(current_profit, percent_trade_win, sharpe_ratio, trade_frequency),
        }
    }

    /// The record assigned to a trial that faulted.
    pub fn sentinel() -> Self {
        Self {
            current_profit: -1.0,
            percent_trade_win: -1.0,
            sharpe_ratio: -1.0,
            trade_frequency: -1.0,
            total: -1.0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }
}

/// The weighted composite. Monotonic in every argument.
pub fn composite(
    current_profit: f64,
    percent_trade_win: f64,
    sharpe_ratio: f64,
    trade_frequency: f64,
) -> f64 {
    current_profit
        + WIN_WEIGHT * percent_trade_win
        + FREQUENCY_WEIGHT * trade_frequency
        + SHARPE_WEIGHT * sharpe_ratio
}

/// Clamps into `[0, SHARPE_CAP]`. `NaN` maps to 0.
pub fn clamp_sharpe(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, SHARPE_CAP)
    }
}

/// Fraction of trades whose profit exceeds [`WIN_THRESHOLD`].
pub fn percent_trade_win(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades
        .iter()
        .filter(|t| t.order_profit > WIN_THRESHOLD)
        .count();
    wins as f64 / trades.len() as f64
}

/// Raw (unclamped) Sharpe ratio of per-trade profits, using the sample
/// standard deviation. Zero with fewer than two trades or no dispersion.
pub fn sharpe_ratio(trades: &[Trade]) -> f64 {
    if trades.len() < 2 {
        return 0.0;
    }

    let n = trades.len() as f64;
    let mean = trades.iter().map(|t| t.order_profit).sum::<f64>() / n;
    let variance = trades
        .iter()
        .map(|t| (t.order_profit - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let stddev = variance.sqrt();

    if stddev == 0.0 || !stddev.is_finite() {
        return 0.0;
    }

    (mean - RISK_FREE_RETURN) / stddev
}

/// Number of trades that earns a full frequency score for `environment`.
pub fn expected_trade_budget(environment: &Environment) -> i64 {
    environment.days() / TRADE_INTERVAL_DAYS
}

/// `min(1, trades / budget)`. A window shorter than one interval scores 1
/// as soon as it trades at all.
pub fn trade_frequency(trade_count: usize, environment: &Environment) -> f64 {
    let budget = expected_trade_budget(environment);
    if budget <= 0 {
        return if trade_count > 0 { 1.0 } else { 0.0 };
    }
    (trade_count as f64 / budget as f64).min(1.0)
}

/// Scores a completed trial.
pub fn evaluate(portfolio: &Portfolio, environment: &Environment) -> FitnessRecord {
    let trades = &portfolio.trade_history;

    FitnessRecord::new(
        portfolio.current_profit(),
        percent_trade_win(trades),
        sharpe_ratio(trades),
        trade_frequency(trades.len(), environment),
    )
}
