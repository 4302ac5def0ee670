pub mod checkpoint;
pub mod launcher;
pub mod options;

pub use checkpoint::{Checkpoint, CheckpointEntry, GenerationSummary};
pub use launcher::{OptimizationResult, Optimizer, OptimizerState};
pub use options::{GenerationConfig, GenerationConfigBuilder, LogLevel};
