//! Liquidation timeline engine.
//!
//! This crate provides:
//! - Engine configuration (file, environment, validation)
//! - Earliest liquidatable block search over historical chain state
//! - Per-event timeline analysis (latency, blocks liquidatable, asset prices)
//! - The batch loop that drains, analyzes and commits unresolved events

mod analyzer;
pub mod config;
mod error;
mod finder;
mod orchestrator;
#[cfg(test)]
mod testing;

pub use analyzer::{AnalysisOutcome, TimelineAnalyzer};
pub use config::{ConfigError, EngineConfig};
pub use error::AnalysisError;
pub use finder::{LiquidatableBlockFinder, SearchOutcome};
pub use orchestrator::{BatchOrchestrator, BatchSummary, LoopState, RunnerOptions};
