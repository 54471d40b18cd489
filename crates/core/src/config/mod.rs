//! Configuration for the timeline engine.
//!
//! This module provides:
//! - Engine settings (chain, database, analysis window, batch loop)
//! - TOML loading with `${VAR}` expansion
//! - Environment overrides and validation

mod engine;
mod env;
mod error;

pub use engine::{
    vars, AnalysisSettings, ChainSettings, DatabaseSettings, EngineConfig, RunnerSettings,
};
pub use error::ConfigError;
