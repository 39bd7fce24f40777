//! Core engine module
//!
//! Contains the Engine struct, its configuration and resource statistics

mod config;
mod debug;
mod engine;

pub use config::{ConfigError, DefaultAssets, EngineConfig};
pub use debug::ResourceStats;
pub use engine::{DefaultResources, Engine, EngineError};
