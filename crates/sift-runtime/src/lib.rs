//! # sift-runtime
//!
//! Typed configuration and an async host for the sift engine.
//!
//! The core engine is synchronous and deterministic. This crate adds what a
//! long-running service needs around it: configuration files with humantime
//! durations, many independent conversations, and a global deadline on every
//! turn.

pub mod config;
pub mod orchestrator;

pub use config::{
    ConfigError, DeterminismConfig, HistoryConfig, KnowledgeConfig, RuntimeConfig, TimeoutConfig,
};
pub use orchestrator::{RuntimeError, RuntimeOrchestrator, RuntimeOrchestratorBuilder, RuntimeResponse};
