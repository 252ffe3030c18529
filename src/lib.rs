//! Stagecraft - multi-stage build orchestrator
//!
//! Plans and executes builds described as a graph of stages, where each
//! stage derives from a parent, copies artifacts out of other stages and
//! builds dependencies from source. Installed files are tracked per stage so
//! that a configuration change (Debug vs. Release, new flags) uninstalls
//! exactly what the previous build put in place.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Stage graph, manifest tracking, planning and execution
//! - [`infra`] - Infrastructure layer (filesystem, processes, persistent store)
//! - [`config`] - Defaults and run settings
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
