//! Core business logic module
//!
//! # Submodules
//!
//! - [`stage`] - Stage declarations and resolved stage nodes
//! - [`graph`] - Stage graph validation and ordering
//! - [`manifest`] - Installed-path tracking per stage and dependency
//! - [`plan`] - Build planning
//! - [`executor`] - Sequential plan execution
//! - [`stagefile`] - Stage file (stages.toml) parsing

pub mod executor;
pub mod graph;
pub mod manifest;
pub mod plan;
pub mod stage;
pub mod stagefile;
