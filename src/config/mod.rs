//! Configuration and constants
//!
//! - [`defaults`] - Default values
//! - [`settings`] - Run settings resolved from CLI, environment and stage file

pub mod defaults;
pub mod settings;
