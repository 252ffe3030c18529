//! Infrastructure layer
//!
//! Handles I/O: the filesystem, external processes and the persisted
//! manifest store.

pub mod filesystem;
pub mod runner;
pub mod store;
