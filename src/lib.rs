//! Telescope.org observation pipeline
//!
//! Session client for the telescope.org robotic observatory, plate solving,
//! variable-star catalog lookups and annotated previews of finished jobs.

pub mod batch;
pub mod catalog;
pub mod client;
pub mod config;
pub mod coords;
pub mod error;
pub mod fits;
pub mod process;
pub mod render;
pub mod solver;
pub mod storage;
pub mod types;

#[cfg(test)]
mod error_tests;

pub use error::{Result, ScopeError};
