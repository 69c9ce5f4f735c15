//! Core types for the ensemble mixing workspace
//!
//! Holds the pieces every other crate leans on: the error taxonomy, the
//! on-disk configuration model and logging setup.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{EnsembleError, Result};
