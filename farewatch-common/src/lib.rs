//! # FareWatch Common Library
//!
//! Shared code for the FareWatch pipeline:
//! - Domain model (flights, search profiles, deals)
//! - Database schema and pool initialization
//! - Engine configuration loading
//! - Error types
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod time;

pub use config::EngineConfig;
pub use error::{Error, Result};
