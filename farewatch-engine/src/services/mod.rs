//! Pipeline services

pub mod airports;
pub mod fare_source;
pub mod matcher;
pub mod notifier;
pub mod orchestrator;
pub mod scan_gate;
