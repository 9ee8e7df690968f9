//! Test helpers for farewatch-engine integration tests
//!
//! Provides an in-memory database with the full schema, a scripted
//! fare source, and a recording push channel so pipeline behavior can
//! be exercised without any network.

pub mod fixtures;

pub use fixtures::{
    flight, memory_pool, test_config, test_pipeline, upcoming, weekend_pair, weekend_profile,
    RecordingPush, ScriptedFareSource, ScriptedResponse,
};
