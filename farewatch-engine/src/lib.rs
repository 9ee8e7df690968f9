//! farewatch-engine library interface
//!
//! Exposes the pipeline, scheduler, and HTTP API for integration
//! testing. The binary in `main.rs` wires these together.

pub mod api;
pub mod db;
pub mod error;
pub mod scheduler;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::orchestrator::Pipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The profile-run pipeline, shared with the scheduler
    pub pipeline: Arc<Pipeline>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            startup_time: farewatch_common::time::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::status_routes())
        .merge(api::deal_routes())
        .merge(api::refresh_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
