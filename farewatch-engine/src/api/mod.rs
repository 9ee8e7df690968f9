//! HTTP API handlers for farewatch-engine

pub mod deals;
pub mod health;
pub mod refresh;
pub mod status;

pub use deals::deal_routes;
pub use health::health_routes;
pub use refresh::refresh_routes;
pub use status::status_routes;
