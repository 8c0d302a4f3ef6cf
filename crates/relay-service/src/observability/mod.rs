//! Health and metrics surface.

pub mod health;
pub mod metrics;

pub use health::{health_router, metrics_router, HealthState};
