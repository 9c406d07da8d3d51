//! Inbound HTTP surface: webhooks, health, metrics, admin trigger.

mod admin;
mod dto;
mod health;
mod routes;
mod state;
mod webhooks;

pub use health::{AlwaysReady, PgReadiness, ReadinessProbe};
pub use routes::router;
pub use state::AppState;
