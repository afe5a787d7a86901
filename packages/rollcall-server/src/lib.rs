pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extract;
mod routes;
pub mod services;
pub mod state;

pub use bootstrap::app::axum_app;
pub use bootstrap::config::{AppConfig, AuthConfig};
pub use state::AppState;
