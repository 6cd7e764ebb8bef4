pub mod config;
pub mod routes;
pub mod state;

pub use routes::{ApiError, cors_layer, router};
pub use state::AppState;
