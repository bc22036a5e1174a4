pub mod auth;
pub mod error;
pub mod extract;
pub mod file_logging;
pub mod routes;
pub mod state;
pub mod store;
pub mod views;

pub use state::AppState;
