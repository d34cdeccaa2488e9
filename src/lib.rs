pub mod app;
pub mod authz;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod session;
pub mod store;
pub mod token;
pub mod tree;
pub mod utils;

// Re-export commonly used items for tests
pub use app::{create_app, create_app_with_config};
