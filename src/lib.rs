pub mod app;
pub mod authz;
pub mod bitacora;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod tokens;
pub mod utils;

// Re-export commonly used items for tests
pub use app::create_app;
pub use config::AppConfig;
