//! HTTP API handlers for tunesmith-mg

pub mod callback;
pub mod download;
pub mod generate;
pub mod health;
pub mod tasks;

pub use callback::callback_routes;
pub use download::download_routes;
pub use generate::generate_routes;
pub use health::health_routes;
pub use tasks::task_routes;
