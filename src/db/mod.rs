pub mod pool;
pub mod schema;

pub use pool::{create_pool, health_check, run_migrations};
