pub mod clients;
pub mod environments;
pub mod health;
pub mod public;
pub mod reports;
pub mod routes;
pub mod subscriptions;
pub mod tenants;

pub use routes::{create_router, AppState};
