// Cloud Manager Library

pub mod api;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod errors;
pub mod observability;
pub mod query;
pub mod reports;
pub mod services;
pub mod store;
pub mod tenancy;
pub mod workspace;

pub use config::Config;
pub use errors::{AppError, Result};
