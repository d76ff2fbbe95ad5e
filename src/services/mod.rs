// Multi-step operations spanning the store, workspaces and the query engine

pub mod environments;
pub mod reports;
pub mod tenants;

pub use environments::create_environment;
pub use reports::{run_query, RunQuery};
pub use tenants::{create_tenant, update_tenant_config};
