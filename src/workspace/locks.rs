use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed async mutex: one exclusive scope per tenant
#[derive(Default)]
pub struct TenantLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the tenant's exclusive scope. Held until the guard drops.
    pub async fn acquire(&self, tenant_id: Uuid) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not locked while waiting
        let lock = self
            .locks
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}
