use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::ServiceInfo;

/// Read-only lookup into the business's service catalog. The catalog itself
/// (names, categories, pricing rules) is owned elsewhere; the engine only
/// needs duration and price/tax figures to book time.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn get_service(&self, id: Ulid) -> Option<ServiceInfo>;
}

/// DashMap-backed catalog for tests and embedders that resolve services
/// in-process.
#[derive(Default)]
pub struct InMemoryCatalog {
    services: DashMap<Ulid, ServiceInfo>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Ulid, info: ServiceInfo) {
        self.services.insert(id, info);
    }

    pub fn remove(&self, id: &Ulid) {
        self.services.remove(id);
    }
}

#[async_trait]
impl ServiceCatalog for InMemoryCatalog {
    async fn get_service(&self, id: Ulid) -> Option<ServiceInfo> {
        self.services.get(&id).map(|e| *e.value())
    }
}
