//! Collaborator traits consumed by the fulfillment services, with in-memory
//! implementations for tests and the demo server.

pub mod addresses;
pub mod audit;
pub mod catalog;
pub mod tenants;

use std::sync::Arc;

pub use addresses::{AddressBook, InMemoryAddressBook};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use catalog::{Catalog, InMemoryCatalog};
pub use tenants::{InMemoryTenantGuard, TenantGuard};

/// The external collaborators one fulfillment instance talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub tenants: Arc<dyn TenantGuard>,
    pub catalog: Arc<dyn Catalog>,
    pub addresses: Arc<dyn AddressBook>,
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    /// Fresh in-memory collaborators that allow every tenant and log audit
    /// events through `tracing`.
    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantGuard::allow_all()),
            catalog: Arc::new(InMemoryCatalog::new()),
            addresses: Arc::new(InMemoryAddressBook::new()),
            audit: Arc::new(TracingAuditSink),
        }
    }
}
