//! Tenant access checks.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use common::TenantId;

use crate::error::{FulfillmentError, Result};

/// Decides whether the current caller may act within a tenant.
#[async_trait]
pub trait TenantGuard: Send + Sync {
    /// Fails with `Forbidden` when access is denied.
    async fn ensure_access(&self, tenant_id: TenantId) -> Result<()>;
}

#[derive(Debug, Default)]
struct TenantGuardState {
    allow_all: bool,
    allowed: HashSet<TenantId>,
}

/// In-memory tenant guard for testing.
#[derive(Debug, Default)]
pub struct InMemoryTenantGuard {
    state: RwLock<TenantGuardState>,
}

impl InMemoryTenantGuard {
    /// A guard that denies every tenant until one is allowed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A guard that accepts any tenant.
    pub fn allow_all() -> Self {
        let guard = Self::default();
        guard.set_allow_all(true);
        guard
    }

    pub fn set_allow_all(&self, allow: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .allow_all = allow;
    }

    pub fn allow(&self, tenant_id: TenantId) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .allowed
            .insert(tenant_id);
    }

    pub fn revoke(&self, tenant_id: TenantId) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .allowed
            .remove(&tenant_id);
    }
}

#[async_trait]
impl TenantGuard for InMemoryTenantGuard {
    async fn ensure_access(&self, tenant_id: TenantId) -> Result<()> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.allow_all || state.allowed.contains(&tenant_id) {
            return Ok(());
        }
        Err(FulfillmentError::Forbidden(format!(
            "no access to tenant {tenant_id}"
        )))
    }
}
