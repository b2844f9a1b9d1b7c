//! Active tenant resolution.
//!
//! Every tenant-scoped query takes the id returned by [`TenantContext::current`].
//! Request handlers scope a tenant resolved from the `X-Tenant-Id` header; the
//! delivery worker scopes the tenant recorded on each job. Background callers
//! without a request can set a process-wide override instead.

use std::future::Future;
use std::sync::{Arc, RwLock};

use tokio::task_local;
use uuid::Uuid;

task_local! {
    static SCOPED_TENANT: Option<Uuid>;
}

#[derive(Clone, Debug)]
pub struct TenantContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    enabled: bool,
    override_tenant: RwLock<Option<Uuid>>,
}

impl TenantContext {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled,
                override_tenant: RwLock::new(None),
            }),
        }
    }

    /// Context for single-tenant deployments; `current()` is always `None`.
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Tenant for the running task.
    ///
    /// Resolution order: disabled => `None`; task scope; process override.
    pub fn current(&self) -> Option<Uuid> {
        if !self.inner.enabled {
            return None;
        }

        if let Ok(scoped) = SCOPED_TENANT.try_with(|tenant| *tenant) {
            return scoped;
        }

        self.inner
            .override_tenant
            .read()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// Override the tenant for callers outside any scope (CLI, maintenance).
    pub fn set_override(&self, tenant_id: Option<Uuid>) {
        match self.inner.override_tenant.write() {
            Ok(mut guard) => *guard = tenant_id,
            Err(poisoned) => *poisoned.into_inner() = tenant_id,
        }
    }

    pub fn clear_override(&self) {
        self.set_override(None);
    }

    /// Run `future` with `tenant_id` as the active tenant.
    pub async fn scope<F, R>(&self, tenant_id: Option<Uuid>, future: F) -> R
    where
        F: Future<Output = R>,
    {
        SCOPED_TENANT.scope(tenant_id, future).await
    }
}

impl Default for TenantContext {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_context_ignores_scope_and_override() {
        let ctx = TenantContext::disabled();
        ctx.set_override(Some(Uuid::new_v4()));
        let tenant = ctx.scope(Some(Uuid::new_v4()), async { ctx.current() }).await;
        assert_eq!(tenant, None);
        assert_eq!(ctx.current(), None);
    }

    #[tokio::test]
    async fn scope_wins_over_override() {
        let ctx = TenantContext::new(true);
        let overridden = Uuid::new_v4();
        let scoped = Uuid::new_v4();

        ctx.set_override(Some(overridden));
        assert_eq!(ctx.current(), Some(overridden));

        let inside = ctx.scope(Some(scoped), async { ctx.current() }).await;
        assert_eq!(inside, Some(scoped));

        let unscoped = ctx.scope(None, async { ctx.current() }).await;
        assert_eq!(unscoped, None);

        ctx.clear_override();
        assert_eq!(ctx.current(), None);
    }

    #[tokio::test]
    async fn clones_share_override() {
        let ctx = TenantContext::new(true);
        let clone = ctx.clone();
        let tenant = Uuid::new_v4();
        clone.set_override(Some(tenant));
        assert_eq!(ctx.current(), Some(tenant));
    }
}
