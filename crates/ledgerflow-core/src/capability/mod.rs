//! Capability router port.
//!
//! Nodes reach out-of-process workers only through [`CapabilityRouter`].
//! Every call returns a [`ToolOutcome`] classified once at the router:
//! success, application error, or transport error.
//!
//! `CapabilityRouter` uses RPITIT and is not object-safe, so the object-safe
//! [`CapabilityRouterDyn`] plus the [`BoxCapabilityRouter`] wrapper provide
//! runtime dispatch:
//! 1. `CapabilityRouterDyn` has boxed futures
//! 2. It is blanket-implemented for all `T: CapabilityRouter`
//! 3. `BoxCapabilityRouter` wraps `Box<dyn CapabilityRouterDyn>` and delegates

#[cfg(test)]
pub(crate) mod scripted;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ledgerflow_types::capability::{PoolConfig, ToolOutcome};
use serde_json::Value;

/// Dispatches named operations to pooled capability workers.
pub trait CapabilityRouter: Send + Sync {
    /// Associate a logical pool with its backing worker.
    fn register_pool(&self, name: &str, config: PoolConfig);

    /// Names of registered pools.
    fn pools(&self) -> Vec<String>;

    /// Invoke `operation` in `pool` with one structured argument bundle.
    fn invoke(
        &self,
        pool: &str,
        operation: &str,
        arguments: Value,
    ) -> impl Future<Output = ToolOutcome> + Send;
}

impl<T: CapabilityRouter> CapabilityRouter for Arc<T> {
    fn register_pool(&self, name: &str, config: PoolConfig) {
        (**self).register_pool(name, config)
    }

    fn pools(&self) -> Vec<String> {
        (**self).pools()
    }

    fn invoke(
        &self,
        pool: &str,
        operation: &str,
        arguments: Value,
    ) -> impl Future<Output = ToolOutcome> + Send {
        (**self).invoke(pool, operation, arguments)
    }
}

/// Object-safe version of [`CapabilityRouter`] with boxed futures.
pub trait CapabilityRouterDyn: Send + Sync {
    fn register_pool_dyn(&self, name: &str, config: PoolConfig);

    fn pools_dyn(&self) -> Vec<String>;

    fn invoke_boxed<'a>(
        &'a self,
        pool: &'a str,
        operation: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolOutcome> + Send + 'a>>;
}

impl<T: CapabilityRouter> CapabilityRouterDyn for T {
    fn register_pool_dyn(&self, name: &str, config: PoolConfig) {
        CapabilityRouter::register_pool(self, name, config)
    }

    fn pools_dyn(&self) -> Vec<String> {
        CapabilityRouter::pools(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        pool: &'a str,
        operation: &'a str,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolOutcome> + Send + 'a>> {
        Box::pin(self.invoke(pool, operation, arguments))
    }
}

/// Type-erased capability router.
///
/// Lets the application pick the transport-backed router at startup while
/// workflow nodes stay non-generic.
pub struct BoxCapabilityRouter {
    inner: Box<dyn CapabilityRouterDyn>,
}

impl BoxCapabilityRouter {
    pub fn new<T: CapabilityRouter + 'static>(router: T) -> Self {
        Self {
            inner: Box::new(router),
        }
    }

    pub fn register_pool(&self, name: &str, config: PoolConfig) {
        self.inner.register_pool_dyn(name, config)
    }

    pub fn pools(&self) -> Vec<String> {
        self.inner.pools_dyn()
    }

    pub async fn invoke(&self, pool: &str, operation: &str, arguments: Value) -> ToolOutcome {
        self.inner.invoke_boxed(pool, operation, arguments).await
    }
}
