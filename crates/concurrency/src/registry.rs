//! Factory registry keyed by pool name
//!
//! Factories are created lazily on first use of a pool name and kept until
//! the registry is closed. Each pool gets a `OnceCell` slot; the `DashMap`
//! shard lock is only held to find or insert that slot, and the provider
//! runs under the slot's own initialization lock. Threads racing on the
//! first access to a pool end up sharing the single factory built by the
//! winner, while providers may look up other pools of the same registry.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use txscope_core::{BoxError, FactoryProvider, ResourceManagerFactory, Result, TransactionError};

type FactorySlot<F> = Arc<OnceCell<Arc<F>>>;

/// Pool name to factory map.
pub struct FactoryRegistry<F: ResourceManagerFactory> {
    factories: DashMap<String, FactorySlot<F>>,
}

impl<F: ResourceManagerFactory> FactoryRegistry<F> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Factory for `pool`, created through `provider` on first use
    ///
    /// A provider failure leaves no entry behind; the next request retries.
    pub fn get_or_create(&self, pool: &str, provider: &dyn FactoryProvider<F>) -> Result<Arc<F>> {
        let slot = match self.factories.get(pool) {
            Some(slot) => Arc::clone(slot.value()),
            None => Arc::clone(self.factories.entry(pool.to_string()).or_default().value()),
        };

        let created = slot.get_or_try_init(|| {
            tracing::debug!(pool, "Create resource manager factory");
            provider.create_factory(pool).map(Arc::new)
        });
        match created {
            Ok(factory) => Ok(Arc::clone(factory)),
            Err(e) => {
                self.factories.remove_if(pool, |_, slot| slot.get().is_none());
                Err(TransactionError::factory(pool, e))
            }
        }
    }

    /// Whether a factory exists for `pool`
    pub fn contains(&self, pool: &str) -> bool {
        self.factories
            .get(pool)
            .map_or(false, |slot| slot.get().is_some())
    }

    /// Number of cached factories
    pub fn len(&self) -> usize {
        self.factories
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    /// Whether no factory was created yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the cached pools
    pub fn pools(&self) -> Vec<String> {
        self.factories
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove and close every factory.
    ///
    /// Each factory is removed before it is closed, so it is closed at most
    /// once even if this runs twice. Failures are collected, not fatal.
    pub fn close_all(&self) -> Vec<(String, BoxError)> {
        let mut failures = Vec::new();
        for pool in self.pools() {
            let Some((pool, slot)) = self.factories.remove(&pool) else {
                continue;
            };
            let Some(factory) = slot.get() else {
                continue;
            };
            tracing::debug!(pool = %pool, "Close resource manager factory");
            if let Err(e) = factory.close() {
                tracing::error!(pool = %pool, error = %e, "Resource manager factory close failed");
                failures.push((pool, e));
            }
        }
        failures
    }
}

impl<F: ResourceManagerFactory> Default for FactoryRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}
