//! Factory of transactional instances
//!
//! A [`TransactionalFactory`] owns one manager and one session slot. Every
//! instance it wraps publishes to that slot, so targets built with the
//! factory's [`Session`] see the transaction of whichever instance is
//! currently executing on their thread.

use crate::interceptor::Transactional;
use crate::session::Session;
use txscope_concurrency::TransactionManager;
use txscope_core::{FactoryProvider, ResourceManagerFactory, Result, TransactionalPolicy};

/// Default pool of [`TransactionalFactory::with_provider`], meant for tests
pub const DEFAULT_POOL: &str = "test";

/// Builds [`Transactional`] instances sharing a manager and a session.
pub struct TransactionalFactory<F: ResourceManagerFactory> {
    manager: TransactionManager<F>,
    session: Session<F::Manager>,
    pool: Option<String>,
}

impl<F: ResourceManagerFactory> Clone for TransactionalFactory<F> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            session: self.session.clone(),
            pool: self.pool.clone(),
        }
    }
}

impl<F: ResourceManagerFactory> TransactionalFactory<F> {
    /// Create a factory over `manager`
    pub fn new(manager: TransactionManager<F>) -> Self {
        tracing::trace!(default_pool = manager.default_pool(), "TransactionalFactory()");
        Self {
            manager,
            session: Session::new(),
            pool: None,
        }
    }

    /// Create a factory with its own manager on [`DEFAULT_POOL`]
    pub fn with_provider(provider: impl FactoryProvider<F>) -> Result<Self> {
        Ok(Self::new(TransactionManager::new(DEFAULT_POOL, provider)?))
    }

    /// Run instances built from now on against `pool`
    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Manager creating the transactions
    pub fn manager(&self) -> &TransactionManager<F> {
        &self.manager
    }

    /// Session handle to inject into targets
    pub fn session(&self) -> Session<F::Manager> {
        self.session.clone()
    }

    /// Wrap an already built target
    pub fn new_instance<T>(&self, target: T, policy: TransactionalPolicy) -> Transactional<T, F> {
        let instance = Transactional::new(
            target,
            self.manager.clone(),
            self.session.clone(),
            policy,
        );
        match &self.pool {
            Some(pool) => instance.with_pool(pool.clone()),
            None => instance,
        }
    }

    /// Build a target from the factory's session and wrap it
    pub fn new_instance_with<T>(
        &self,
        build: impl FnOnce(Session<F::Manager>) -> T,
        policy: TransactionalPolicy,
    ) -> Transactional<T, F> {
        self.new_instance(build(self.session()), policy)
    }

    /// Destroy the manager, closing every factory
    pub fn destroy(&self) -> Result<()> {
        self.manager.destroy()
    }
}

impl<F: ResourceManagerFactory> std::fmt::Debug for TransactionalFactory<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalFactory")
            .field("manager", &self.manager)
            .field("pool", &self.pool)
            .finish()
    }
}
