//! Transaction manager for coordinating transaction boundaries
//!
//! Provides one transaction per thread per manager by orchestrating:
//! 1. Thread binding (nested requests join the bound transaction)
//! 2. Factory lookup (lazily created per pool name)
//! 3. Transaction creation (begin unless read-only)
//!
//! ## Create Sequence
//!
//! ```text
//! 1. Transaction bound on this thread? -> increment nesting level, return it
//! 2. Resolve pool name (None -> default pool)
//! 3. Factory registry lookup; build the factory on first use of the pool
//! 4. factory.create_resource_manager()
//! 5. Transaction::begin() - begins the resource manager unless read-only
//! 6. Bind the transaction on this thread
//! ```
//!
//! The binding is cleared by the transaction itself when it is fully closed.

use crate::registry::FactoryRegistry;
use crate::slot::ThreadSlot;
use crate::transaction::{Transaction, TransactionOwner};
use crate::working_unit::WorkingUnit;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use txscope_core::{
    ConfigError, DefaultPoolSource, FactoryProvider, IllegalState, ResourceManagerFactory, Result,
    TransactionError,
};

type ManagedTransaction<F> = Transaction<<F as ResourceManagerFactory>::Manager>;

struct ManagerInner<F: ResourceManagerFactory> {
    /// Pool used when a request names none
    default_pool: String,

    /// Builds the factory of a pool on first use
    provider: Box<dyn FactoryProvider<F>>,

    /// Factories keyed by pool name
    factories: FactoryRegistry<F>,

    /// Transaction bound on each thread
    current: ThreadSlot<ManagedTransaction<F>>,

    /// Next transaction ID
    next_txn_id: AtomicU64,

    /// Set once by destroy()
    destroyed: AtomicBool,
}

impl<F: ResourceManagerFactory> ManagerInner<F> {
    fn close_factories(&self) -> Result<()> {
        let mut failures = self
            .factories
            .close_all()
            .into_iter()
            .map(|(pool, e)| TransactionError::factory(pool, e));
        match failures.next() {
            None => Ok(()),
            Some(first) => Err(failures.fold(first, TransactionError::with_suppressed)),
        }
    }
}

// Called by a transaction when it is fully closed
impl<F: ResourceManagerFactory> TransactionOwner for ManagerInner<F> {
    fn destroy_transaction(&self) {
        self.current.take();
    }
}

impl<F: ResourceManagerFactory> Drop for ManagerInner<F> {
    fn drop(&mut self) {
        if !self.destroyed.load(Ordering::SeqCst) && !self.factories.is_empty() {
            tracing::debug!("Transaction manager dropped before destroy(), closing factories");
            let _ = self.close_factories();
        }
    }
}

/// Manages transaction lifecycle across pools
///
/// TransactionManager coordinates:
/// - A registry of resource manager factories, one per pool name
/// - The transaction bound on each thread
/// - Working units executed within transaction boundaries ([`exec`])
///
/// Cloning is cheap and yields a handle to the same manager.
///
/// # Thread Safety
///
/// The manager is shared between threads. Each thread sees only its own
/// bound transaction; transactions themselves never leave their thread.
/// Factory creation on a pool's first use is serialized so that exactly one
/// factory is built per pool name even when threads race on it.
///
/// # Shutdown
///
/// [`destroy`] closes every factory exactly once. It must not be called
/// while transactions are outstanding; this is a precondition, not checked.
///
/// [`exec`]: TransactionManager::exec
/// [`destroy`]: TransactionManager::destroy
pub struct TransactionManager<F: ResourceManagerFactory> {
    inner: Arc<ManagerInner<F>>,
}

impl<F: ResourceManagerFactory> Clone for TransactionManager<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceManagerFactory> TransactionManager<F> {
    /// Create a transaction manager
    ///
    /// # Arguments
    /// * `default_pool` - Pool used when a request names none
    /// * `provider` - Builds the factory of a pool from its name
    ///
    /// # Errors
    /// A configuration error if the default pool name cannot be resolved.
    pub fn new(
        default_pool: impl DefaultPoolSource,
        provider: impl FactoryProvider<F>,
    ) -> Result<Self> {
        Self::builder()
            .default_pool(default_pool)
            .provider(provider)
            .build()
    }

    /// Start building a manager
    pub fn builder() -> TransactionManagerBuilder<F> {
        TransactionManagerBuilder {
            default_pool: None,
            provider: None,
        }
    }

    /// Name of the default pool
    pub fn default_pool(&self) -> &str {
        &self.inner.default_pool
    }

    /// Create a read-write transaction
    ///
    /// If a transaction is already bound on this thread it is joined and
    /// returned as is, whatever `pool` says.
    ///
    /// # Arguments
    /// * `pool` - Pool name, `None` for the default pool
    pub fn create_transaction(&self, pool: Option<&str>) -> Result<ManagedTransaction<F>> {
        self.create(pool, false)
    }

    /// Create a read-only transaction
    ///
    /// Same joining rules as [`create_transaction`]: a bound read-write
    /// transaction stays read-write.
    ///
    /// [`create_transaction`]: TransactionManager::create_transaction
    pub fn create_read_only_transaction(
        &self,
        pool: Option<&str>,
    ) -> Result<ManagedTransaction<F>> {
        self.create(pool, true)
    }

    fn create(&self, pool: Option<&str>, read_only: bool) -> Result<ManagedTransaction<F>> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(IllegalState::ManagerDestroyed.into());
        }

        if let Some(current) = self.inner.current.get() {
            current.increment_nesting_level();
            return Ok(current);
        }

        let pool = pool.unwrap_or(&self.inner.default_pool);
        let factory = self
            .inner
            .factories
            .get_or_create(pool, self.inner.provider.as_ref())?;
        let resource_manager = factory
            .create_resource_manager()
            .map_err(|e| TransactionError::factory(pool, e))?;

        let txn_id = self.next_txn_id();
        let owner: Arc<dyn TransactionOwner> = self.inner.clone();
        let transaction = Transaction::begin(txn_id, pool, owner, resource_manager, read_only)?;
        self.inner.current.set(transaction.clone());
        Ok(transaction)
    }

    /// Allocate next transaction ID
    fn next_txn_id(&self) -> u64 {
        self.inner.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Transaction bound on this thread, if any
    pub fn current_transaction(&self) -> Option<ManagedTransaction<F>> {
        self.inner.current.get()
    }

    /// Nesting level of the transaction bound on this thread
    pub fn current_nesting_level(&self) -> Option<usize> {
        self.current_transaction().map(|t| t.nesting_level())
    }

    /// Execute a working unit within transaction boundaries
    ///
    /// Creates (or joins) a transaction, runs `unit` with it and `args`,
    /// commits on success and rolls back on failure. The transaction is
    /// closed in every case, including when the unit panics.
    ///
    /// # Errors
    /// - [`TransactionError::WorkingUnit`] wrapping the unit's failure, with
    ///   rollback / close failures attached as suppressed
    /// - commit and close failures otherwise
    ///
    /// Failures are never retried here.
    ///
    /// # Nesting
    ///
    /// A unit may call `exec` again on the same manager. The nested call
    /// joins the bound transaction; only the outermost call commits. The
    /// resource manager must not be borrowed across such a call.
    pub fn exec<A, W>(&self, pool: Option<&str>, unit: W, args: A) -> Result<W::Output>
    where
        W: WorkingUnit<F::Manager, A>,
    {
        let transaction = self.create_transaction(pool)?;
        let mut unwind = transaction.unwind_guard();

        let outcome = match unit.exec(&transaction, args) {
            Ok(value) => transaction.commit().map(|_| value),
            Err(source) => {
                let mut err = TransactionError::WorkingUnit {
                    source,
                    suppressed: Vec::new(),
                };
                if let Err(rollback_err) = transaction.rollback() {
                    tracing::warn!(txn_id = transaction.id(), error = %rollback_err, "Rollback failed after working unit failure");
                    err = err.with_suppressed(rollback_err);
                }
                Err(err)
            }
        };
        unwind.disarm();

        match (outcome, transaction.close()) {
            (outcome, Ok(_)) => outcome,
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Err(close_err)) => {
                tracing::warn!(txn_id = transaction.id(), error = %close_err, "Close failed after {}", e);
                Err(e.with_suppressed(close_err))
            }
        }
    }

    /// [`exec`](TransactionManager::exec) on the default pool
    pub fn exec_default<A, W>(&self, unit: W, args: A) -> Result<W::Output>
    where
        W: WorkingUnit<F::Manager, A>,
    {
        self.exec(None, unit, args)
    }

    /// Whether a factory was already built for `pool`
    pub fn has_factory(&self, pool: &str) -> bool {
        self.inner.factories.contains(pool)
    }

    /// Number of factories built so far
    pub fn factory_count(&self) -> usize {
        self.inner.factories.len()
    }

    /// Whether [`destroy`](TransactionManager::destroy) was called
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Close every factory
    ///
    /// Runs once; later calls return `Ok(())` without side effects. All
    /// factories are closed even if some fail; the first failure is returned
    /// with the others attached as suppressed.
    ///
    /// # Precondition
    /// No transaction is outstanding on any thread.
    pub fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::trace!("destroy()");
        self.inner.close_factories()
    }
}

impl<F: ResourceManagerFactory> std::fmt::Debug for TransactionManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("default_pool", &self.inner.default_pool)
            .field("pools", &self.inner.factories.pools())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Builder for [`TransactionManager`]
///
/// ```ignore
/// let manager = TransactionManager::builder()
///     .default_pool(&config)
///     .provider(|pool: &str| open_pool(pool))
///     .build()?;
/// ```
pub struct TransactionManagerBuilder<F: ResourceManagerFactory> {
    default_pool: Option<std::result::Result<String, ConfigError>>,
    provider: Option<Box<dyn FactoryProvider<F>>>,
}

impl<F: ResourceManagerFactory> TransactionManagerBuilder<F> {
    /// Resolve the default pool name now, from a name or a configuration
    pub fn default_pool(mut self, source: impl DefaultPoolSource) -> Self {
        self.default_pool = Some(source.default_pool_name());
        self
    }

    /// Set the factory provider
    pub fn provider(mut self, provider: impl FactoryProvider<F>) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Build the manager
    ///
    /// # Errors
    /// A configuration error if the default pool could not be resolved or
    /// no provider was set.
    pub fn build(self) -> Result<TransactionManager<F>> {
        let default_pool = self.default_pool.unwrap_or(Err(ConfigError::MissingPool))?;
        let provider = self.provider.ok_or(ConfigError::MissingProvider)?;

        tracing::trace!(default_pool = %default_pool, "TransactionManager()");
        Ok(TransactionManager {
            inner: Arc::new(ManagerInner {
                default_pool,
                provider,
                factories: FactoryRegistry::new(),
                current: ThreadSlot::new(),
                next_txn_id: AtomicU64::new(1),
                destroyed: AtomicBool::new(false),
            }),
        })
    }
}
