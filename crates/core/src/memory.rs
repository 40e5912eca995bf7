//! In-memory reference resource manager
//!
//! A small integer-cell store implementing the resource capabilities:
//!
//! - [`MemoryFactory`]: one pool; owns the shared store and a [`Journal`]
//! - [`MemoryResourceManager`]: a session over the store; writes are staged
//!   while a transaction is active, applied on commit and dropped on rollback.
//!   Without an active transaction writes go straight to the store.
//! - [`MemoryCatalog`]: a [`FactoryProvider`] creating one factory per pool
//!   name and counting how many times each pool was built
//!
//! Every lifecycle call is counted in the journal and any of them can be made
//! to fail through [`Faults`], which is what the tests in this workspace rely
//! on.

use crate::error::{BoxError, LifecycleOp};
use crate::resource::{FactoryProvider, ResourceManager, ResourceManagerFactory};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type Store = Arc<Mutex<BTreeMap<String, i64>>>;

/// Counters of lifecycle calls observed by one pool.
#[derive(Debug, Default)]
pub struct Journal {
    created: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    factory_closes: AtomicUsize,
}

impl Journal {
    /// Resource managers created
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// `begin()` calls
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    /// `commit()` calls
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// `rollback()` calls
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Resource manager `close()` calls
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Factory `close()` calls
    pub fn factory_closes(&self) -> usize {
        self.factory_closes.load(Ordering::SeqCst)
    }
}

/// Injected failures, shared by a factory and its resource managers.
#[derive(Debug, Default)]
pub struct Faults {
    ops: Mutex<HashSet<LifecycleOp>>,
    create: AtomicBool,
    factory_close: AtomicBool,
}

impl Faults {
    /// Make `op` fail on every resource manager of the pool
    pub fn fail(&self, op: LifecycleOp) {
        self.ops.lock().insert(op);
    }

    /// Stop failing `op`
    pub fn heal(&self, op: LifecycleOp) {
        self.ops.lock().remove(&op);
    }

    /// Make resource manager creation fail
    pub fn fail_create(&self, fail: bool) {
        self.create.store(fail, Ordering::SeqCst);
    }

    /// Make factory close fail
    pub fn fail_factory_close(&self, fail: bool) {
        self.factory_close.store(fail, Ordering::SeqCst);
    }

    fn check(&self, op: LifecycleOp) -> Result<(), BoxError> {
        if self.ops.lock().contains(&op) {
            return Err(format!("injected {} failure", op).into());
        }
        Ok(())
    }
}

struct FactoryInner {
    pool: String,
    store: Store,
    journal: Arc<Journal>,
    faults: Arc<Faults>,
    closed: AtomicBool,
}

/// In-memory pool. Cloning shares the pool.
#[derive(Clone)]
pub struct MemoryFactory {
    inner: Arc<FactoryInner>,
}

impl MemoryFactory {
    /// Create an empty pool
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                pool: pool.into(),
                store: Arc::new(Mutex::new(BTreeMap::new())),
                journal: Arc::new(Journal::default()),
                faults: Arc::new(Faults::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Pool name
    pub fn pool(&self) -> &str {
        &self.inner.pool
    }

    /// Lifecycle counters
    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// Failure injection
    pub fn faults(&self) -> &Faults {
        &self.inner.faults
    }

    /// Committed value of `key`
    pub fn value(&self, key: &str) -> Option<i64> {
        self.inner.store.lock().get(key).copied()
    }

    /// Seed a committed value
    pub fn seed(&self, key: impl Into<String>, value: i64) {
        self.inner.store.lock().insert(key.into(), value);
    }

    /// Whether `close()` was called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFactory")
            .field("pool", &self.inner.pool)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ResourceManagerFactory for MemoryFactory {
    type Manager = MemoryResourceManager;

    fn create_resource_manager(&self) -> Result<MemoryResourceManager, BoxError> {
        if self.is_closed() {
            return Err(format!("pool |{}| is closed", self.inner.pool).into());
        }
        if self.inner.faults.create.load(Ordering::SeqCst) {
            return Err("injected create failure".into());
        }
        self.inner.journal.created.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(pool = %self.inner.pool, "create_resource_manager()");
        Ok(MemoryResourceManager {
            pool: self.inner.pool.clone(),
            store: Arc::clone(&self.inner.store),
            staged: None,
            open: true,
            journal: Arc::clone(&self.inner.journal),
            faults: Arc::clone(&self.inner.faults),
        })
    }

    fn close(&self) -> Result<(), BoxError> {
        self.inner.journal.factory_closes.fetch_add(1, Ordering::SeqCst);
        if self.inner.faults.factory_close.load(Ordering::SeqCst) {
            return Err("injected factory close failure".into());
        }
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Session over a [`MemoryFactory`] store.
pub struct MemoryResourceManager {
    pool: String,
    store: Store,
    // None outside a transaction; a `None` value is a staged delete
    staged: Option<BTreeMap<String, Option<i64>>>,
    open: bool,
    journal: Arc<Journal>,
    faults: Arc<Faults>,
}

impl MemoryResourceManager {
    fn ensure_open(&self) -> Result<(), BoxError> {
        if !self.open {
            return Err("resource manager is closed".into());
        }
        Ok(())
    }

    /// Read `key`, seeing this session's staged writes
    pub fn get(&self, key: &str) -> Result<Option<i64>, BoxError> {
        self.ensure_open()?;
        if let Some(staged) = self.staged.as_ref().and_then(|s| s.get(key)) {
            return Ok(*staged);
        }
        Ok(self.store.lock().get(key).copied())
    }

    /// Write `key`
    pub fn put(&mut self, key: impl Into<String>, value: i64) -> Result<(), BoxError> {
        self.ensure_open()?;
        match self.staged.as_mut() {
            Some(staged) => {
                staged.insert(key.into(), Some(value));
            }
            None => {
                self.store.lock().insert(key.into(), value);
            }
        }
        Ok(())
    }

    /// Delete `key`
    pub fn delete(&mut self, key: &str) -> Result<(), BoxError> {
        self.ensure_open()?;
        match self.staged.as_mut() {
            Some(staged) => {
                staged.insert(key.to_string(), None);
            }
            None => {
                self.store.lock().remove(key);
            }
        }
        Ok(())
    }

    /// Whether a transaction is active on this session
    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }
}

impl ResourceManager for MemoryResourceManager {
    fn begin(&mut self) -> Result<(), BoxError> {
        tracing::trace!(pool = %self.pool, "begin()");
        self.journal.begins.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        self.faults.check(LifecycleOp::Begin)?;
        if self.staged.is_some() {
            return Err("transaction already active".into());
        }
        self.staged = Some(BTreeMap::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), BoxError> {
        tracing::trace!(pool = %self.pool, "commit()");
        self.journal.commits.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        self.faults.check(LifecycleOp::Commit)?;
        let staged = self.staged.take().ok_or("no active transaction")?;
        let mut store = self.store.lock();
        for (key, value) in staged {
            match value {
                Some(value) => store.insert(key, value),
                None => store.remove(&key),
            };
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BoxError> {
        tracing::trace!(pool = %self.pool, "rollback()");
        self.journal.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        self.faults.check(LifecycleOp::Rollback)?;
        self.staged = None;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        tracing::trace!(pool = %self.pool, "close()");
        self.journal.closes.fetch_add(1, Ordering::SeqCst);
        self.faults.check(LifecycleOp::Close)?;
        self.staged = None;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Provider creating a fresh [`MemoryFactory`] per pool name.
///
/// Cloning shares the catalog, so a test can keep a handle while the
/// manager owns another.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    pools: Arc<Mutex<HashMap<String, MemoryFactory>>>,
    builds: Arc<Mutex<HashMap<String, usize>>>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create the factory for `pool`; the next build for that pool hands it out
    pub fn register(&self, factory: MemoryFactory) {
        self.pools
            .lock()
            .insert(factory.pool().to_string(), factory);
    }

    /// Latest factory built or registered for `pool`
    pub fn factory(&self, pool: &str) -> Option<MemoryFactory> {
        self.pools.lock().get(pool).cloned()
    }

    /// How many times a factory was built for `pool`
    pub fn builds(&self, pool: &str) -> usize {
        self.builds.lock().get(pool).copied().unwrap_or(0)
    }
}

impl FactoryProvider<MemoryFactory> for MemoryCatalog {
    fn create_factory(&self, pool: &str) -> Result<MemoryFactory, BoxError> {
        *self.builds.lock().entry(pool.to_string()).or_insert(0) += 1;
        let factory = self
            .pools
            .lock()
            .entry(pool.to_string())
            .or_insert_with(|| MemoryFactory::new(pool))
            .clone();
        Ok(factory)
    }
}
