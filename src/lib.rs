//! # txscope
//!
//! Transaction boundaries for persistence sessions across nested call chains.
//!
//! txscope scopes units of work in transactions over an external resource
//! manager (a persistence session), reusing one transaction across nested
//! calls on the same thread and finalizing it only at the outermost level.
//!
//! ## Quick Start
//!
//! ```ignore
//! use txscope::prelude::*;
//!
//! let config = PersistenceConfig::from_path("persistence.toml")?;
//! let manager = TransactionManager::builder()
//!     .default_pool(&config)
//!     .provider(|pool: &str| open_pool(pool))
//!     .build()?;
//!
//! // Working unit: commit on Ok, rollback on Err, always close
//! let total = manager.exec_default(|txn: &Transaction<Session>, (a, b): (i64, i64)| {
//!     txn.resource_manager()?.save(a + b)
//! }, (2, 3))?;
//!
//! // Intercepted object: policy per method
//! let factory = TransactionalFactory::new(manager.clone());
//! let ledger = factory.new_instance_with(
//!     |session| Ledger::new(session),
//!     PolicyBuilder::new().method("balance", Marker::Immutable).build(),
//! );
//! ledger.invoke("deposit", |l| l.deposit(10))?;
//!
//! manager.destroy()?;
//! ```
//!
//! ## Crates
//!
//! - `txscope-core` - errors, resource manager capabilities, policy markers,
//!   the in-memory reference resource manager ([`memory`])
//! - `txscope-concurrency` - transactions, thread binding, the manager
//! - `txscope-config` - pool configuration
//! - `txscope-engine` - interceptor, session accessor, instance factory

#![warn(missing_docs)]

pub mod prelude;

pub use txscope_core::memory;

// Re-export main entry points
pub use txscope_concurrency::{
    ThreadSlot, Transaction, TransactionManager, TransactionManagerBuilder, UnwindGuard,
    WorkingUnit,
};
pub use txscope_config::{PersistenceConfig, PoolConfig};
pub use txscope_core::{
    BoxError, ConfigError, DefaultPoolSource, FactoryProvider, IllegalState, LifecycleOp, Marker,
    Policy, PolicyBuilder, ResourceManager, ResourceManagerFactory, Result, TransactionError,
    TransactionalPolicy,
};
pub use txscope_engine::{InvocationError, Session, Transactional, TransactionalFactory};
