//! Convenient imports for txscope.
//!
//! ```ignore
//! use txscope::prelude::*;
//!
//! let manager = TransactionManager::new("accounts", provider)?;
//! manager.exec_default(|txn: &Transaction<Store>, (): ()| txn.resource_manager()?.flush(), ())?;
//! ```

// Manager and transactions
pub use txscope_concurrency::{Transaction, TransactionManager, WorkingUnit};

// Interception
pub use txscope_engine::{InvocationError, Session, Transactional, TransactionalFactory};

// Policy markers
pub use txscope_core::{Marker, Policy, PolicyBuilder, TransactionalPolicy};

// Capabilities
pub use txscope_core::{ResourceManager, ResourceManagerFactory};

// Configuration
pub use txscope_config::PersistenceConfig;

// Error handling
pub use txscope_core::{Result, TransactionError};
