//! Shared fixtures: an accounts service and manager construction helpers.

use thiserror::Error;
use txscope::memory::{MemoryCatalog, MemoryFactory, MemoryResourceManager};
use txscope::{
    BoxError, Marker, PolicyBuilder, Session, Transaction, TransactionError, TransactionManager,
    Transactional, TransactionalFactory,
};

/// Transaction handle given to working units.
pub type Txn = Transaction<MemoryResourceManager>;

/// Install a subscriber honoring `RUST_LOG`; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Manager over a fresh catalog.
pub fn manager(default_pool: &str) -> (TransactionManager<MemoryFactory>, MemoryCatalog) {
    init_tracing();
    let catalog = MemoryCatalog::new();
    let manager = TransactionManager::new(default_pool, catalog.clone()).unwrap();
    (manager, catalog)
}

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("negative amount: {0}")]
    NegativeAmount(i64),
    #[error("store failure: {0}")]
    Store(BoxError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Service reading and writing balances through its session.
pub struct Accounts {
    session: Session<MemoryResourceManager>,
}

impl Accounts {
    pub fn new(session: Session<MemoryResourceManager>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session<MemoryResourceManager> {
        &self.session
    }

    pub fn read_balance(&self) -> Result<i64, AccountsError> {
        let balance = self
            .session
            .with(|rm| rm.get("balance"))?
            .map_err(AccountsError::Store)?;
        Ok(balance.unwrap_or(0))
    }

    pub fn transfer(&self, amount: i64) -> Result<i64, AccountsError> {
        if amount < 0 {
            return Err(AccountsError::NegativeAmount(amount));
        }
        let balance = self.read_balance()? + amount;
        self.session
            .with(|rm| rm.put("balance", balance))?
            .map_err(AccountsError::Store)?;
        Ok(balance)
    }

    pub fn audit(&self, entry: i64) -> Result<(), AccountsError> {
        let count = self
            .session
            .with(|rm| rm.get("audit"))?
            .map_err(AccountsError::Store)?
            .unwrap_or(0);
        self.session
            .with(|rm| rm.put("audit", count + entry))?
            .map_err(AccountsError::Store)
    }
}

/// `read_balance` immutable, everything else mutable.
pub fn accounts_policy() -> txscope::TransactionalPolicy {
    PolicyBuilder::new()
        .method("read_balance", Marker::Immutable)
        .build()
}

/// Intercepted accounts service on pool "accounts".
pub fn accounts() -> (Transactional<Accounts, MemoryFactory>, MemoryCatalog) {
    let (manager, catalog) = manager("accounts");
    let factory = TransactionalFactory::new(manager);
    let accounts = factory.new_instance_with(Accounts::new, accounts_policy());
    (accounts, catalog)
}
