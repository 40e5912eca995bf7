//! Error types for transaction boundaries.
//!
//! Every failure raised by this workspace is a [`TransactionError`]. Failures
//! coming from collaborators (resource managers, factories, working units) are
//! carried as [`BoxError`] and stay reachable through
//! [`std::error::Error::source`].
//!
//! ## Suppressed errors
//!
//! Cleanup runs after a primary failure (rollback after a failed working unit,
//! close after a failed commit) may fail too. The primary failure is always
//! the one returned; cleanup failures ride along as suppressed errors, see
//! [`TransactionError::with_suppressed`].

use std::fmt;
use thiserror::Error;

/// Boxed error raised by an external collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for transaction operations.
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Resource manager operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    /// `begin()`
    Begin,
    /// `commit()`
    Commit,
    /// `rollback()`
    Rollback,
    /// `close()`
    Close,
}

impl LifecycleOp {
    /// Lower-case operation name, as used in messages and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOp::Begin => "begin",
            LifecycleOp::Commit => "commit",
            LifecycleOp::Rollback => "rollback",
            LifecycleOp::Close => "close",
        }
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Programmer errors in the consumer of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IllegalState {
    /// Commit requested on a read-only transaction
    #[error("read-only transaction does not allow commit")]
    ReadOnlyCommit,

    /// Rollback requested on a read-only transaction
    #[error("read-only transaction does not allow rollback")]
    ReadOnlyRollback,

    /// Operation on a transaction that is already closed
    #[error("transaction is closed")]
    Closed,

    /// Resource context accessed outside any active transaction
    #[error("no active transaction on current thread")]
    NoActiveTransaction,

    /// Transaction requested after the manager was destroyed
    #[error("transaction manager is destroyed")]
    ManagerDestroyed,

    /// Resource manager requested while a previous borrow is still alive
    #[error("resource manager is already borrowed")]
    ResourceManagerBorrowed,
}

/// Configuration failures, fatal at manager construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No pool is declared, so there is no default pool name
    #[error("invalid persistence configuration: missing pool name")]
    MissingPool,

    /// Configuration source could not be read
    #[error("cannot read persistence configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration source is not well formed
    #[error("invalid persistence configuration: {0}")]
    Parse(String),

    /// No way to build factories was configured
    #[error("no resource manager factory provider configured")]
    MissingProvider,
}

/// All transaction boundary errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource manager lifecycle operation failed
    #[error("failed to {op} resource manager: {source}")]
    Lifecycle {
        /// Operation that failed
        op: LifecycleOp,
        /// Underlying failure
        #[source]
        source: BoxError,
    },

    /// Factory or resource manager could not be created for a pool
    #[error("cannot create resource manager for pool |{pool}|: {source}")]
    Factory {
        /// Pool name
        pool: String,
        /// Underlying failure
        #[source]
        source: BoxError,
    },

    /// Illegal usage of a transaction
    #[error("illegal state: {0}")]
    IllegalState(#[from] IllegalState),

    /// Working unit executed by `exec` failed
    #[error("working unit failed: {source}")]
    WorkingUnit {
        /// Failure raised by the working unit
        #[source]
        source: BoxError,
        /// Cleanup failures raised after it
        suppressed: Vec<TransactionError>,
    },

    /// Primary error with cleanup failures attached
    #[error("{error}")]
    Suppressed {
        /// Primary failure
        error: Box<TransactionError>,
        /// Cleanup failures raised after it
        suppressed: Vec<TransactionError>,
    },
}

impl TransactionError {
    /// Wrap a collaborator failure raised by a lifecycle operation.
    pub fn lifecycle(op: LifecycleOp, source: impl Into<BoxError>) -> Self {
        TransactionError::Lifecycle {
            op,
            source: source.into(),
        }
    }

    /// Wrap a failure raised while creating a factory or resource manager.
    pub fn factory(pool: impl Into<String>, source: impl Into<BoxError>) -> Self {
        TransactionError::Factory {
            pool: pool.into(),
            source: source.into(),
        }
    }

    /// Attach a cleanup failure to this error.
    ///
    /// The receiver stays the primary error.
    pub fn with_suppressed(self, cleanup: TransactionError) -> Self {
        match self {
            TransactionError::WorkingUnit {
                source,
                mut suppressed,
            } => {
                suppressed.push(cleanup);
                TransactionError::WorkingUnit { source, suppressed }
            }
            TransactionError::Suppressed {
                error,
                mut suppressed,
            } => {
                suppressed.push(cleanup);
                TransactionError::Suppressed { error, suppressed }
            }
            primary => TransactionError::Suppressed {
                error: Box::new(primary),
                suppressed: vec![cleanup],
            },
        }
    }

    /// The primary error, looking through suppression wrappers.
    pub fn primary(&self) -> &TransactionError {
        match self {
            TransactionError::Suppressed { error, .. } => error.primary(),
            other => other,
        }
    }

    /// Cleanup failures attached to this error.
    pub fn suppressed(&self) -> &[TransactionError] {
        match self {
            TransactionError::WorkingUnit { suppressed, .. }
            | TransactionError::Suppressed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Illegal-state kind, if this is a usage error.
    pub fn illegal_state(&self) -> Option<&IllegalState> {
        match self.primary() {
            TransactionError::IllegalState(state) => Some(state),
            _ => None,
        }
    }

    /// Check if this is a usage error.
    pub fn is_illegal_state(&self) -> bool {
        self.illegal_state().is_some()
    }

    /// Check if a resource manager lifecycle operation failed.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self.primary(), TransactionError::Lifecycle { .. })
    }

    /// Lifecycle operation that failed, if any.
    pub fn lifecycle_op(&self) -> Option<LifecycleOp> {
        match self.primary() {
            TransactionError::Lifecycle { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Check if this is a fatal configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self.primary(), TransactionError::Config(_))
    }

    /// Check if a working unit failed.
    pub fn is_working_unit(&self) -> bool {
        matches!(self.primary(), TransactionError::WorkingUnit { .. })
    }
}
