//! Transactional interceptor
//!
//! [`Transactional`] wraps a target and runs each call against it within
//! transaction boundaries.
//!
//! ## Invocation Sequence
//!
//! ```text
//! 1. Resolve the method policy (method marker, else type marker)
//! 2. Create a read-only (immutable) or read-write (mutable) transaction
//! 3. Publish it to the session slot
//! 4. Call the target
//! 5. Ok  -> commit if mutable
//!    Err -> rollback if mutable, keep the method error as primary
//! 6. Close the transaction, restore the previously published one
//! ```
//!
//! Nested calls join the outer transaction; their commit and rollback are
//! no-ops and only the outermost call finalizes.

use crate::session::Session;
use std::fmt;
use txscope_concurrency::TransactionManager;
use txscope_core::{ResourceManagerFactory, TransactionError, TransactionalPolicy};

/// Failure of a transactional call.
#[derive(Debug)]
pub enum InvocationError<E> {
    /// The target method failed; its error is returned unchanged
    Method {
        /// Error raised by the method
        error: E,
        /// Rollback and close failures raised after it
        suppressed: Vec<TransactionError>,
    },

    /// The method was not called, or succeeded but the transaction could
    /// not be created, committed or closed
    Transaction(TransactionError),
}

impl<E> InvocationError<E> {
    /// Error raised by the method, if it failed
    pub fn method_error(&self) -> Option<&E> {
        match self {
            InvocationError::Method { error, .. } => Some(error),
            InvocationError::Transaction(_) => None,
        }
    }

    /// Transaction failure, if the method did not fail
    pub fn transaction_error(&self) -> Option<&TransactionError> {
        match self {
            InvocationError::Transaction(e) => Some(e),
            InvocationError::Method { .. } => None,
        }
    }

    /// Cleanup failures attached to a method error
    pub fn suppressed(&self) -> &[TransactionError] {
        match self {
            InvocationError::Method { suppressed, .. } => suppressed,
            InvocationError::Transaction(e) => e.suppressed(),
        }
    }

    /// Split into the method error or the transaction error
    pub fn into_inner(self) -> Result<E, TransactionError> {
        match self {
            InvocationError::Method { error, .. } => Ok(error),
            InvocationError::Transaction(e) => Err(e),
        }
    }

    fn suppress(self, cleanup: TransactionError) -> Self {
        match self {
            InvocationError::Method {
                error,
                mut suppressed,
            } => {
                suppressed.push(cleanup);
                InvocationError::Method { error, suppressed }
            }
            InvocationError::Transaction(e) => {
                InvocationError::Transaction(e.with_suppressed(cleanup))
            }
        }
    }
}

impl<E: fmt::Display> fmt::Display for InvocationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::Method { error, .. } => error.fmt(f),
            InvocationError::Transaction(e) => e.fmt(f),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for InvocationError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvocationError::Method { .. } => None,
            InvocationError::Transaction(e) => Some(e),
        }
    }
}

impl<E> From<TransactionError> for InvocationError<E> {
    fn from(e: TransactionError) -> Self {
        InvocationError::Transaction(e)
    }
}

/// Target whose calls run within transaction boundaries.
pub struct Transactional<T, F: ResourceManagerFactory> {
    target: T,
    manager: TransactionManager<F>,
    session: Session<F::Manager>,
    policy: TransactionalPolicy,
    pool: Option<String>,
}

impl<T, F: ResourceManagerFactory> Transactional<T, F> {
    /// Wrap `target`
    ///
    /// # Arguments
    /// * `manager` - Creates the transactions
    /// * `session` - Slot the resource manager is published to
    /// * `policy` - Immutable / mutable markers of the target
    pub fn new(
        target: T,
        manager: TransactionManager<F>,
        session: Session<F::Manager>,
        policy: TransactionalPolicy,
    ) -> Self {
        tracing::trace!(type_policy = ?policy.type_policy(), "Transactional()");
        Self {
            target,
            manager,
            session,
            policy,
            pool: None,
        }
    }

    /// Run calls on `pool` instead of the default pool
    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Pool used by calls, `None` for the default pool
    pub fn pool(&self) -> Option<&str> {
        self.pool.as_deref()
    }

    /// Policy table of the target
    pub fn policy(&self) -> &TransactionalPolicy {
        &self.policy
    }

    /// Session the resource manager is published to
    pub fn session(&self) -> &Session<F::Manager> {
        &self.session
    }

    /// Wrapped target, bypassing transaction boundaries
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Unwrap the target
    pub fn into_inner(self) -> T {
        self.target
    }

    /// Call `method` on the target within transaction boundaries
    ///
    /// `method` names the call for policy resolution; `call` performs it.
    ///
    /// # Errors
    /// - [`InvocationError::Method`] with the method's own error, rollback
    ///   and close failures attached as suppressed
    /// - [`InvocationError::Transaction`] if the transaction could not be
    ///   created, or commit or close failed after the method succeeded
    pub fn invoke<R, E>(
        &self,
        method: &str,
        call: impl FnOnce(&T) -> Result<R, E>,
    ) -> Result<R, InvocationError<E>> {
        let policy = self.policy.resolve(method);
        let read_only = policy.is_read_only();
        tracing::trace!(method, read_only, "invoke()");

        let transaction = if read_only {
            self.manager.create_read_only_transaction(self.pool())?
        } else {
            self.manager.create_transaction(self.pool())?
        };
        let _published = self.session.publish(transaction.clone());
        let mut unwind = transaction.unwind_guard();

        let outcome = match call(&self.target) {
            Ok(value) if read_only => Ok(value),
            Ok(value) => transaction
                .commit()
                .map(|_| value)
                .map_err(InvocationError::Transaction),
            Err(error) => {
                let mut suppressed = Vec::new();
                if !read_only {
                    if let Err(e) = transaction.rollback() {
                        tracing::warn!(method, txn_id = transaction.id(), error = %e, "Rollback failed after method failure");
                        suppressed.push(e);
                    }
                }
                Err(InvocationError::Method { error, suppressed })
            }
        };
        unwind.disarm();

        match (outcome, transaction.close()) {
            (outcome, Ok(_)) => outcome,
            (Ok(_), Err(close_err)) => Err(InvocationError::Transaction(close_err)),
            (Err(err), Err(close_err)) => {
                tracing::warn!(method, txn_id = transaction.id(), error = %close_err, "Close failed after call failure");
                Err(err.suppress(close_err))
            }
        }
    }
}

impl<T: fmt::Debug, F: ResourceManagerFactory> fmt::Debug for Transactional<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transactional")
            .field("target", &self.target)
            .field("pool", &self.pool)
            .field("policy", &self.policy)
            .finish()
    }
}
