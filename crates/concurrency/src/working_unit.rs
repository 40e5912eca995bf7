//! Units of work executed by [`TransactionManager::exec`].
//!
//! [`TransactionManager::exec`]: crate::TransactionManager::exec

use crate::transaction::Transaction;
use txscope_core::{BoxError, ResourceManager};

/// Work executed inside a transaction.
///
/// The unit gets the transaction handle rather than the resource manager,
/// and borrows the resource manager per access through
/// [`Transaction::with_resource_manager`]. Between accesses it may call
/// back into the manager; such requests join the same transaction.
///
/// `A` carries the call arguments, usually a tuple. Any closure
/// `FnOnce(&Transaction<M>, A) -> Result<T, E>` is a working unit.
pub trait WorkingUnit<M: ResourceManager, A> {
    /// Value produced on success
    type Output;

    /// Run the unit
    fn exec(self, transaction: &Transaction<M>, args: A) -> Result<Self::Output, BoxError>;
}

impl<M, A, T, E, W> WorkingUnit<M, A> for W
where
    M: ResourceManager,
    W: FnOnce(&Transaction<M>, A) -> Result<T, E>,
    E: Into<BoxError>,
{
    type Output = T;

    fn exec(self, transaction: &Transaction<M>, args: A) -> Result<T, BoxError> {
        self(transaction, args).map_err(Into::into)
    }
}
