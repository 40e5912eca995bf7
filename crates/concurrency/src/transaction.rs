//! Transaction lifecycle
//!
//! A [`Transaction`] owns exactly one resource manager and drives its
//! transaction boundaries. Nested requests on the same thread share the
//! outermost transaction: the manager increments the nesting level and hands
//! out another handle to the same instance.
//!
//! ## State machine
//!
//! ```text
//!            begin (read-write only)
//!   create ─────────────────────────▶ open(level = 0)
//!                                        │  ▲
//!                 nested create: level+1 │  │ close at level > 0: level-1
//!                                        ▼  │
//!                                     open(level > 0)
//!
//!   open(level = 0) ── commit / rollback / close ──▶ closed
//! ```
//!
//! - `commit` and `rollback` are no-ops while nested; only the outermost
//!   caller finalizes.
//! - Read-only transactions never call begin, commit or rollback on the
//!   resource manager; commit / rollback on them is an illegal-state error.
//! - Once closed every mutating operation fails with
//!   [`IllegalState::Closed`], except `close` which keeps answering "fully
//!   closed".
//! - Closing at level 0 closes the resource manager and then, whatever the
//!   outcome, clears the thread binding held by the manager.

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;
use txscope_core::{IllegalState, LifecycleOp, ResourceManager, Result, TransactionError};

/// Receives the "transaction destroyed" notification.
pub(crate) trait TransactionOwner {
    /// Clear the current thread binding
    fn destroy_transaction(&self);
}

struct Inner<M: ResourceManager> {
    id: u64,
    pool: String,
    owner: Arc<dyn TransactionOwner>,
    resource_manager: RefCell<M>,
    nesting_level: Cell<usize>,
    read_only: bool,
    closed: Cell<bool>,
    /// Closed while borrowed; the resource manager closes on drop
    pending_close: Cell<bool>,
    unused: Cell<bool>,
}

/// Handle to the transaction bound on the current thread.
///
/// Cloning yields another handle to the same transaction. Handles are
/// confined to the thread that created them.
pub struct Transaction<M: ResourceManager> {
    inner: Rc<Inner<M>>,
}

impl<M: ResourceManager> Clone for Transaction<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: ResourceManager> Transaction<M> {
    /// Wrap `resource_manager`, beginning it unless read-only.
    ///
    /// If begin fails the resource manager is closed and nothing is bound.
    pub(crate) fn begin(
        id: u64,
        pool: &str,
        owner: Arc<dyn TransactionOwner>,
        mut resource_manager: M,
        read_only: bool,
    ) -> Result<Self> {
        if !read_only {
            if let Err(e) = resource_manager.begin() {
                let mut err = TransactionError::lifecycle(LifecycleOp::Begin, e);
                if resource_manager.is_open() {
                    if let Err(close_err) = resource_manager.close() {
                        let close_err = TransactionError::lifecycle(LifecycleOp::Close, close_err);
                        tracing::warn!(txn_id = id, pool, error = %close_err, "Close after failed begin failed");
                        err = err.with_suppressed(close_err);
                    }
                }
                return Err(err);
            }
        }

        tracing::debug!(txn_id = id, pool, read_only, "Transaction started");
        Ok(Self {
            inner: Rc::new(Inner {
                id,
                pool: pool.to_string(),
                owner,
                resource_manager: RefCell::new(resource_manager),
                nesting_level: Cell::new(0),
                read_only,
                closed: Cell::new(false),
                pending_close: Cell::new(false),
                unused: Cell::new(true),
            }),
        })
    }

    /// Transaction id, unique per manager
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Pool the resource manager was created from
    pub fn pool(&self) -> &str {
        &self.inner.pool
    }

    /// Whether this is a read-only transaction
    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Whether the transaction is closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Number of nested callers still holding this transaction
    pub fn nesting_level(&self) -> usize {
        self.inner.nesting_level.get()
    }

    /// Whether the resource manager was never handed out
    pub fn is_unused(&self) -> bool {
        self.inner.unused.get()
    }

    /// Whether both handles point to the same transaction
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn increment_nesting_level(&self) {
        let level = self.inner.nesting_level.get() + 1;
        self.inner.nesting_level.set(level);
        tracing::trace!(txn_id = self.inner.id, nesting_level = level, "Join transaction");
    }

    /// Guard that rolls back and closes this transaction if dropped armed.
    ///
    /// Arm it right after creating or joining the transaction and
    /// [`disarm`](UnwindGuard::disarm) it once the normal commit / rollback
    /// path has run; a panic in between still finalizes the transaction.
    pub fn unwind_guard(&self) -> UnwindGuard<'_, M> {
        UnwindGuard {
            transaction: self,
            armed: true,
        }
    }

    /// Borrow the resource manager.
    ///
    /// The borrow must end before the transaction is committed, rolled back
    /// or closed.
    pub fn resource_manager(&self) -> Result<RefMut<'_, M>> {
        self.ensure_open()?;
        let resource_manager = self
            .inner
            .resource_manager
            .try_borrow_mut()
            .map_err(|_| IllegalState::ResourceManagerBorrowed)?;
        self.inner.unused.set(false);
        Ok(resource_manager)
    }

    /// Run `f` against the resource manager
    pub fn with_resource_manager<R>(&self, f: impl FnOnce(&mut M) -> R) -> Result<R> {
        let mut resource_manager = self.resource_manager()?;
        Ok(f(&mut resource_manager))
    }

    /// Commit the outermost transaction and close it.
    ///
    /// No-op while nested. The transaction is closed whether the commit
    /// succeeds or not; a close failure after a failed commit is attached
    /// as suppressed.
    pub fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        if self.inner.nesting_level.get() > 0 {
            return Ok(());
        }
        if self.inner.read_only {
            return Err(IllegalState::ReadOnlyCommit.into());
        }

        let committed = {
            let mut resource_manager = self
                .inner
                .resource_manager
                .try_borrow_mut()
                .map_err(|_| IllegalState::ResourceManagerBorrowed)?;
            resource_manager
                .commit()
                .map_err(|e| TransactionError::lifecycle(LifecycleOp::Commit, e))
        };
        match &committed {
            Ok(()) => tracing::debug!(txn_id = self.inner.id, "Transaction committed"),
            Err(e) => tracing::debug!(txn_id = self.inner.id, error = %e, "Commit failed"),
        }
        self.finish(committed)
    }

    /// Roll back the outermost transaction and close it.
    ///
    /// No-op while nested. Rollback is skipped if the resource manager is no
    /// longer open, but the transaction is closed in every case.
    pub fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        if self.inner.nesting_level.get() > 0 {
            return Ok(());
        }
        if self.inner.read_only {
            return Err(IllegalState::ReadOnlyRollback.into());
        }

        let rolled_back = {
            let mut resource_manager = self
                .inner
                .resource_manager
                .try_borrow_mut()
                .map_err(|_| IllegalState::ResourceManagerBorrowed)?;
            if resource_manager.is_open() {
                resource_manager
                    .rollback()
                    .map_err(|e| TransactionError::lifecycle(LifecycleOp::Rollback, e))
            } else {
                tracing::debug!(txn_id = self.inner.id, "Resource manager already closed, skip rollback");
                Ok(())
            }
        };
        if rolled_back.is_ok() {
            tracing::debug!(txn_id = self.inner.id, "Transaction rolled back");
        }
        self.finish(rolled_back)
    }

    /// Release one nesting level, or close the transaction.
    ///
    /// Returns `true` once the transaction is fully closed and `false` while
    /// an outer caller still holds it. Closing an already closed transaction
    /// returns `true` without side effects.
    ///
    /// Closing while a [`resource_manager`](Transaction::resource_manager)
    /// borrow is alive still closes the transaction and clears the binding,
    /// but fails with [`IllegalState::ResourceManagerBorrowed`]; the resource
    /// manager itself is closed when the last handle drops.
    pub fn close(&self) -> Result<bool> {
        if self.inner.closed.get() {
            return Ok(true);
        }
        let level = self.inner.nesting_level.get();
        if level > 0 {
            self.inner.nesting_level.set(level - 1);
            tracing::trace!(txn_id = self.inner.id, nesting_level = level - 1, "Leave nested transaction");
            return Ok(false);
        }

        self.inner.closed.set(true);
        let closed = match self.inner.resource_manager.try_borrow_mut() {
            Ok(mut resource_manager) => resource_manager
                .close()
                .map_err(|e| TransactionError::lifecycle(LifecycleOp::Close, e)),
            Err(_) => {
                self.inner.pending_close.set(true);
                tracing::warn!(txn_id = self.inner.id, "Closed while resource manager borrowed");
                Err(IllegalState::ResourceManagerBorrowed.into())
            }
        };
        self.inner.owner.destroy_transaction();

        tracing::debug!(txn_id = self.inner.id, pool = %self.inner.pool, "Transaction closed");
        closed.map(|_| true)
    }

    fn finish(&self, outcome: Result<()>) -> Result<()> {
        match (outcome, self.close()) {
            (Ok(()), Ok(_)) => Ok(()),
            (Ok(()), Err(close_err)) => Err(close_err),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(close_err)) => {
                tracing::warn!(txn_id = self.inner.id, error = %close_err, "Close failed after {}", e);
                Err(e.with_suppressed(close_err))
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.get() {
            return Err(IllegalState::Closed.into());
        }
        Ok(())
    }
}

impl<M: ResourceManager> std::fmt::Debug for Transaction<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("pool", &self.inner.pool)
            .field("nesting_level", &self.inner.nesting_level.get())
            .field("read_only", &self.inner.read_only)
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

/// Finalizes a transaction when a call unwinds past it.
///
/// Read-write transactions are rolled back first. Nested holders only
/// release their level.
pub struct UnwindGuard<'a, M: ResourceManager> {
    transaction: &'a Transaction<M>,
    armed: bool,
}

impl<M: ResourceManager> UnwindGuard<'_, M> {
    /// Leave finalization to the caller
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<M: ResourceManager> Drop for UnwindGuard<'_, M> {
    fn drop(&mut self) {
        if !self.armed || self.transaction.is_closed() {
            return;
        }
        let txn_id = self.transaction.id();
        if !self.transaction.is_read_only() {
            if let Err(e) = self.transaction.rollback() {
                tracing::warn!(txn_id, error = %e, "Rollback failed while unwinding");
            }
        }
        if let Err(e) = self.transaction.close() {
            tracing::warn!(txn_id, error = %e, "Close failed while unwinding");
        }
    }
}

impl<M: ResourceManager> Drop for Inner<M> {
    fn drop(&mut self) {
        if self.closed.get() && !self.pending_close.get() {
            return;
        }
        // a bound transaction died with its thread, or was closed while borrowed
        let resource_manager = self.resource_manager.get_mut();
        if resource_manager.is_open() {
            tracing::warn!(txn_id = self.id, pool = %self.pool, "Closing resource manager on drop");
            if let Err(e) = resource_manager.close() {
                tracing::warn!(txn_id = self.id, error = %e, "Close of dropped transaction failed");
            }
        }
    }
}
