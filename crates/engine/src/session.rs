//! Resource-context accessor
//!
//! Application objects do not hold a resource manager; they hold a
//! [`Session`] and ask it for the resource manager of the transaction that
//! the interceptor published on the current thread.

use std::sync::Arc;
use txscope_concurrency::{SlotGuard, ThreadSlot, Transaction};
use txscope_core::{IllegalState, ResourceManager, Result};

/// Injectable handle to the published resource manager.
///
/// Clones share the same slot. The handle is `Send + Sync`; what it resolves
/// to depends on the calling thread.
pub struct Session<M: ResourceManager> {
    slot: Arc<ThreadSlot<Transaction<M>>>,
}

impl<M: ResourceManager> Clone for Session<M> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<M: ResourceManager> Session<M> {
    /// Create a session with its own slot
    pub fn new() -> Self {
        Self {
            slot: Arc::new(ThreadSlot::new()),
        }
    }

    /// Run `f` against the published resource manager
    ///
    /// # Errors
    /// - [`IllegalState::NoActiveTransaction`] outside any transactional call
    /// - [`IllegalState::Closed`] if the published transaction was already
    ///   closed by the caller
    /// - [`IllegalState::ResourceManagerBorrowed`] when called from inside
    ///   another `with` on the same thread
    pub fn with<R>(&self, f: impl FnOnce(&mut M) -> R) -> Result<R> {
        let transaction = self
            .slot
            .get()
            .ok_or(IllegalState::NoActiveTransaction)?;
        transaction.with_resource_manager(f)
    }

    /// Whether an open transaction is published on this thread
    pub fn is_active(&self) -> bool {
        self.slot.get().map_or(false, |t| !t.is_closed())
    }

    /// Transaction published on this thread
    pub fn transaction(&self) -> Option<Transaction<M>> {
        self.slot.get()
    }

    /// Publish `transaction` until the guard drops
    pub(crate) fn publish(&self, transaction: Transaction<M>) -> SlotGuard<'_, Transaction<M>> {
        self.slot.scoped(transaction)
    }
}

impl<M: ResourceManager> Default for Session<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ResourceManager> std::fmt::Debug for Session<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.is_active())
            .finish()
    }
}
