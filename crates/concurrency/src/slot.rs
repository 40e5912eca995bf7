//! Thread-scoped slots
//!
//! A [`ThreadSlot`] is a typed cell whose content is private to the calling
//! thread. Every slot instance has its own key, so two managers never see
//! each other's bindings even on the same thread.
//!
//! The slot handle itself is `Send + Sync` and can live inside shared state;
//! only the values are thread-confined. Values are stored in a
//! `thread_local!` map keyed by slot id and are dropped with the thread.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SLOTS: RefCell<HashMap<u64, Box<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Typed per-thread cell.
pub struct ThreadSlot<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> ThreadSlot<T> {
    /// Create a slot with a fresh key
    pub fn new() -> Self {
        Self {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    /// Clone of the value bound on the current thread
    pub fn get(&self) -> Option<T> {
        SLOTS.with(|slots| {
            slots
                .borrow()
                .get(&self.id)
                .and_then(|value| value.downcast_ref::<T>())
                .cloned()
        })
    }

    /// Whether a value is bound on the current thread
    pub fn is_set(&self) -> bool {
        SLOTS.with(|slots| slots.borrow().contains_key(&self.id))
    }

    /// Bind `value` on the current thread, returning the previous value
    pub fn set(&self, value: T) -> Option<T> {
        let previous = SLOTS.with(|slots| slots.borrow_mut().insert(self.id, Box::new(value)));
        previous.and_then(|value| value.downcast::<T>().ok()).map(|value| *value)
    }

    /// Unbind and return the value of the current thread
    pub fn take(&self) -> Option<T> {
        // try_with: may run while thread locals are being torn down
        let removed = SLOTS
            .try_with(|slots| slots.borrow_mut().remove(&self.id))
            .ok()
            .flatten();
        removed
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Bind `value` until the returned guard drops, then restore what was
    /// bound before.
    pub fn scoped(&self, value: T) -> SlotGuard<'_, T> {
        let previous = self.set(value);
        SlotGuard {
            slot: self,
            previous,
        }
    }
}

impl<T: Clone + 'static> Default for ThreadSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ThreadSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSlot").field("id", &self.id).finish()
    }
}

/// Restores a slot's previous value on drop.
pub struct SlotGuard<'a, T: Clone + 'static> {
    slot: &'a ThreadSlot<T>,
    previous: Option<T>,
}

impl<T: Clone + 'static> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                self.slot.set(previous);
            }
            None => {
                self.slot.take();
            }
        }
    }
}
