//! Concurrency layer for txscope
//!
//! This crate binds transactions to threads:
//! - ThreadSlot: typed per-thread cells, one key per owner
//! - Transaction: nesting-aware lifecycle over one resource manager
//! - FactoryRegistry: lazily built factories, one per pool name
//! - TransactionManager: create / join / exec / destroy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod registry;
pub mod slot;
pub mod transaction;
pub mod working_unit;

pub use manager::{TransactionManager, TransactionManagerBuilder};
pub use registry::FactoryRegistry;
pub use slot::{SlotGuard, ThreadSlot};
pub use transaction::{Transaction, UnwindGuard};
pub use working_unit::WorkingUnit;
