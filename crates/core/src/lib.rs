//! Core types for txscope
//!
//! This crate defines what the rest of the workspace builds on:
//! - [`ResourceManager`] / [`ResourceManagerFactory`]: capabilities consumed
//!   from the persistence engine
//! - [`TransactionError`]: the error taxonomy
//! - [`Policy`] and [`PolicyBuilder`]: immutable / mutable markers
//! - [`memory`]: an in-memory reference resource manager

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod policy;
pub mod resource;

pub use error::{BoxError, ConfigError, IllegalState, LifecycleOp, Result, TransactionError};
pub use policy::{Marker, Policy, PolicyBuilder, TransactionalPolicy, TypeSource};
pub use resource::{DefaultPoolSource, FactoryProvider, ResourceManager, ResourceManagerFactory};
