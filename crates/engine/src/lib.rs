//! Transactional engine for txscope
//!
//! This crate puts application objects inside transaction boundaries:
//! - [`Transactional`]: wraps a target; every call runs in a transaction
//!   whose kind follows the target's [`TransactionalPolicy`]
//! - [`Session`]: resource-context accessor injected into targets
//! - [`TransactionalFactory`]: builds wrapped instances sharing a manager
//!   and a session
//!
//! [`TransactionalPolicy`]: txscope_core::TransactionalPolicy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod factory;
pub mod interceptor;
pub mod session;

pub use factory::{TransactionalFactory, DEFAULT_POOL};
pub use interceptor::{InvocationError, Transactional};
pub use session::Session;
