//! Capabilities consumed from the persistence engine.
//!
//! The persistence engine is opaque. All this workspace needs from it is a
//! session with transaction boundaries ([`ResourceManager`]), a per-pool
//! factory producing sessions ([`ResourceManagerFactory`]), a way to build
//! a factory from a pool name ([`FactoryProvider`]) and the name of the
//! default pool ([`DefaultPoolSource`]).

use crate::error::{BoxError, ConfigError};

/// Persistence session with explicit transaction boundaries.
///
/// A resource manager is confined to the thread that created it; it is
/// owned by exactly one transaction until that transaction closes.
pub trait ResourceManager: 'static {
    /// Start a transaction on the underlying session
    fn begin(&mut self) -> Result<(), BoxError>;

    /// Make pending changes durable
    fn commit(&mut self) -> Result<(), BoxError>;

    /// Discard pending changes
    fn rollback(&mut self) -> Result<(), BoxError>;

    /// Release the session
    fn close(&mut self) -> Result<(), BoxError>;

    /// Whether the session is still usable
    fn is_open(&self) -> bool;
}

/// Factory owning pool-level resources for one named pool.
///
/// Shared between threads; closed exactly once when the owning manager is
/// destroyed.
pub trait ResourceManagerFactory: Send + Sync + 'static {
    /// Resource manager type produced by this factory.
    type Manager: ResourceManager;

    /// Produce a fresh resource manager
    fn create_resource_manager(&self) -> Result<Self::Manager, BoxError>;

    /// Release pool-level resources
    fn close(&self) -> Result<(), BoxError>;
}

/// Builds the factory backing a pool, given the pool name.
///
/// The pool name doubles as the backing-store identifier. Implemented for
/// any `Fn(&str) -> Result<F, E>` closure.
///
/// # Re-entrancy
///
/// The provider runs while the pool it builds is marked as being
/// initialized. It may request factories of other pools from the same
/// manager, but must not request the pool it is building: that call blocks
/// forever.
pub trait FactoryProvider<F: ResourceManagerFactory>: Send + Sync + 'static {
    /// Create the factory for `pool`
    fn create_factory(&self, pool: &str) -> Result<F, BoxError>;
}

impl<F, P, E> FactoryProvider<F> for P
where
    F: ResourceManagerFactory,
    P: Fn(&str) -> Result<F, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    fn create_factory(&self, pool: &str) -> Result<F, BoxError> {
        self(pool).map_err(Into::into)
    }
}

/// Source of the default pool name, resolved once when a manager is built.
pub trait DefaultPoolSource {
    /// Name of the default pool
    fn default_pool_name(&self) -> Result<String, ConfigError>;
}

impl DefaultPoolSource for str {
    fn default_pool_name(&self) -> Result<String, ConfigError> {
        let name = self.trim();
        if name.is_empty() {
            return Err(ConfigError::MissingPool);
        }
        Ok(name.to_string())
    }
}

impl DefaultPoolSource for String {
    fn default_pool_name(&self) -> Result<String, ConfigError> {
        self.as_str().default_pool_name()
    }
}

impl<S: DefaultPoolSource + ?Sized> DefaultPoolSource for &S {
    fn default_pool_name(&self) -> Result<String, ConfigError> {
        (**self).default_pool_name()
    }
}
