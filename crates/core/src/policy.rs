//! Immutable / mutable policy for transactional operations.
//!
//! A wrapped operation runs either inside a committing read-write
//! transaction ([`Policy::Mutable`]) or inside a read-only one
//! ([`Policy::Immutable`]). The policy comes from markers attached to the
//! target type, to the capability sets it implements, and to individual
//! methods:
//!
//! 1. Type level: the declaring type is checked first, then each capability
//!    set in declaration order; the first immutable marker found makes the
//!    whole type immutable.
//! 2. Method level: an immutable marker on the method (capability or
//!    implementation declaration) makes it immutable, then a mutable marker
//!    makes it mutable. Method markers beat the type-level policy.
//! 3. Without any marker an operation is mutable.
//!
//! Markers are declared once through [`PolicyBuilder`] and resolved into a
//! [`TransactionalPolicy`] table at build time.

use std::collections::HashMap;

/// Marker attachable to a type, a capability set or a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Read-only, no transaction boundaries
    Immutable,
    /// Read-write, commit on success and rollback on failure
    Mutable,
}

/// Effective transactional policy of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Policy {
    /// Executed within a read-only transaction
    Immutable,
    /// Executed within a read-write transaction
    #[default]
    Mutable,
}

impl Policy {
    /// Whether the operation runs in a read-only transaction.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Policy::Immutable)
    }
}

impl From<Marker> for Policy {
    fn from(marker: Marker) -> Self {
        match marker {
            Marker::Immutable => Policy::Immutable,
            Marker::Mutable => Policy::Mutable,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Markers {
    immutable: bool,
    mutable: bool,
}

impl Markers {
    fn mark(&mut self, marker: Marker) {
        match marker {
            Marker::Immutable => self.immutable = true,
            Marker::Mutable => self.mutable = true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MethodMarkers {
    capability: Markers,
    implementation: Markers,
}

impl MethodMarkers {
    fn resolve(&self, type_policy: Policy) -> Policy {
        let mut policy = type_policy;
        if self.capability.immutable || self.implementation.immutable {
            policy = Policy::Immutable;
        }
        if self.capability.mutable || self.implementation.mutable {
            policy = Policy::Mutable;
        }
        policy
    }
}

/// Declares markers for a wrapped target.
///
/// ```ignore
/// let policy = PolicyBuilder::new()
///     .capability("Accounts", None)
///     .method("read_balance", Marker::Immutable)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    declaring_immutable: bool,
    capabilities: Vec<(String, bool)>,
    methods: HashMap<String, MethodMarkers>,
}

impl PolicyBuilder {
    /// Create a builder with no markers
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the declaring type immutable
    pub fn immutable_type(mut self) -> Self {
        self.declaring_immutable = true;
        self
    }

    /// Declare a capability set implemented by the target.
    ///
    /// Only an immutable marker is meaningful at type level.
    pub fn capability(mut self, name: impl Into<String>, marker: Option<Marker>) -> Self {
        self.capabilities
            .push((name.into(), marker == Some(Marker::Immutable)));
        self
    }

    /// Mark a method on the implementation
    pub fn method(mut self, name: impl Into<String>, marker: Marker) -> Self {
        self.methods
            .entry(name.into())
            .or_default()
            .implementation
            .mark(marker);
        self
    }

    /// Mark a method as declared on a capability set
    pub fn capability_method(mut self, name: impl Into<String>, marker: Marker) -> Self {
        self.methods
            .entry(name.into())
            .or_default()
            .capability
            .mark(marker);
        self
    }

    /// Resolve every declared method once.
    pub fn build(self) -> TransactionalPolicy {
        let type_source = if self.declaring_immutable {
            Some(TypeSource::Declaring)
        } else {
            self.capabilities
                .iter()
                .find(|(_, immutable)| *immutable)
                .map(|(name, _)| TypeSource::Capability(name.clone()))
        };
        let type_policy = if type_source.is_some() {
            Policy::Immutable
        } else {
            Policy::Mutable
        };

        let methods = self
            .methods
            .into_iter()
            .map(|(name, markers)| {
                let policy = markers.resolve(type_policy);
                (name, policy)
            })
            .collect();

        TransactionalPolicy {
            type_policy,
            type_source,
            methods,
        }
    }
}

/// Where a type-level immutable marker was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSource {
    /// On the declaring type
    Declaring,
    /// On the named capability set
    Capability(String),
}

/// Resolved policy table for one wrapped target.
#[derive(Debug, Clone, Default)]
pub struct TransactionalPolicy {
    type_policy: Policy,
    type_source: Option<TypeSource>,
    methods: HashMap<String, Policy>,
}

impl TransactionalPolicy {
    /// Table where every operation is mutable
    pub fn mutable() -> Self {
        Self::default()
    }

    /// Table where every operation is immutable
    pub fn immutable() -> Self {
        PolicyBuilder::new().immutable_type().build()
    }

    /// Policy applied to methods without their own marker
    pub fn type_policy(&self) -> Policy {
        self.type_policy
    }

    /// Where the type-level immutable marker came from, if any
    pub fn type_source(&self) -> Option<&TypeSource> {
        self.type_source.as_ref()
    }

    /// Effective policy for `method`
    pub fn resolve(&self, method: &str) -> Policy {
        self.methods
            .get(method)
            .copied()
            .unwrap_or(self.type_policy)
    }
}
