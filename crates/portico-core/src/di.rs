//! Service registration and resolution.
//!
//! This module provides the small dependency injection capability the hosting
//! layer builds on. Services are registered on a [`ServiceCollection`] during
//! startup, compiled into a [`ServiceProvider`], and resolved by type.
//!
//! Three lifetimes are supported:
//!
//! | Lifetime | Cached where | Notes |
//! |----------|--------------|-------|
//! | Singleton | Root provider | Shared by every scope |
//! | Scoped | Each [`ServiceScope`] | Cannot be resolved from the root |
//! | Transient | Nowhere | A new instance per resolution |
//!
//! # Example
//!
//! ```rust
//! use portico_core::di::ServiceCollection;
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.add_singleton(Arc::new(Database {
//!     connection_string: "postgres://localhost/db".to_string(),
//! }));
//!
//! let provider = services.build_provider();
//! let db: Arc<Database> = provider.resolve().unwrap();
//! assert_eq!(db.connection_string, "postgres://localhost/db");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// A resolved service with its concrete type erased.
///
/// The `Any` payload is always an `Arc<T>`, which lets unsized services
/// such as `dyn Trait` be stored alongside sized ones.
type Erased = Arc<dyn Any + Send + Sync>;

type ErasedFactory = Arc<dyn Fn(&ServiceProvider) -> Result<Erased, InjectionError> + Send + Sync>;

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone, Error)]
pub enum InjectionError {
    /// No registration exists for the requested type.
    #[error("Failed to inject {type_name}: service not registered")]
    NotRegistered {
        /// The type name that could not be resolved.
        type_name: &'static str,
    },

    /// A scoped service was requested outside of a scope.
    #[error("Failed to inject {type_name}: scoped services cannot be resolved from the root provider")]
    ScopedFromRoot {
        /// The scoped type name.
        type_name: &'static str,
    },

    /// The provider (or its root) has already been disposed.
    #[error("Failed to inject {type_name}: the service provider has been disposed")]
    Disposed {
        /// The type name that was requested.
        type_name: &'static str,
    },

    /// A factory failed or produced an unexpected value.
    #[error("Failed to inject {type_name}: {reason}")]
    Custom {
        /// The type name that could not be resolved.
        type_name: &'static str,
        /// The reason for the failure.
        reason: String,
    },
}

impl InjectionError {
    /// Creates a new injection error for a missing service.
    pub fn not_registered<T: ?Sized>() -> Self {
        Self::NotRegistered {
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Creates a new injection error with a custom reason.
    pub fn custom<T: ?Sized>(reason: impl Into<String>) -> Self {
        Self::Custom {
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }

    /// Returns the name of the type that failed to resolve.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::NotRegistered { type_name }
            | Self::ScopedFromRoot { type_name }
            | Self::Disposed { type_name }
            | Self::Custom { type_name, .. } => type_name,
        }
    }
}

/// How long a resolved service instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    /// One instance for the whole provider tree.
    Singleton,
    /// One instance per [`ServiceScope`].
    Scoped,
    /// A new instance on every resolution.
    Transient,
}

#[derive(Clone)]
enum ServiceSource {
    Instance(Erased),
    Factory(ErasedFactory),
}

#[derive(Clone)]
struct ServiceDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    lifetime: ServiceLifetime,
    source: ServiceSource,
}

/// An ordered list of service registrations.
///
/// Registering the same type more than once keeps every registration:
/// single resolution returns the last one, [`ServiceProvider::resolve_all`]
/// returns all of them in registration order.
#[derive(Clone, Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    /// Creates a new empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// Registers an existing instance as a singleton.
    ///
    /// # Example
    ///
    /// ```rust
    /// use portico_core::di::ServiceCollection;
    /// use std::sync::Arc;
    ///
    /// trait Greeter: Send + Sync {
    ///     fn greet(&self) -> String;
    /// }
    ///
    /// struct English;
    ///
    /// impl Greeter for English {
    ///     fn greet(&self) -> String {
    ///         "hello".to_string()
    ///     }
    /// }
    ///
    /// let mut services = ServiceCollection::new();
    /// services.add_singleton::<dyn Greeter>(Arc::new(English));
    ///
    /// let provider = services.build_provider();
    /// assert_eq!(provider.resolve::<dyn Greeter>().unwrap().greet(), "hello");
    /// ```
    pub fn add_singleton<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let erased: Erased = Arc::new(instance);
        self.push::<T>(ServiceLifetime::Singleton, ServiceSource::Instance(erased))
    }

    /// Registers a singleton created lazily on first resolution.
    pub fn add_singleton_factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, InjectionError> + Send + Sync + 'static,
    {
        self.push::<T>(ServiceLifetime::Singleton, erase_factory(factory))
    }

    /// Registers a service created once per scope.
    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, InjectionError> + Send + Sync + 'static,
    {
        self.push::<T>(ServiceLifetime::Scoped, erase_factory(factory))
    }

    /// Registers a service created on every resolution.
    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, InjectionError> + Send + Sync + 'static,
    {
        self.push::<T>(ServiceLifetime::Transient, erase_factory(factory))
    }

    /// Registers a singleton instance unless `T` is already registered.
    pub fn try_add_singleton<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if !self.contains::<T>() {
            self.add_singleton(instance);
        }
        self
    }

    /// Registers a scoped factory unless `T` is already registered.
    pub fn try_add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<Arc<T>, InjectionError> + Send + Sync + 'static,
    {
        if !self.contains::<T>() {
            self.add_scoped(factory);
        }
        self
    }

    /// Removes every registration of `T`.
    pub fn remove_all<T: ?Sized + 'static>(&mut self) -> &mut Self {
        let type_id = TypeId::of::<T>();
        self.descriptors.retain(|d| d.type_id != type_id);
        self
    }

    /// Returns the lifetime of the last registration of `T`, if any.
    #[must_use]
    pub fn lifetime_of<T: ?Sized + 'static>(&self) -> Option<ServiceLifetime> {
        let type_id = TypeId::of::<T>();
        self.descriptors
            .iter()
            .rev()
            .find(|d| d.type_id == type_id)
            .map(|d| d.lifetime)
    }

    /// Checks if a service is registered.
    #[must_use]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        let type_id = TypeId::of::<T>();
        self.descriptors.iter().any(|d| d.type_id == type_id)
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Compiles the registrations into a root provider.
    ///
    /// The collection is left untouched and can be built again; each build
    /// produces an independent provider with its own singleton cache.
    #[must_use]
    pub fn build_provider(&self) -> ServiceProvider {
        let mut by_type: HashMap<TypeId, Vec<usize>> = HashMap::new();
        for (index, descriptor) in self.descriptors.iter().enumerate() {
            by_type.entry(descriptor.type_id).or_default().push(index);
        }

        ServiceProvider {
            inner: Arc::new(ProviderInner {
                registry: Arc::new(Registry {
                    descriptors: self.descriptors.clone(),
                    by_type,
                }),
                singletons: Arc::new(InstanceCache::default()),
                root_disposed: Arc::new(AtomicBool::new(false)),
                scope: None,
            }),
        }
    }

    fn push<T: ?Sized + 'static>(
        &mut self,
        lifetime: ServiceLifetime,
        source: ServiceSource,
    ) -> &mut Self {
        self.descriptors.push(ServiceDescriptor {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            lifetime,
            source,
        });
        self
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field(
                "services",
                &self
                    .descriptors
                    .iter()
                    .map(|d| (d.type_name, d.lifetime))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn erase_factory<T, F>(factory: F) -> ServiceSource
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&ServiceProvider) -> Result<Arc<T>, InjectionError> + Send + Sync + 'static,
{
    ServiceSource::Factory(Arc::new(move |provider: &ServiceProvider| {
        factory(provider).map(|service| Arc::new(service) as Erased)
    }))
}

fn downcast<T: ?Sized + 'static>(erased: &Erased) -> Result<Arc<T>, InjectionError> {
    erased
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| InjectionError::custom::<T>("registered instance has an unexpected type"))
}

struct Registry {
    descriptors: Vec<ServiceDescriptor>,
    by_type: HashMap<TypeId, Vec<usize>>,
}

#[derive(Default)]
struct InstanceCache {
    instances: Mutex<HashMap<usize, Erased>>,
}

impl InstanceCache {
    fn get_or_create(
        &self,
        index: usize,
        create: impl FnOnce() -> Result<Erased, InjectionError>,
    ) -> Result<Erased, InjectionError> {
        if let Some(existing) = self.instances.lock().get(&index) {
            return Ok(Arc::clone(existing));
        }

        // The factory may resolve other services, so it runs unlocked.
        let created = create()?;
        Ok(Arc::clone(
            self.instances.lock().entry(index).or_insert(created),
        ))
    }

    fn drain(&self) -> HashMap<usize, Erased> {
        std::mem::take(&mut *self.instances.lock())
    }
}

struct ScopeState {
    root: ServiceProvider,
    cache: InstanceCache,
    disposed: AtomicBool,
}

struct ProviderInner {
    registry: Arc<Registry>,
    singletons: Arc<InstanceCache>,
    root_disposed: Arc<AtomicBool>,
    scope: Option<ScopeState>,
}

/// Resolves services registered on a [`ServiceCollection`].
///
/// A provider is either the root (built by
/// [`ServiceCollection::build_provider`]) or a scope (created by
/// [`ServiceProvider::create_scope`]). Cloning is cheap and shares state.
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    /// Resolves the last registration of `T`.
    ///
    /// Returns `None` if `T` is not registered. Construction failures are
    /// logged and also reported as `None`; use
    /// [`resolve_required`](Self::resolve_required) to observe them.
    #[must_use]
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self.resolve_required::<T>() {
            Ok(service) => Some(service),
            Err(InjectionError::NotRegistered { .. }) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Optional service resolution failed");
                None
            }
        }
    }

    /// Resolves the last registration of `T` or returns an error.
    pub fn resolve_required<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<T>, InjectionError> {
        self.ensure_live::<T>()?;
        let index = self
            .inner
            .registry
            .by_type
            .get(&TypeId::of::<T>())
            .and_then(|indices| indices.last().copied())
            .ok_or_else(InjectionError::not_registered::<T>)?;

        let erased = self.materialize(index)?;
        downcast::<T>(&erased)
    }

    /// Resolves every registration of `T`, in registration order.
    ///
    /// Returns an empty vector if `T` is not registered.
    pub fn resolve_all<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Vec<Arc<T>>, InjectionError> {
        self.ensure_live::<T>()?;
        let Some(indices) = self.inner.registry.by_type.get(&TypeId::of::<T>()) else {
            return Ok(Vec::new());
        };

        indices
            .iter()
            .map(|&index| self.materialize(index).and_then(|e| downcast::<T>(&e)))
            .collect()
    }

    /// Checks if a service is registered.
    #[must_use]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.inner.registry.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Creates a child scope.
    ///
    /// Scopes created from a scope hang off the same root: singletons are
    /// shared, scoped instances are not.
    #[must_use]
    pub fn create_scope(&self) -> ServiceScope {
        let root = self.root();
        let provider = Self {
            inner: Arc::new(ProviderInner {
                registry: Arc::clone(&self.inner.registry),
                singletons: Arc::clone(&self.inner.singletons),
                root_disposed: Arc::clone(&self.inner.root_disposed),
                scope: Some(ScopeState {
                    root,
                    cache: InstanceCache::default(),
                    disposed: AtomicBool::new(false),
                }),
            }),
        };
        ServiceScope { provider }
    }

    /// Returns `true` if this provider belongs to a scope.
    #[must_use]
    pub fn is_scope(&self) -> bool {
        self.inner.scope.is_some()
    }

    /// Returns `true` once this provider (or its root) has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.root_disposed.load(Ordering::Acquire)
            || self
                .inner
                .scope
                .as_ref()
                .is_some_and(|s| s.disposed.load(Ordering::Acquire))
    }

    /// Releases cached instances.
    ///
    /// Disposing a scope drops its scoped instances. Disposing the root drops
    /// every cached singleton. Disposal is idempotent, and resolutions made
    /// afterwards fail with [`InjectionError::Disposed`].
    pub fn dispose(&self) {
        let drained = match &self.inner.scope {
            Some(scope) => {
                if scope.disposed.swap(true, Ordering::AcqRel) {
                    return;
                }
                scope.cache.drain()
            }
            None => {
                if self.inner.root_disposed.swap(true, Ordering::AcqRel) {
                    return;
                }
                self.inner.singletons.drain()
            }
        };

        tracing::trace!(
            scope = self.is_scope(),
            released = drained.len(),
            "Service provider disposed"
        );
        drop(drained);
    }

    fn root(&self) -> Self {
        match &self.inner.scope {
            Some(scope) => scope.root.clone(),
            None => self.clone(),
        }
    }

    fn ensure_live<T: ?Sized>(&self) -> Result<(), InjectionError> {
        if self.is_disposed() {
            return Err(InjectionError::Disposed {
                type_name: std::any::type_name::<T>(),
            });
        }
        Ok(())
    }

    fn materialize(&self, index: usize) -> Result<Erased, InjectionError> {
        let descriptor = &self.inner.registry.descriptors[index];
        match (&descriptor.source, descriptor.lifetime) {
            (ServiceSource::Instance(instance), _) => Ok(Arc::clone(instance)),
            (ServiceSource::Factory(factory), ServiceLifetime::Transient) => factory(self),
            (ServiceSource::Factory(factory), ServiceLifetime::Singleton) => {
                let root = self.root();
                self.inner
                    .singletons
                    .get_or_create(index, || factory(&root))
            }
            (ServiceSource::Factory(factory), ServiceLifetime::Scoped) => {
                match &self.inner.scope {
                    Some(scope) => scope.cache.get_or_create(index, || factory(self)),
                    None => Err(InjectionError::ScopedFromRoot {
                        type_name: descriptor.type_name,
                    }),
                }
            }
        }
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("service_count", &self.inner.registry.descriptors.len())
            .field("scope", &self.is_scope())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A child scope owning scoped service instances.
///
/// The scope is disposed exactly once, when it is dropped.
pub struct ServiceScope {
    provider: ServiceProvider,
}

impl ServiceScope {
    /// Returns the scoped provider.
    #[must_use]
    pub fn services(&self) -> &ServiceProvider {
        &self.provider
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        self.provider.dispose();
    }
}

impl fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceScope")
            .field("provider", &self.provider)
            .finish()
    }
}
