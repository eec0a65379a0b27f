//! Deferred handles that break construction cycles.
//!
//! A parameter declared with [`Parameter::forward`](crate::container::Parameter::forward)
//! receives a [`ForwardRef`] instead of an eagerly resolved instance. Nothing
//! is resolved until [`ForwardRef::get`] is first called; the result is then
//! cached inside the handle and shared by all of its clones.
//!
//! Resolution happens in the context the handle was created in. A handle
//! used while the bindings that requested it are still being constructed
//! reports a [`ContainerError::CircularDependency`] instead of recursing.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, Weak};

use tracing::trace;

use crate::container::descriptor::TypeDescriptor;
use crate::container::instance::Instance;
use crate::container::resolver::{ResolutionPath, WeakResolver};
use crate::container::scope::ContextLayer;
use crate::errors::ContainerError;

struct ForwardState {
    descriptor: TypeDescriptor,
    resolver: WeakResolver,
    context: Weak<ContextLayer>,
    origin: ResolutionPath,
    resolved: OnceLock<Instance>,
}

/// Type-erased forward reference
#[derive(Clone)]
pub struct ForwardHandle {
    state: Arc<ForwardState>,
}

impl ForwardHandle {
    pub(crate) fn new(
        descriptor: TypeDescriptor,
        resolver: WeakResolver,
        context: Weak<ContextLayer>,
        origin: ResolutionPath,
    ) -> Self {
        Self {
            state: Arc::new(ForwardState {
                descriptor,
                resolver,
                context,
                origin,
                resolved: OnceLock::new(),
            }),
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.state.descriptor
    }

    pub fn is_resolved(&self) -> bool {
        self.state.resolved.get().is_some()
    }

    /// Resolve on first use, then return the cached instance
    pub fn instance(&self) -> Result<Instance, ContainerError> {
        if let Some(instance) = self.state.resolved.get() {
            return Ok(instance.clone());
        }

        let state = &self.state;
        let dropped = || ContainerError::ResolverDropped {
            service_type: state.descriptor.to_string(),
        };
        let resolver = state.resolver.upgrade().ok_or_else(dropped)?;
        let context = state.context.upgrade().ok_or_else(dropped)?;

        trace!(service = %state.descriptor, context = %context.id(), "forward reference resolving");
        let mut path = state.origin.live();
        let instance = resolver
            .resolve_one(&state.descriptor, &context, &mut path)?
            .ok_or_else(|| ContainerError::not_found(state.descriptor.to_string()))?;

        // a concurrent first access may have won; every clone sees the stored one
        let _ = state.resolved.set(instance.clone());
        Ok(state.resolved.get().cloned().unwrap_or(instance))
    }
}

impl fmt::Debug for ForwardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardHandle")
            .field("descriptor", &self.state.descriptor)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Lazily resolved dependency on `T`.
///
/// Consuming code calls [`get`](ForwardRef::get) where it would otherwise use
/// the dependency directly.
pub struct ForwardRef<T: ?Sized> {
    handle: ForwardHandle,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ForwardRef<T> {
    pub(crate) fn from_handle(handle: ForwardHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> Result<Arc<T>, ContainerError> {
        let instance = self.handle.instance()?;
        instance.downcast_for::<T>(self.handle.descriptor())
    }

    pub fn is_resolved(&self) -> bool {
        self.handle.is_resolved()
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        self.handle.descriptor()
    }
}

impl<T: ?Sized> Clone for ForwardRef<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ForwardRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardRef")
            .field("descriptor", &self.handle.state.descriptor)
            .field("resolved", &self.handle.state.resolved.get().is_some())
            .finish()
    }
}
