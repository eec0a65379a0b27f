use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use crate::container::binding::Binding;
use crate::container::descriptor::TypeDescriptor;
use crate::container::forward::{ForwardHandle, ForwardRef};
use crate::container::instance::Instance;
use crate::container::resolver::{ResolutionPath, WeakResolver};
use crate::container::scope::ContextLayer;
use crate::errors::ContainerError;

/// Value produced by the condition chain for one parameter
#[derive(Debug)]
pub enum Resolved {
    /// Optional parameter with nothing bound
    Absent,
    Single(Instance),
    Many(Vec<Instance>),
    Lazy(LazyInstances),
    Deferred(ForwardHandle),
}

impl Resolved {
    pub fn kind(&self) -> &'static str {
        match self {
            Resolved::Absent => "absent",
            Resolved::Single(_) => "single",
            Resolved::Many(_) => "many",
            Resolved::Lazy(_) => "lazy",
            Resolved::Deferred(_) => "deferred",
        }
    }
}

/// Keyword map of resolved parameters, in declaration order.
///
/// Accessors take the value out of the map, so each argument is read once.
#[derive(Debug, Default)]
pub struct Arguments {
    values: Vec<(String, Resolved)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Resolved) {
        let name = name.into();
        match self.values.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.values
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove and return the raw resolved value
    pub fn take(&mut self, name: &str) -> Result<Resolved, ContainerError> {
        let position = self
            .values
            .iter()
            .position(|(existing, _)| existing == name)
            .ok_or_else(|| ContainerError::MissingArgument {
                name: name.to_string(),
            })?;
        Ok(self.values.remove(position).1)
    }

    pub fn single<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<Arc<T>, ContainerError> {
        match self.take(name)? {
            Resolved::Single(instance) => downcast_argument(name, &instance),
            other => Err(mismatch(name, "single", &other)),
        }
    }

    pub fn optional<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        match self.take(name)? {
            Resolved::Absent => Ok(None),
            Resolved::Single(instance) => downcast_argument(name, &instance).map(Some),
            other => Err(mismatch(name, "single or absent", &other)),
        }
    }

    pub fn all<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<Vec<Arc<T>>, ContainerError> {
        match self.take(name)? {
            Resolved::Many(instances) => instances
                .iter()
                .map(|instance| downcast_argument(name, instance))
                .collect(),
            other => Err(mismatch(name, "many", &other)),
        }
    }

    pub fn lazy<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<Lazy<T>, ContainerError> {
        match self.take(name)? {
            Resolved::Lazy(instances) => Ok(Lazy {
                inner: instances,
                _marker: PhantomData,
            }),
            other => Err(mismatch(name, "lazy", &other)),
        }
    }

    pub fn forward<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<ForwardRef<T>, ContainerError> {
        match self.take(name)? {
            Resolved::Deferred(handle) => Ok(ForwardRef::from_handle(handle)),
            other => Err(mismatch(name, "deferred", &other)),
        }
    }
}

fn downcast_argument<T: ?Sized + Send + Sync + 'static>(
    name: &str,
    instance: &Instance,
) -> Result<Arc<T>, ContainerError> {
    instance
        .downcast::<T>()
        .ok_or_else(|| ContainerError::InstanceTypeMismatch {
            service_type: format!("argument '{}' ({})", name, instance.type_name()),
            expected: std::any::type_name::<T>().to_string(),
        })
}

fn mismatch(name: &str, expected: &str, found: &Resolved) -> ContainerError {
    ContainerError::ArgumentMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

/// Single-pass sequence that constructs each matching binding when it is reached
pub struct LazyInstances {
    descriptor: TypeDescriptor,
    pending: VecDeque<Arc<Binding>>,
    resolver: WeakResolver,
    context: Weak<ContextLayer>,
    path: ResolutionPath,
}

impl LazyInstances {
    pub(crate) fn new(
        descriptor: TypeDescriptor,
        pending: Vec<Arc<Binding>>,
        resolver: WeakResolver,
        context: Weak<ContextLayer>,
        path: ResolutionPath,
    ) -> Self {
        Self {
            descriptor,
            pending: pending.into(),
            resolver,
            context,
            path,
        }
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Bindings not yet reached
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for LazyInstances {
    type Item = Result<Instance, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let binding = self.pending.pop_front()?;
        let dropped = || ContainerError::ResolverDropped {
            service_type: self.descriptor.to_string(),
        };
        let resolver = match self.resolver.upgrade() {
            Some(resolver) => resolver,
            None => return Some(Err(dropped())),
        };
        let context = match self.context.upgrade() {
            Some(context) => context,
            None => return Some(Err(dropped())),
        };
        let mut path = self.path.live();
        Some(resolver.instantiate(&binding, &context, &mut path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pending.len()))
    }
}

impl fmt::Debug for LazyInstances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyInstances")
            .field("descriptor", &self.descriptor)
            .field("remaining", &self.pending.len())
            .finish()
    }
}

/// Typed view over [`LazyInstances`]
pub struct Lazy<T: ?Sized> {
    inner: LazyInstances,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    pub fn remaining(&self) -> usize {
        self.inner.remaining()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Iterator for Lazy<T> {
    type Item = Result<Arc<T>, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.inner.descriptor.clone();
        self.inner
            .next()
            .map(|result| result.and_then(|instance| instance.downcast_for::<T>(&descriptor)))
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lazy").field(&self.inner).finish()
    }
}
