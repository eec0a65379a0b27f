use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::container::arguments::Arguments;
use crate::container::descriptor::{Parameter, TypeDescriptor};
use crate::container::instance::Instance;
use crate::container::scope::Scope;
use crate::container::signature::{AnnotationExtractor, ErasedBuild, Provider};
use crate::errors::ContainerError;

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// One registered satisfier of a [`TypeDescriptor`]
pub struct Binding {
    id: u64,
    descriptor: TypeDescriptor,
    scope: Scope,
    implementation: &'static str,
    parameters: Option<Vec<Parameter>>,
    build: Option<ErasedBuild>,
    cache: RwLock<Option<Instance>>,
}

impl Binding {
    /// Build a binding, rejecting providers that eagerly depend on their own bound type
    pub fn new<I: ?Sized + Send + Sync + 'static>(
        descriptor: TypeDescriptor,
        provider: Provider<I>,
        scope: Scope,
    ) -> Result<Self, ContainerError> {
        if let Some(parameters) = provider.extract() {
            if let Some(parameter) = parameters
                .iter()
                .find(|parameter| parameter.shape.references_eagerly(&descriptor))
            {
                return Err(ContainerError::SelfReference {
                    service_type: descriptor.to_string(),
                    parameter: parameter.name.clone(),
                });
            }
        }

        let parts = provider.into_parts();
        Ok(Self {
            id: NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed),
            descriptor,
            scope,
            implementation: parts.implementation,
            parameters: parts.parameters,
            build: parts.build,
            cache: RwLock::new(parts.value),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn implementation(&self) -> &'static str {
        self.implementation
    }

    pub fn parameters(&self) -> Option<&[Parameter]> {
        self.parameters.as_deref()
    }

    /// Ready-made values are returned verbatim and never constructed
    pub fn is_value(&self) -> bool {
        self.parameters.is_none()
    }

    pub fn cached(&self) -> Result<Option<Instance>, ContainerError> {
        let cache = self
            .cache
            .read()
            .map_err(|_| ContainerError::lock("binding_cache"))?;
        Ok(cache.clone())
    }

    /// Fill the cache slot. When another caller filled it first, that instance wins.
    pub fn store(&self, instance: Instance) -> Result<Instance, ContainerError> {
        let mut cache = self
            .cache
            .write()
            .map_err(|_| ContainerError::lock("binding_cache"))?;
        Ok(cache.get_or_insert(instance).clone())
    }

    /// Empty the cache slot; values keep theirs
    pub fn clear(&self) -> Result<(), ContainerError> {
        if self.is_value() {
            return Ok(());
        }
        let mut cache = self
            .cache
            .write()
            .map_err(|_| ContainerError::lock("binding_cache"))?;
        *cache = None;
        Ok(())
    }

    pub(crate) fn restore(&self, instance: Option<Instance>) -> Result<(), ContainerError> {
        if self.is_value() {
            return Ok(());
        }
        let mut cache = self
            .cache
            .write()
            .map_err(|_| ContainerError::lock("binding_cache"))?;
        *cache = instance;
        Ok(())
    }

    /// Run the implementation with already-resolved arguments
    pub fn construct(&self, args: &mut Arguments) -> Result<Instance, ContainerError> {
        match &self.build {
            Some(build) => build(args),
            None => self
                .cached()?
                .ok_or_else(|| ContainerError::not_found(self.descriptor.to_string())),
        }
    }
}

impl AnnotationExtractor for Binding {
    fn extract(&self) -> Option<&[Parameter]> {
        self.parameters()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("scope", &self.scope)
            .field("implementation", &self.implementation)
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    trait Node: Send + Sync {}
    struct Leaf;
    impl Node for Leaf {}

    #[test]
    fn test_self_reference_rejected() {
        let provider = Provider::<dyn Node>::factory(vec![Parameter::of::<dyn Node>("next")], |_| {
            Ok(Arc::new(Leaf) as Arc<dyn Node>)
        });
        let err = Binding::new(TypeDescriptor::of::<dyn Node>(), provider, Scope::Transient).unwrap_err();
        assert!(err.is_self_reference());
    }

    #[test]
    fn test_self_reference_through_collection_rejected() {
        let provider = Provider::<dyn Node>::factory(vec![Parameter::all::<dyn Node>("children")], |_| {
            Ok(Arc::new(Leaf) as Arc<dyn Node>)
        });
        assert!(Binding::new(TypeDescriptor::of::<dyn Node>(), provider, Scope::Singleton).is_err());
    }

    #[test]
    fn test_forward_self_reference_allowed() {
        let provider = Provider::<dyn Node>::factory(vec![Parameter::forward::<dyn Node>("next")], |_| {
            Ok(Arc::new(Leaf) as Arc<dyn Node>)
        });
        assert!(Binding::new(TypeDescriptor::of::<dyn Node>(), provider, Scope::Singleton).is_ok());
    }

    #[test]
    fn test_value_cache_is_permanent() {
        let binding = Binding::new(
            TypeDescriptor::of::<dyn Node>(),
            Provider::value(Arc::new(Leaf) as Arc<dyn Node>),
            Scope::Singleton,
        )
        .unwrap();

        assert!(binding.is_value());
        binding.clear().unwrap();
        assert!(binding.cached().unwrap().is_some());
    }

    #[test]
    fn test_store_first_write_wins() {
        let binding = Binding::new(
            TypeDescriptor::of::<dyn Node>(),
            Provider::<dyn Node>::factory(Vec::new(), |_| Ok(Arc::new(Leaf) as Arc<dyn Node>)),
            Scope::Singleton,
        )
        .unwrap();

        let first = Instance::new(Arc::new(Leaf) as Arc<dyn Node>);
        let second = Instance::new(Arc::new(Leaf) as Arc<dyn Node>);
        binding.store(first.clone()).unwrap();
        assert!(binding.store(second).unwrap().ptr_eq(&first));

        binding.clear().unwrap();
        assert!(binding.cached().unwrap().is_none());
    }
}
