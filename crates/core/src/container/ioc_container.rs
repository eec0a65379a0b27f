use std::sync::{Arc, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::container::arguments::Arguments;
use crate::container::binding::Binding;
use crate::container::conditions::ConditionChain;
use crate::container::debug::RegistrySnapshot;
use crate::container::descriptor::{Parameter, TypeDescriptor};
use crate::container::ioc_builder::IocContainerBuilder;
use crate::container::registry::{Override, Registry};
use crate::container::resolver::{ResolutionPath, Resolver, WeakResolver};
use crate::container::scope::{ContextLayer, Scope};
use crate::container::signature::{Provider, Target};
use crate::errors::ContainerError;

/// Dependency container: global bindings plus a root resolution context
#[derive(Debug)]
pub struct IocContainer {
    resolver: Resolver,
    root: ResolutionContext,
}

impl IocContainer {
    /// Create a new IoC container
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        Self::from_parts(config, ConditionChain::new())
    }

    pub fn builder() -> IocContainerBuilder {
        IocContainerBuilder::new()
    }

    pub(crate) fn from_parts(config: ContainerConfig, conditions: ConditionChain) -> Self {
        let resolver = Resolver::new(
            Arc::new(Registry::new()),
            Arc::new(conditions),
            Arc::new(config),
        );
        let root = ResolutionContext::new(resolver.clone(), ContextLayer::root());
        Self { resolver, root }
    }

    pub fn config(&self) -> &ContainerConfig {
        self.resolver.config()
    }

    /// Register a binding constructed on every lookup
    pub fn register_transient<I: ?Sized + Send + Sync + 'static>(
        &self,
        provider: Provider<I>,
    ) -> Result<(), ContainerError> {
        self.register_keyed(TypeDescriptor::of::<I>(), provider, Scope::Transient)
    }

    /// Register a binding constructed once and cached
    pub fn register_singleton<I: ?Sized + Send + Sync + 'static>(
        &self,
        provider: Provider<I>,
    ) -> Result<(), ContainerError> {
        self.register_keyed(TypeDescriptor::of::<I>(), provider, Scope::Singleton)
    }

    /// Register a binding in the root context layer
    pub fn register_context<I: ?Sized + Send + Sync + 'static>(
        &self,
        provider: Provider<I>,
    ) -> Result<(), ContainerError> {
        self.root.register_context(provider)
    }

    /// Register a ready-made value, returned verbatim and never cleared
    pub fn register_constant<I: ?Sized + Send + Sync + 'static>(
        &self,
        value: Arc<I>,
    ) -> Result<(), ContainerError> {
        self.register_keyed(TypeDescriptor::of::<I>(), Provider::value(value), Scope::Singleton)
    }

    /// Register under an explicit descriptor, e.g. a string key or a generic type
    pub fn register_keyed<I: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: TypeDescriptor,
        provider: Provider<I>,
        scope: Scope,
    ) -> Result<(), ContainerError> {
        if scope.is_context() {
            return self.root.register_context_keyed(descriptor, provider);
        }
        self.resolver
            .registry()
            .add(Binding::new(descriptor, provider, scope)?)?;
        Ok(())
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.root.get::<T>()
    }

    pub fn get_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Arc<T>, ContainerError> {
        self.root.get_keyed::<T>(descriptor)
    }

    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ContainerError> {
        self.root.try_get::<T>()
    }

    pub fn get_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ContainerError> {
        self.root.get_all::<T>()
    }

    pub fn get_all_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Vec<Arc<T>>, ContainerError> {
        self.root.get_all_keyed::<T>(descriptor)
    }

    pub fn resolve_arguments(&self, parameters: &[Parameter]) -> Result<Arguments, ContainerError> {
        self.root.resolve_arguments(parameters)
    }

    pub fn resolve_callable<R: 'static>(&self, target: Target<R>) -> Result<R, ContainerError> {
        self.root.resolve_callable(target)
    }

    pub async fn resolve_callable_async<R: 'static>(
        &self,
        target: Target<R>,
    ) -> Result<R, ContainerError> {
        self.root.resolve_callable_async(target).await
    }

    /// Replace every binding of `I` until the returned guard is dropped
    pub fn override_binding<I: ?Sized + Send + Sync + 'static>(&self) -> Override<I> {
        self.override_keyed(TypeDescriptor::of::<I>())
    }

    pub fn override_keyed<I: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: TypeDescriptor,
    ) -> Override<I> {
        Override::new(
            self.resolver.registry().clone(),
            descriptor,
            self.config().clear_cache_on_override,
        )
    }

    /// Reset every singleton cache except constants
    pub fn clear_cache(&self) -> Result<(), ContainerError> {
        self.resolver.registry().clear_cache()
    }

    /// Number of distinct bound types in the global layer
    pub fn size(&self) -> Result<usize, ContainerError> {
        self.resolver.registry().len()
    }

    /// Fresh context isolated from the root and from every other context
    pub fn create_context(&self) -> ResolutionContext {
        let context = ResolutionContext::new(self.resolver.clone(), ContextLayer::new());
        debug!(context = %context.id(), "created resolution context");
        context
    }

    /// Root resolution context used by the container's own lookups
    pub fn root_context(&self) -> &ResolutionContext {
        &self.root
    }

    pub fn snapshot(&self) -> Result<RegistrySnapshot, ContainerError> {
        RegistrySnapshot::capture(self.resolver.registry(), &self.root.layer)
    }
}

impl Default for IocContainer {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on one context layer.
///
/// Context-scoped bindings registered here and the instances they produce are
/// visible only through this handle and its clones. Everything else resolves
/// against the container's global bindings.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    resolver: Resolver,
    layer: Arc<ContextLayer>,
}

impl ResolutionContext {
    fn new(resolver: Resolver, layer: ContextLayer) -> Self {
        Self {
            resolver,
            layer: Arc::new(layer),
        }
    }

    /// Weak handle on this context, as injected into factories
    pub fn handle(&self) -> ContainerHandle {
        ContainerHandle::new(self.resolver.downgrade(), Arc::downgrade(&self.layer))
    }

    pub fn id(&self) -> Uuid {
        self.layer.id()
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.layer.parent_id()
    }

    /// Child context starting from a snapshot of this context's bindings
    pub fn child(&self) -> Result<ResolutionContext, ContainerError> {
        let child = ResolutionContext::new(self.resolver.clone(), self.layer.child()?);
        debug!(context = %child.id(), parent = %self.id(), "created child context");
        Ok(child)
    }

    pub fn register_context<I: ?Sized + Send + Sync + 'static>(
        &self,
        provider: Provider<I>,
    ) -> Result<(), ContainerError> {
        self.register_context_keyed(TypeDescriptor::of::<I>(), provider)
    }

    pub fn register_context_keyed<I: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: TypeDescriptor,
        provider: Provider<I>,
    ) -> Result<(), ContainerError> {
        let binding = Binding::new(descriptor, provider, Scope::Context)?;
        debug!(
            context = %self.id(),
            service = %binding.descriptor(),
            implementation = binding.implementation(),
            "registered context binding"
        );
        self.layer.add(Arc::new(binding))
    }

    pub fn binding_count(&self) -> Result<usize, ContainerError> {
        self.layer.binding_count()
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.get_keyed::<T>(&TypeDescriptor::of::<T>())
    }

    pub fn get_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Arc<T>, ContainerError> {
        self.try_get_keyed::<T>(descriptor)?
            .ok_or_else(|| ContainerError::not_found(descriptor.to_string()))
    }

    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ContainerError> {
        self.try_get_keyed::<T>(&TypeDescriptor::of::<T>())
    }

    pub fn try_get_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        match self
            .resolver
            .resolve_one(descriptor, &self.layer, &mut ResolutionPath::new())?
        {
            Some(instance) => instance.downcast_for::<T>(descriptor).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ContainerError> {
        self.get_all_keyed::<T>(&TypeDescriptor::of::<T>())
    }

    /// Every binding of `descriptor`; empty when nothing is bound
    pub fn get_all_keyed<T: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Vec<Arc<T>>, ContainerError> {
        self.resolver
            .resolve_all(descriptor, &self.layer, &mut ResolutionPath::new())?
            .iter()
            .map(|instance| instance.downcast_for::<T>(descriptor))
            .collect()
    }

    pub fn resolve_arguments(&self, parameters: &[Parameter]) -> Result<Arguments, ContainerError> {
        self.resolver
            .resolve_arguments(parameters, &self.layer, &mut ResolutionPath::new())
    }

    /// Resolve the target's parameters and invoke it
    pub fn resolve_callable<R: 'static>(&self, target: Target<R>) -> Result<R, ContainerError> {
        match target {
            Target::Function {
                parameters, call, ..
            } => {
                let mut args = self.resolve_arguments(&parameters)?;
                call(&mut args)
            }
            Target::Async { name, .. } => Err(ContainerError::AsynchronousTarget {
                target: name.to_string(),
            }),
            Target::Value(_) => Err(ContainerError::MissingSignature {
                target: std::any::type_name::<R>().to_string(),
            }),
        }
    }

    /// Resolve the target's parameters, then await it.
    ///
    /// Resolution itself never suspends; only the target's own future does.
    pub async fn resolve_callable_async<R: 'static>(
        &self,
        target: Target<R>,
    ) -> Result<R, ContainerError> {
        match target {
            Target::Async {
                parameters, call, ..
            } => {
                let args = self.resolve_arguments(&parameters)?;
                call(args).await
            }
            Target::Function { name, .. } => Err(ContainerError::NotAsynchronous {
                target: name.to_string(),
            }),
            Target::Value(_) => Err(ContainerError::MissingSignature {
                target: std::any::type_name::<R>().to_string(),
            }),
        }
    }
}

/// Injectable handle on the context that constructed the receiver.
///
/// Declare a parameter of type `ContainerHandle` to look up services from
/// inside a factory. The handle does not keep the container or the context
/// alive; once either is dropped every lookup fails with
/// [`ContainerError::ResolverDropped`].
#[derive(Clone)]
pub struct ContainerHandle {
    resolver: WeakResolver,
    layer: Weak<ContextLayer>,
}

impl ContainerHandle {
    pub(crate) fn new(resolver: WeakResolver, layer: Weak<ContextLayer>) -> Self {
        Self { resolver, layer }
    }

    /// Strong context handle, if the container and the context are still alive
    pub fn context(&self) -> Result<ResolutionContext, ContainerError> {
        let dropped = || ContainerError::ResolverDropped {
            service_type: "ContainerHandle".to_string(),
        };
        let resolver = self.resolver.upgrade().ok_or_else(dropped)?;
        let layer = self.layer.upgrade().ok_or_else(dropped)?;
        Ok(ResolutionContext { resolver, layer })
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.context()?.get::<T>()
    }

    pub fn try_get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ContainerError> {
        self.context()?.try_get::<T>()
    }

    pub fn get_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>, ContainerError> {
        self.context()?.get_all::<T>()
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("alive", &(self.layer.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    fn english() -> Provider<dyn Greeter> {
        Provider::factory(Vec::new(), |_| Ok(Arc::new(English) as Arc<dyn Greeter>))
    }

    #[test]
    fn test_get_not_found() {
        let container = IocContainer::new();
        assert!(container.get::<dyn Greeter>().err().unwrap().is_not_found());
        assert!(container.try_get::<dyn Greeter>().unwrap().is_none());
        assert!(container.get_all::<dyn Greeter>().unwrap().is_empty());
    }

    #[test]
    fn test_singleton_and_transient_identity() {
        let container = IocContainer::new();
        container.register_singleton(english()).unwrap();
        container
            .register_keyed(TypeDescriptor::key("greeter"), english(), Scope::Transient)
            .unwrap();

        let a = container.get::<dyn Greeter>().unwrap();
        let b = container.get::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let key = TypeDescriptor::key("greeter");
        let c = container.get_keyed::<dyn Greeter>(&key).unwrap();
        let d = container.get_keyed::<dyn Greeter>(&key).unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
        assert_eq!(container.size().unwrap(), 2);
    }

    #[test]
    fn test_clear_cache_keeps_constants() {
        let container = IocContainer::new();
        let constant: Arc<dyn Greeter> = Arc::new(English);
        container.register_constant(constant.clone()).unwrap();
        container.register_singleton::<String>(Provider::factory(Vec::new(), |_| Ok(Arc::new("x".to_string())))).unwrap();

        let before = container.get::<String>().unwrap();
        container.clear_cache().unwrap();

        assert!(Arc::ptr_eq(&container.get::<dyn Greeter>().unwrap(), &constant));
        assert!(!Arc::ptr_eq(&container.get::<String>().unwrap(), &before));
    }

    #[test]
    fn test_callable_kinds() {
        let container = IocContainer::new();
        container.register_constant(Arc::new(English) as Arc<dyn Greeter>).unwrap();

        let greeting = container
            .resolve_callable(Target::function(vec![Parameter::of::<dyn Greeter>("greeter")], |args| {
                Ok(args.single::<dyn Greeter>("greeter")?.greet())
            }))
            .unwrap();
        assert_eq!(greeting, "hello");

        let err = container.resolve_callable(Target::value(1)).unwrap_err();
        assert!(matches!(err, ContainerError::MissingSignature { .. }));

        let err = container
            .resolve_callable(Target::asynchronous(Vec::new(), |_| async { Ok(1) }))
            .unwrap_err();
        assert!(matches!(err, ContainerError::AsynchronousTarget { .. }));
    }

    #[test]
    fn test_root_context_registration() {
        let container = IocContainer::new();
        container.register_context(english()).unwrap();

        assert_eq!(container.size().unwrap(), 0);
        assert_eq!(container.root_context().binding_count().unwrap(), 1);

        let a = container.get::<dyn Greeter>().unwrap();
        let b = container.get::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = container.create_context();
        assert!(other.try_get::<dyn Greeter>().unwrap().is_none());
    }

    #[test]
    fn test_factory_receives_container_handle() {
        let container = IocContainer::new();
        container.register_singleton(english()).unwrap();
        container
            .register_transient::<String>(Provider::factory(
                vec![Parameter::of::<ContainerHandle>("container")],
                |args| {
                    let handle = args.single::<ContainerHandle>("container")?;
                    Ok(Arc::new(handle.get::<dyn Greeter>()?.greet()))
                },
            ))
            .unwrap();

        assert_eq!(*container.get::<String>().unwrap(), "hello");

        let handle = container.root_context().handle();
        assert!(handle.try_get::<dyn Greeter>().unwrap().is_some());
        drop(container);
        assert!(matches!(handle.get::<dyn Greeter>(), Err(ContainerError::ResolverDropped { .. })));
    }
}
