use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::config::ContainerConfig;
use crate::container::arguments::{Arguments, Resolved};
use crate::container::binding::Binding;
use crate::container::conditions::ConditionChain;
use crate::container::descriptor::{Parameter, TypeDescriptor, TypeShape};
use crate::container::instance::Instance;
use crate::container::registry::Registry;
use crate::container::scope::{ContextLayer, Scope};
use crate::errors::ContainerError;

#[derive(Debug, Clone)]
struct Frame {
    binding_id: u64,
    descriptor: TypeDescriptor,
    under_construction: Arc<AtomicBool>,
    context_bound: bool,
}

/// Bindings currently under eager construction, for cycle reporting.
///
/// Clones share the construction state of each frame, so a deferred handle
/// holding a clone can tell which of its ancestors are still being built.
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    frames: Vec<Frame>,
}

impl ResolutionPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, binding: &Binding) {
        self.frames.push(Frame {
            binding_id: binding.id(),
            descriptor: binding.descriptor().clone(),
            under_construction: Arc::new(AtomicBool::new(true)),
            context_bound: false,
        });
    }

    pub fn pop(&mut self) -> Option<TypeDescriptor> {
        self.frames.pop().map(|frame| {
            frame.under_construction.store(false, Ordering::Release);
            frame.descriptor
        })
    }

    /// Check if the path contains a binding (for cycle detection)
    pub fn contains(&self, binding_id: u64) -> bool {
        self.frames.iter().any(|frame| frame.binding_id == binding_id)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames whose construction has not finished yet
    pub fn live(&self) -> ResolutionPath {
        ResolutionPath {
            frames: self
                .frames
                .iter()
                .filter(|frame| frame.under_construction.load(Ordering::Acquire))
                .cloned()
                .collect(),
        }
    }

    /// Every binding on the path consumed a context-layer instance
    pub fn mark_context_bound(&mut self) {
        for frame in &mut self.frames {
            frame.context_bound = true;
        }
    }

    /// Whether the innermost binding consumed a context-layer instance
    pub fn is_context_bound(&self) -> bool {
        self.frames.last().map_or(false, |frame| frame.context_bound)
    }

    /// Get the path as a string for error messages
    pub fn path_string(&self) -> String {
        self.frames
            .iter()
            .map(|frame| frame.descriptor.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Resolution engine shared by the container and its contexts
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<Registry>,
    conditions: Arc<ConditionChain>,
    config: Arc<ContainerConfig>,
}

impl Resolver {
    pub fn new(
        registry: Arc<Registry>,
        conditions: Arc<ConditionChain>,
        config: Arc<ContainerConfig>,
    ) -> Self {
        Self {
            registry,
            conditions,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn conditions(&self) -> &ConditionChain {
        &self.conditions
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Handle that does not keep the registry alive
    pub fn downgrade(&self) -> WeakResolver {
        WeakResolver {
            registry: Arc::downgrade(&self.registry),
            conditions: self.conditions.clone(),
            config: self.config.clone(),
        }
    }

    /// Bindings able to satisfy `descriptor`, in resolution order: context
    /// layer, exact global key, then structurally compatible global bindings.
    pub fn candidates(
        &self,
        descriptor: &TypeDescriptor,
        context: &ContextLayer,
    ) -> Result<Vec<Arc<Binding>>, ContainerError> {
        let structural = self.config.structural_fallback;
        let mut found = context.lookup(descriptor, structural)?;
        found.extend(self.registry.lookup(descriptor)?);
        if structural {
            found.extend(
                self.registry
                    .scan(descriptor)?
                    .filter(|binding| binding.descriptor().is_assignable_to(descriptor)),
            );
        }
        Ok(found)
    }

    /// Instantiate the first binding for `descriptor`; `None` if nothing is bound
    pub fn resolve_one(
        &self,
        descriptor: &TypeDescriptor,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Option<Instance>, ContainerError> {
        trace!(service = %descriptor, "resolving one");
        match self.candidates(descriptor, context)?.first() {
            Some(binding) => self.instantiate(binding, context, path).map(Some),
            None => Ok(None),
        }
    }

    /// Instantiate every binding for `descriptor` in registration order
    pub fn resolve_all(
        &self,
        descriptor: &TypeDescriptor,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Vec<Instance>, ContainerError> {
        trace!(service = %descriptor, "resolving all");
        self.candidates(descriptor, context)?
            .iter()
            .map(|binding| self.instantiate(binding, context, path))
            .collect()
    }

    /// Run a shape through the condition chain
    pub fn resolve_shape(
        &self,
        shape: &TypeShape,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        self.conditions.resolve(shape, self, context, path)
    }

    /// Resolve every parameter into a keyword map. A leading `self` is skipped.
    pub fn resolve_arguments(
        &self,
        parameters: &[Parameter],
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Arguments, ContainerError> {
        let mut args = Arguments::new();
        for (index, parameter) in parameters.iter().enumerate() {
            if index == 0 && parameter.name == "self" {
                continue;
            }
            let value = self.resolve_shape(&parameter.shape, context, path)?;
            args.insert(parameter.name.clone(), value);
        }
        Ok(args)
    }

    /// Produce an instance for one binding, honoring its scope's cache.
    ///
    /// A singleton whose construction consumed context-layer instances is
    /// cached in that context layer instead of its global slot.
    pub fn instantiate(
        &self,
        binding: &Arc<Binding>,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Instance, ContainerError> {
        if binding.scope().is_context() {
            path.mark_context_bound();
        }
        if binding.is_value() {
            return binding.construct(&mut Arguments::new());
        }

        match binding.scope() {
            Scope::Singleton => {
                if let Some(cached) = binding.cached()? {
                    return Ok(cached);
                }
                if let Some(cached) = context.instance(binding.id())? {
                    path.mark_context_bound();
                    return Ok(cached);
                }
            }
            Scope::Context => {
                if let Some(cached) = context.instance(binding.id())? {
                    return Ok(cached);
                }
            }
            Scope::Transient => {}
        }

        if path.contains(binding.id()) {
            path.push(binding);
            return Err(ContainerError::CircularDependency {
                path: path.path_string(),
                cycle_service: binding.descriptor().to_string(),
            });
        }
        if path.depth() >= self.config.max_resolution_depth {
            return Err(ContainerError::ResolutionDepthExceeded {
                service_type: binding.descriptor().to_string(),
                depth: path.depth(),
            });
        }

        trace!(
            service = %binding.descriptor(),
            implementation = binding.implementation(),
            scope = %binding.scope(),
            "constructing"
        );
        path.push(binding);
        let constructed = self.construct(binding, context, path);
        let context_bound = path.is_context_bound();
        path.pop();
        let instance = constructed?;

        match binding.scope() {
            Scope::Singleton if context_bound => {
                trace!(
                    service = %binding.descriptor(),
                    context = %context.id(),
                    "singleton depends on context bindings, cached in context"
                );
                context.store_instance(binding.id(), instance)
            }
            Scope::Singleton => binding.store(instance),
            Scope::Context => context.store_instance(binding.id(), instance),
            Scope::Transient => Ok(instance),
        }
    }

    fn construct(
        &self,
        binding: &Binding,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Instance, ContainerError> {
        let parameters = binding.parameters().unwrap_or(&[]);
        let mut args = self.resolve_arguments(parameters, context, path)?;
        binding.construct(&mut args)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("conditions", &self.conditions.names())
            .field("config", &self.config)
            .finish()
    }
}

/// Resolver handle held by lazy values and forward references
#[derive(Clone)]
pub struct WeakResolver {
    registry: Weak<Registry>,
    conditions: Arc<ConditionChain>,
    config: Arc<ContainerConfig>,
}

impl WeakResolver {
    pub fn upgrade(&self) -> Option<Resolver> {
        Some(Resolver {
            registry: self.registry.upgrade()?,
            conditions: self.conditions.clone(),
            config: self.config.clone(),
        })
    }
}
