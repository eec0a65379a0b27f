//! Shape-directed resolution strategies.
//!
//! Each parameter shape is offered to the conditions in priority order. The
//! first condition that recognizes the shape handles it; a condition may still
//! answer [`ContainerError::TypingMismatch`] to pass the shape along to later
//! conditions. The default condition recognizes everything and comes last.

use std::sync::Arc;

use tracing::trace;

use crate::container::arguments::{LazyInstances, Resolved};
use crate::container::descriptor::{TypeDescriptor, TypeShape};
use crate::container::forward::ForwardHandle;
use crate::container::instance::Instance;
use crate::container::ioc_container::ContainerHandle;
use crate::container::resolver::{ResolutionPath, Resolver};
use crate::container::scope::ContextLayer;
use crate::errors::ContainerError;

/// One resolution strategy in the condition chain
pub trait Condition: Send + Sync {
    fn name(&self) -> &str;

    fn recognizes(&self, shape: &TypeShape) -> bool;

    fn handle(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError>;
}

/// `Option<T>` and `A | B | ...`.
///
/// Only the two-way `T | None` form may come back absent; wider unions fail
/// when no alternative resolves, even if one of them is `None`.
#[derive(Debug, Default)]
pub struct UnionCondition;

impl Condition for UnionCondition {
    fn name(&self) -> &str {
        "union"
    }

    fn recognizes(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Optional(_) | TypeShape::Union(_))
    }

    fn handle(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        match shape {
            TypeShape::Optional(inner) => Ok(resolver
                .resolve_one(inner, context, path)?
                .map_or(Resolved::Absent, Resolved::Single)),
            TypeShape::Union(alternatives) => {
                let mut last_error = None;
                for alternative in alternatives.iter().filter(|d| !d.is_none()) {
                    match resolver.resolve_one(alternative, context, path) {
                        Ok(Some(instance)) => return Ok(Resolved::Single(instance)),
                        Ok(None) => {}
                        Err(e) => last_error = Some(e),
                    }
                }
                let reason = match last_error {
                    Some(e) => format!("no alternative could be resolved, last error: {}", e),
                    None => "no alternative is bound".to_string(),
                };
                Err(ContainerError::unresolvable(shape.to_string(), reason))
            }
            other => Err(ContainerError::typing_mismatch(self.name(), other.to_string())),
        }
    }
}

/// `Vec<T>`: every binding, in registration order; must not be empty
#[derive(Debug, Default)]
pub struct CollectionCondition;

impl Condition for CollectionCondition {
    fn name(&self) -> &str {
        "collection"
    }

    fn recognizes(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Collection(_))
    }

    fn handle(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        let TypeShape::Collection(inner) = shape else {
            return Err(ContainerError::typing_mismatch(self.name(), shape.to_string()));
        };
        let instances = resolver.resolve_all(inner, context, path)?;
        if instances.is_empty() {
            return Err(ContainerError::unresolvable(
                shape.to_string(),
                "collection has no bound elements",
            ));
        }
        Ok(Resolved::Many(instances))
    }
}

/// `Iterator<T>`: constructs each binding only when the consumer reaches it
#[derive(Debug, Default)]
pub struct IteratorCondition;

impl Condition for IteratorCondition {
    fn name(&self) -> &str {
        "iterator"
    }

    fn recognizes(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Iterator(_))
    }

    fn handle(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        let TypeShape::Iterator(inner) = shape else {
            return Err(ContainerError::typing_mismatch(self.name(), shape.to_string()));
        };
        let pending = resolver.candidates(inner, context)?;
        Ok(Resolved::Lazy(LazyInstances::new(
            inner.clone(),
            pending,
            resolver.downgrade(),
            Arc::downgrade(context),
            path.clone(),
        )))
    }
}

/// Parameterized types, looked up by identifier and arguments together
#[derive(Debug, Default)]
pub struct GenericCondition;

impl Condition for GenericCondition {
    fn name(&self) -> &str {
        "generic"
    }

    fn recognizes(&self, shape: &TypeShape) -> bool {
        match shape {
            TypeShape::Generic(_) => true,
            TypeShape::Plain(d) => d.is_generic(),
            _ => false,
        }
    }

    fn handle(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        let descriptor = match shape {
            TypeShape::Generic(d) | TypeShape::Plain(d) => d,
            other => return Err(ContainerError::typing_mismatch(self.name(), other.to_string())),
        };
        resolver
            .resolve_one(descriptor, context, path)?
            .map(Resolved::Single)
            .ok_or_else(|| {
                ContainerError::unresolvable(descriptor.to_string(), "no binding for generic type")
            })
    }
}

/// `ForwardRef<T>`: hands out an unresolved proxy
#[derive(Debug, Default)]
pub struct ForwardRefCondition;

impl Condition for ForwardRefCondition {
    fn name(&self) -> &str {
        "forward_ref"
    }

    fn recognizes(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::ForwardRef(_))
    }

    fn handle(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        let TypeShape::ForwardRef(inner) = shape else {
            return Err(ContainerError::typing_mismatch(self.name(), shape.to_string()));
        };
        Ok(Resolved::Deferred(ForwardHandle::new(
            inner.clone(),
            resolver.downgrade(),
            Arc::downgrade(context),
            path.clone(),
        )))
    }
}

/// [`ContainerHandle`]: a weak handle on the resolving context
#[derive(Debug, Default)]
pub struct ContainerHandleCondition;

impl Condition for ContainerHandleCondition {
    fn name(&self) -> &str {
        "container"
    }

    fn recognizes(&self, shape: &TypeShape) -> bool {
        matches!(shape, TypeShape::Plain(d) if *d == TypeDescriptor::of::<ContainerHandle>())
    }

    fn handle(
        &self,
        _shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        if !context.is_root() {
            path.mark_context_bound();
        }
        let handle = ContainerHandle::new(resolver.downgrade(), Arc::downgrade(context));
        Ok(Resolved::Single(Instance::new(Arc::new(handle))))
    }
}

/// Fallback: the first bound dependency of the declared type
#[derive(Debug, Default)]
pub struct DefaultCondition;

impl Condition for DefaultCondition {
    fn name(&self) -> &str {
        "default"
    }

    fn recognizes(&self, _shape: &TypeShape) -> bool {
        true
    }

    fn handle(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        let descriptor = match shape {
            TypeShape::Plain(d) | TypeShape::Generic(d) => d,
            other => return Err(ContainerError::typing_mismatch(self.name(), other.to_string())),
        };
        if descriptor.is_any() {
            return Err(ContainerError::unresolvable(
                descriptor.to_string(),
                "parameter has no declared type",
            ));
        }
        resolver
            .resolve_one(descriptor, context, path)?
            .map(Resolved::Single)
            .ok_or_else(|| ContainerError::unresolvable(descriptor.to_string(), "no binding registered"))
    }
}

/// Ordered set of conditions consulted for every parameter
pub struct ConditionChain {
    conditions: Vec<Box<dyn Condition>>,
}

impl ConditionChain {
    pub fn new() -> Self {
        Self::with_custom(Vec::new())
    }

    /// Built-in shape conditions, then `custom`, then the default
    pub fn with_custom(custom: Vec<Box<dyn Condition>>) -> Self {
        let mut conditions: Vec<Box<dyn Condition>> = vec![
            Box::new(UnionCondition),
            Box::new(CollectionCondition),
            Box::new(IteratorCondition),
            Box::new(GenericCondition),
            Box::new(ForwardRefCondition),
            Box::new(ContainerHandleCondition),
        ];
        conditions.extend(custom);
        conditions.push(Box::new(DefaultCondition));
        Self { conditions }
    }

    pub fn names(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn resolve(
        &self,
        shape: &TypeShape,
        resolver: &Resolver,
        context: &Arc<ContextLayer>,
        path: &mut ResolutionPath,
    ) -> Result<Resolved, ContainerError> {
        for condition in self.conditions.iter().filter(|c| c.recognizes(shape)) {
            match condition.handle(shape, resolver, context, path) {
                Err(ContainerError::TypingMismatch { .. }) => {
                    trace!(condition = condition.name(), shape = %shape, "condition passed");
                }
                other => return other,
            }
        }
        Err(ContainerError::unresolvable(
            shape.to_string(),
            "no condition handles this shape",
        ))
    }
}

impl Default for ConditionChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConditionChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::container::binding::Binding;
    use crate::container::registry::Registry;
    use crate::container::scope::Scope;
    use crate::container::signature::Provider;

    struct EnvCondition;

    impl Condition for EnvCondition {
        fn name(&self) -> &str {
            "env"
        }

        fn recognizes(&self, shape: &TypeShape) -> bool {
            matches!(shape, TypeShape::Plain(d) if *d == TypeDescriptor::key("env"))
        }

        fn handle(
            &self,
            _shape: &TypeShape,
            _resolver: &Resolver,
            _context: &Arc<ContextLayer>,
            _path: &mut ResolutionPath,
        ) -> Result<Resolved, ContainerError> {
            Ok(Resolved::Single(Instance::new(Arc::new("test".to_string()))))
        }
    }

    struct Declines;

    impl Condition for Declines {
        fn name(&self) -> &str {
            "declines"
        }

        fn recognizes(&self, _shape: &TypeShape) -> bool {
            true
        }

        fn handle(
            &self,
            shape: &TypeShape,
            _resolver: &Resolver,
            _context: &Arc<ContextLayer>,
            _path: &mut ResolutionPath,
        ) -> Result<Resolved, ContainerError> {
            Err(ContainerError::typing_mismatch(self.name(), shape.to_string()))
        }
    }

    fn resolver(custom: Vec<Box<dyn Condition>>) -> Resolver {
        Resolver::new(
            Arc::new(Registry::new()),
            Arc::new(ConditionChain::with_custom(custom)),
            Arc::new(ContainerConfig::default()),
        )
    }

    fn resolve(resolver: &Resolver, shape: TypeShape) -> Result<Resolved, ContainerError> {
        let context = Arc::new(ContextLayer::new());
        resolver.resolve_shape(&shape, &context, &mut ResolutionPath::new())
    }

    #[test]
    fn test_chain_order() {
        let chain = ConditionChain::with_custom(vec![Box::new(EnvCondition)]);
        assert_eq!(
            chain.names(),
            vec!["union", "collection", "iterator", "generic", "forward_ref", "container", "env", "default"]
        );
    }

    #[test]
    fn test_custom_condition_runs_before_default() {
        let resolver = resolver(vec![Box::new(EnvCondition)]);
        let resolved = resolve(&resolver, TypeShape::Plain(TypeDescriptor::key("env"))).unwrap();
        assert_eq!(resolved.kind(), "single");
    }

    #[test]
    fn test_typing_mismatch_falls_through() {
        let resolver = resolver(vec![Box::new(Declines)]);
        resolver
            .registry()
            .add(Binding::new(TypeDescriptor::key("port"), Provider::value(Arc::new(80u16)), Scope::Singleton).unwrap())
            .unwrap();

        let resolved = resolve(&resolver, TypeShape::Plain(TypeDescriptor::key("port"))).unwrap();
        assert_eq!(resolved.kind(), "single");
    }

    #[test]
    fn test_untyped_parameter_is_unresolvable() {
        let resolver = resolver(Vec::new());
        let err = resolve(&resolver, TypeShape::Plain(TypeDescriptor::any())).unwrap_err();
        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_optional_absent_and_empty_collection() {
        let resolver = resolver(Vec::new());
        let optional = resolve(&resolver, TypeShape::Optional(TypeDescriptor::key("cache"))).unwrap();
        assert_eq!(optional.kind(), "absent");

        let err = resolve(&resolver, TypeShape::Collection(TypeDescriptor::key("cache"))).unwrap_err();
        assert!(err.is_unresolvable());

        let lazy = resolve(&resolver, TypeShape::Iterator(TypeDescriptor::key("cache"))).unwrap();
        assert_eq!(lazy.kind(), "lazy");
    }

    #[test]
    fn test_wide_union_resolves_first_bound_alternative() {
        let resolver = resolver(Vec::new());
        resolver
            .registry()
            .add(Binding::new(TypeDescriptor::key("memcached"), Provider::value(Arc::new(11211u16)), Scope::Singleton).unwrap())
            .unwrap();
        let shape = TypeShape::Union(vec![
            TypeDescriptor::key("redis"),
            TypeDescriptor::key("memcached"),
            TypeDescriptor::none(),
        ]);
        assert_eq!(resolve(&resolver, shape).unwrap().kind(), "single");
    }

    #[test]
    fn test_union_with_none_alternative() {
        let resolver = resolver(Vec::new());
        let shape = TypeShape::Union(vec![
            TypeDescriptor::key("redis"),
            TypeDescriptor::key("memcached"),
            TypeDescriptor::none(),
        ]);
        assert!(resolve(&resolver, shape).unwrap_err().is_unresolvable());

        let strict = TypeShape::Union(vec![TypeDescriptor::key("redis"), TypeDescriptor::key("memcached")]);
        assert!(resolve(&resolver, strict).unwrap_err().is_unresolvable());
    }
}
