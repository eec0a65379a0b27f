use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::binding::Binding;
use crate::container::descriptor::TypeDescriptor;
use crate::container::instance::Instance;
use crate::errors::ContainerError;

/// Binding lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Constructed once, cached, reused until the cache is cleared
    Singleton,
    /// Constructed on every lookup
    #[default]
    Transient,
    /// Constructed once per resolution context and visible only there
    Context,
}

impl Scope {
    pub fn is_singleton(&self) -> bool {
        matches!(self, Scope::Singleton)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Scope::Transient)
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Scope::Context)
    }

    /// Get the scope name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Transient => "transient",
            Scope::Context => "context",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = crate::config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(Scope::Singleton),
            "transient" => Ok(Scope::Transient),
            "context" | "scoped" => Ok(Scope::Context),
            _ => Err(crate::config::ConfigError::invalid_value(
                "scope",
                s,
                "singleton, transient, or context",
            )),
        }
    }
}

/// Bindings and instances private to one logical context.
///
/// The layer is consulted before the global registry and never merged into
/// it. Context bindings are kept newest first.
#[derive(Debug)]
pub struct ContextLayer {
    id: Uuid,
    parent: Option<Uuid>,
    root: bool,
    bindings: RwLock<Vec<Arc<Binding>>>,
    instances: RwLock<HashMap<u64, Instance>>,
}

impl ContextLayer {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            parent: None,
            root: false,
            bindings: RwLock::new(Vec::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Layer owned by the container itself
    pub fn root() -> Self {
        Self {
            root: true,
            ..Self::new()
        }
    }

    /// Child layer that starts with a snapshot of this layer's bindings.
    ///
    /// Later registrations on either side stay invisible to the other, and
    /// context instances are not shared.
    pub fn child(&self) -> Result<Self, ContainerError> {
        let bindings = self.read_bindings()?.clone();
        Ok(Self {
            id: Uuid::new_v4(),
            parent: Some(self.id),
            root: false,
            bindings: RwLock::new(bindings),
            instances: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn add(&self, binding: Arc<Binding>) -> Result<(), ContainerError> {
        let mut bindings = self
            .bindings
            .write()
            .map_err(|_| ContainerError::lock("context_bindings"))?;
        bindings.insert(0, binding);
        Ok(())
    }

    /// Context bindings whose bound type matches `descriptor`
    pub fn lookup(
        &self,
        descriptor: &TypeDescriptor,
        structural: bool,
    ) -> Result<Vec<Arc<Binding>>, ContainerError> {
        Ok(self
            .read_bindings()?
            .iter()
            .filter(|binding| {
                binding.descriptor() == descriptor
                    || (structural && binding.descriptor().is_assignable_to(descriptor))
            })
            .cloned()
            .collect())
    }

    pub fn instance(&self, binding_id: u64) -> Result<Option<Instance>, ContainerError> {
        let instances = self
            .instances
            .read()
            .map_err(|_| ContainerError::lock("context_instances"))?;
        Ok(instances.get(&binding_id).cloned())
    }

    /// Store a context instance; an instance stored first is kept and returned
    pub fn store_instance(
        &self,
        binding_id: u64,
        instance: Instance,
    ) -> Result<Instance, ContainerError> {
        let mut instances = self
            .instances
            .write()
            .map_err(|_| ContainerError::lock("context_instances"))?;
        Ok(instances.entry(binding_id).or_insert(instance).clone())
    }

    pub fn binding_count(&self) -> Result<usize, ContainerError> {
        Ok(self.read_bindings()?.len())
    }

    pub fn instance_count(&self) -> Result<usize, ContainerError> {
        let instances = self
            .instances
            .read()
            .map_err(|_| ContainerError::lock("context_instances"))?;
        Ok(instances.len())
    }

    fn read_bindings(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, Vec<Arc<Binding>>>, ContainerError> {
        self.bindings
            .read()
            .map_err(|_| ContainerError::lock("context_bindings"))
    }
}

impl Default for ContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::signature::Provider;

    trait Session: Send + Sync {}
    struct Anonymous;
    impl Session for Anonymous {}

    fn session_binding() -> Arc<Binding> {
        let provider = Provider::value(Arc::new(Anonymous) as Arc<dyn Session>);
        Arc::new(Binding::new(TypeDescriptor::of::<dyn Session>(), provider, Scope::Context).unwrap())
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("singleton".parse::<Scope>().unwrap(), Scope::Singleton);
        assert_eq!("Transient".parse::<Scope>().unwrap(), Scope::Transient);
        assert_eq!("context".parse::<Scope>().unwrap(), Scope::Context);
        assert_eq!("scoped".parse::<Scope>().unwrap(), Scope::Context);

        assert!("request".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_defaults_to_transient() {
        assert_eq!(Scope::default(), Scope::Transient);
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(format!("{}", Scope::Singleton), "singleton");
        assert_eq!(format!("{}", Scope::Transient), "transient");
        assert_eq!(format!("{}", Scope::Context), "context");
    }

    #[test]
    fn test_child_does_not_leak_into_parent() {
        let parent = ContextLayer::new();
        let child = parent.child().unwrap();
        child.add(session_binding()).unwrap();

        assert_eq!(child.binding_count().unwrap(), 1);
        assert_eq!(parent.binding_count().unwrap(), 0);
        assert_eq!(child.parent_id(), Some(parent.id()));
    }

    #[test]
    fn test_only_root_layer_is_root() {
        let root = ContextLayer::root();
        assert!(root.is_root());
        assert!(!root.child().unwrap().is_root());
        assert!(!ContextLayer::new().is_root());
    }

    #[test]
    fn test_child_inherits_parent_snapshot() {
        let parent = ContextLayer::new();
        parent.add(session_binding()).unwrap();
        let child = parent.child().unwrap();

        let found = child.lookup(&TypeDescriptor::of::<dyn Session>(), false).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_store_instance_keeps_first() {
        let layer = ContextLayer::new();
        let first = Instance::new(Arc::new(1u8));
        let second = Instance::new(Arc::new(2u8));

        layer.store_instance(7, first.clone()).unwrap();
        let kept = layer.store_instance(7, second).unwrap();

        assert!(kept.ptr_eq(&first));
        assert_eq!(layer.instance_count().unwrap(), 1);
    }
}
