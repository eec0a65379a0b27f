use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::container::binding::Binding;
use crate::container::descriptor::TypeDescriptor;
use crate::container::instance::Instance;
use crate::container::scope::Scope;
use crate::container::signature::Provider;
use crate::errors::ContainerError;

#[derive(Default)]
struct RegistryState {
    bindings: HashMap<TypeDescriptor, Vec<Arc<Binding>>>,
    /// Keys in first-registration order
    order: Vec<TypeDescriptor>,
}

/// Global binding layer: an ordered multi-map from bound type to bindings
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

type CacheSnapshot = Vec<(Arc<Binding>, Option<Instance>)>;

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding under its descriptor
    pub fn add(&self, binding: Binding) -> Result<Arc<Binding>, ContainerError> {
        let binding = Arc::new(binding);
        let mut state = self.write_state()?;
        let descriptor = binding.descriptor().clone();
        if !state.bindings.contains_key(&descriptor) {
            state.order.push(descriptor.clone());
        }
        state
            .bindings
            .entry(descriptor)
            .or_default()
            .push(binding.clone());

        debug!(
            service = %binding.descriptor(),
            implementation = binding.implementation(),
            scope = %binding.scope(),
            "registered binding"
        );
        Ok(binding)
    }

    /// Bindings registered under exactly `descriptor`, oldest first
    pub fn lookup(&self, descriptor: &TypeDescriptor) -> Result<Vec<Arc<Binding>>, ContainerError> {
        Ok(self
            .read_state()?
            .bindings
            .get(descriptor)
            .cloned()
            .unwrap_or_default())
    }

    /// Every binding not registered under `excluding`, in key then binding order
    pub fn scan(
        &self,
        excluding: &TypeDescriptor,
    ) -> Result<impl Iterator<Item = Arc<Binding>>, ContainerError> {
        let state = self.read_state()?;
        let found: Vec<Arc<Binding>> = state
            .order
            .iter()
            .filter(|key| *key != excluding)
            .filter_map(|key| state.bindings.get(key))
            .flat_map(|bindings| bindings.iter().cloned())
            .collect();
        Ok(found.into_iter())
    }

    /// Number of distinct registered keys
    pub fn len(&self) -> Result<usize, ContainerError> {
        Ok(self.read_state()?.order.len())
    }

    pub fn is_empty(&self) -> Result<bool, ContainerError> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, descriptor: &TypeDescriptor) -> Result<bool, ContainerError> {
        Ok(self
            .read_state()?
            .bindings
            .get(descriptor)
            .map_or(false, |bindings| !bindings.is_empty()))
    }

    /// All keys with their bindings, in registration order
    pub fn entries(&self) -> Result<Vec<(TypeDescriptor, Vec<Arc<Binding>>)>, ContainerError> {
        let state = self.read_state()?;
        Ok(state
            .order
            .iter()
            .map(|key| {
                let bindings = state.bindings.get(key).cloned().unwrap_or_default();
                (key.clone(), bindings)
            })
            .collect())
    }

    /// Reset every singleton cache except values
    pub fn clear_cache(&self) -> Result<(), ContainerError> {
        for (_, bindings) in self.entries()? {
            for binding in bindings {
                binding.clear()?;
            }
        }
        debug!("cleared singleton caches");
        Ok(())
    }

    fn replace(
        &self,
        descriptor: &TypeDescriptor,
        replacement: Vec<Arc<Binding>>,
    ) -> Result<Vec<Arc<Binding>>, ContainerError> {
        let mut state = self.write_state()?;
        match state.bindings.get_mut(descriptor) {
            Some(bindings) if !bindings.is_empty() => Ok(std::mem::replace(bindings, replacement)),
            _ => Err(ContainerError::BindingNotFound {
                service_type: descriptor.to_string(),
            }),
        }
    }

    fn reinstate(
        &self,
        descriptor: &TypeDescriptor,
        originals: Vec<Arc<Binding>>,
    ) -> Result<(), ContainerError> {
        let mut state = self.write_state()?;
        if !state.bindings.contains_key(descriptor) {
            state.order.push(descriptor.clone());
        }
        state.bindings.insert(descriptor.clone(), originals);
        Ok(())
    }

    fn cache_snapshot(&self) -> Result<CacheSnapshot, ContainerError> {
        let mut snapshot = Vec::new();
        for (_, bindings) in self.entries()? {
            for binding in bindings {
                if !binding.is_value() {
                    let cached = binding.cached()?;
                    snapshot.push((binding, cached));
                }
            }
        }
        Ok(snapshot)
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, RegistryState>, ContainerError> {
        self.state
            .read()
            .map_err(|_| ContainerError::lock("service_registry"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, ContainerError> {
        self.state
            .write()
            .map_err(|_| ContainerError::lock("service_registry"))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .read_state()
            .map(|state| state.order.iter().map(ToString::to_string).collect::<Vec<_>>())
            .unwrap_or_default();
        f.debug_struct("Registry").field("keys", &keys).finish()
    }
}

/// Temporary replacement of every binding for one type.
///
/// Instances become pre-cached singleton values, factories become transient
/// bindings. Call [`apply`](Override::apply) to install it.
pub struct Override<I: ?Sized> {
    registry: Arc<Registry>,
    descriptor: TypeDescriptor,
    instances: Vec<Arc<I>>,
    factories: Vec<Provider<I>>,
    clear_cache: bool,
}

impl<I: ?Sized + Send + Sync + 'static> Override<I> {
    pub(crate) fn new(registry: Arc<Registry>, descriptor: TypeDescriptor, clear_cache: bool) -> Self {
        Self {
            registry,
            descriptor,
            instances: Vec::new(),
            factories: Vec::new(),
            clear_cache,
        }
    }

    pub fn instance(mut self, instance: Arc<I>) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn factory(mut self, provider: Provider<I>) -> Self {
        self.factories.push(provider);
        self
    }

    /// Leave singleton caches untouched while the override is active
    pub fn keep_cache(mut self) -> Self {
        self.clear_cache = false;
        self
    }

    pub fn apply(self) -> Result<OverrideGuard, ContainerError> {
        let mut replacement = Vec::with_capacity(self.instances.len() + self.factories.len());
        for instance in self.instances {
            let binding = Binding::new(
                self.descriptor.clone(),
                Provider::value(instance),
                Scope::Singleton,
            )?;
            replacement.push(Arc::new(binding));
        }
        for provider in self.factories {
            let binding = Binding::new(self.descriptor.clone(), provider, Scope::Transient)?;
            replacement.push(Arc::new(binding));
        }

        let caches = if self.clear_cache {
            Some(self.registry.cache_snapshot()?)
        } else {
            None
        };
        let count = replacement.len();
        let originals = self.registry.replace(&self.descriptor, replacement)?;
        if caches.is_some() {
            self.registry.clear_cache()?;
            for binding in &originals {
                binding.clear()?;
            }
        }

        debug!(
            service = %self.descriptor,
            replaced = originals.len(),
            replacements = count,
            "override applied"
        );
        Ok(OverrideGuard {
            registry: self.registry,
            descriptor: self.descriptor,
            originals: Some(originals),
            caches,
        })
    }
}

/// Restores the overridden bindings, and the caches if they were cleared,
/// when dropped or released
#[must_use = "the override is undone as soon as the guard is dropped"]
pub struct OverrideGuard {
    registry: Arc<Registry>,
    descriptor: TypeDescriptor,
    originals: Option<Vec<Arc<Binding>>>,
    caches: Option<CacheSnapshot>,
}

impl OverrideGuard {
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Undo the override now, reporting any failure
    pub fn release(mut self) -> Result<(), ContainerError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), ContainerError> {
        let originals = match self.originals.take() {
            Some(originals) => originals,
            None => return Ok(()),
        };
        self.registry.reinstate(&self.descriptor, originals)?;

        if let Some(caches) = self.caches.take() {
            self.registry.clear_cache()?;
            for (binding, cached) in caches {
                binding.restore(cached)?;
            }
        }
        debug!(service = %self.descriptor, "override restored");
        Ok(())
    }
}

impl Drop for OverrideGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(service = %self.descriptor, error = %e, "failed to restore override");
        }
    }
}

impl std::fmt::Debug for OverrideGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideGuard")
            .field("descriptor", &self.descriptor)
            .field("active", &self.originals.is_some())
            .finish()
    }
}
