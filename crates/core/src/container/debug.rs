use std::fmt;

use serde::{Deserialize, Serialize};

use crate::container::registry::Registry;
use crate::container::scope::{ContextLayer, Scope};
use crate::errors::ContainerError;

/// Serializable view of the registered bindings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub services: Vec<ServiceEntry>,
    pub context_bindings: usize,
}

/// One bound type and everything registered under it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service_type: String,
    pub bindings: Vec<BindingInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingInfo {
    pub id: u64,
    pub implementation: String,
    pub scope: Scope,
    pub is_value: bool,
    pub cached: bool,
    /// `name: shape` for each declared parameter
    pub parameters: Vec<String>,
}

impl RegistrySnapshot {
    pub(crate) fn capture(registry: &Registry, context: &ContextLayer) -> Result<Self, ContainerError> {
        let mut services = Vec::new();
        for (descriptor, bindings) in registry.entries()? {
            let mut infos = Vec::with_capacity(bindings.len());
            for binding in bindings {
                infos.push(BindingInfo {
                    id: binding.id(),
                    implementation: binding.implementation().to_string(),
                    scope: binding.scope(),
                    is_value: binding.is_value(),
                    cached: binding.cached()?.is_some(),
                    parameters: binding
                        .parameters()
                        .unwrap_or(&[])
                        .iter()
                        .map(|p| format!("{}: {}", p.name, p.shape))
                        .collect(),
                });
            }
            services.push(ServiceEntry {
                service_type: descriptor.to_string(),
                bindings: infos,
            });
        }

        Ok(Self {
            services,
            context_bindings: context.binding_count()?,
        })
    }

    pub fn binding_count(&self) -> usize {
        self.services.iter().map(|s| s.bindings.len()).sum()
    }

    pub fn cached_count(&self) -> usize {
        self.services
            .iter()
            .flat_map(|s| s.bindings.iter())
            .filter(|b| b.cached)
            .count()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Container Registry")?;
        writeln!(f, "==================")?;
        writeln!(
            f,
            "Services: {} ({} bindings, {} cached)",
            self.services.len(),
            self.binding_count(),
            self.cached_count()
        )?;
        writeln!(f, "Context bindings: {}", self.context_bindings)?;

        for (i, service) in self.services.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "{}. {}", i + 1, service.service_type)?;
            for binding in &service.bindings {
                let kind = if binding.is_value { "value" } else { binding.scope.as_str() };
                let cached = if binding.cached { ", cached" } else { "" };
                writeln!(f, "   - {} [{}{}]", binding.implementation, kind, cached)?;
                for parameter in &binding.parameters {
                    writeln!(f, "       {}", parameter)?;
                }
            }
        }
        Ok(())
    }
}
