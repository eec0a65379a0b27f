use crate::config::ContainerConfig;
use crate::container::conditions::{Condition, ConditionChain};
use crate::container::ioc_container::IocContainer;

/// Builder for IoC container with fluent API
pub struct IocContainerBuilder {
    config: ContainerConfig,
    conditions: Vec<Box<dyn Condition>>,
}

impl IocContainerBuilder {
    /// Create a new IoC container builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            conditions: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a resolution strategy consulted after the built-in shape conditions
    /// and before the default lookup
    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    /// Build the IoC container
    pub fn build(self) -> IocContainer {
        IocContainer::from_parts(self.config, ConditionChain::with_custom(self.conditions))
    }
}

impl Default for IocContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IocContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IocContainerBuilder")
            .field("config", &self.config)
            .field(
                "conditions",
                &self.conditions.iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
