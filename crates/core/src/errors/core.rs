use thiserror::Error;

/// Error type for registration and resolution in the container
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Dependency not found: {service_type}")]
    NotFound { service_type: String },

    #[error("Unresolvable dependency '{service_type}': {reason}")]
    UnresolvableDependency { service_type: String, reason: String },

    /// Raised by a condition that does not support a shape. The condition chain
    /// consumes it and keeps probing.
    #[error("Condition '{condition}' does not support shape {shape}")]
    TypingMismatch { condition: String, shape: String },

    #[error("Binding for '{service_type}' declares itself as parameter '{parameter}' without a forward reference")]
    SelfReference { service_type: String, parameter: String },

    #[error("Cannot override '{service_type}': no binding registered")]
    BindingNotFound { service_type: String },

    #[error("Target '{target}' has no parameter signature")]
    MissingSignature { target: String },

    #[error("Target '{target}' is not asynchronous")]
    NotAsynchronous { target: String },

    #[error("Target '{target}' is asynchronous, use resolve_callable_async")]
    AsynchronousTarget { target: String },

    #[error("Circular dependency detected: {path} (cycle at: {cycle_service})")]
    CircularDependency { path: String, cycle_service: String },

    #[error("Resolution depth {depth} exceeded while resolving '{service_type}'")]
    ResolutionDepthExceeded { service_type: String, depth: usize },

    #[error("Instance bound to '{service_type}' is not a {expected}")]
    InstanceTypeMismatch { service_type: String, expected: String },

    #[error("Missing argument '{name}'")]
    MissingArgument { name: String },

    #[error("Argument '{name}' holds {found}, expected {expected}")]
    ArgumentMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Container backing a forward reference to '{service_type}' was dropped")]
    ResolverDropped { service_type: String },

    #[error("Construction of '{service_type}' failed: {source}")]
    ConstructionFailed {
        service_type: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },
}

impl ContainerError {
    /// Create a not found error
    pub fn not_found(service_type: impl Into<String>) -> Self {
        Self::NotFound {
            service_type: service_type.into(),
        }
    }

    /// Create an unresolvable dependency error
    pub fn unresolvable(service_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvableDependency {
            service_type: service_type.into(),
            reason: reason.into(),
        }
    }

    pub fn typing_mismatch(condition: impl Into<String>, shape: impl Into<String>) -> Self {
        Self::TypingMismatch {
            condition: condition.into(),
            shape: shape.into(),
        }
    }

    /// Wrap an error returned by a user constructor or factory
    pub fn construction(
        service_type: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ConstructionFailed {
            service_type: service_type.into(),
            source: source.into(),
        }
    }

    pub fn lock(resource: impl Into<String>) -> Self {
        Self::LockError {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::UnresolvableDependency { .. })
    }

    pub fn is_typing_mismatch(&self) -> bool {
        matches!(self, Self::TypingMismatch { .. })
    }

    pub fn is_self_reference(&self) -> bool {
        matches!(self, Self::SelfReference { .. })
    }

    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }
}
