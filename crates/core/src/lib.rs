pub mod config;
pub mod container;
pub mod errors;

// Re-export key types for convenience
pub use config::{ConfigError, ConfigSource, ContainerConfig};
pub use container::{
    AnnotationExtractor, Arguments, ContainerHandle, ForwardRef, Injectable, IocContainer, IocContainerBuilder,
    Lazy, OverrideGuard, Parameter, Provider, RegistrySnapshot, ResolutionContext, Scope, Target,
    TypeDescriptor, TypeShape,
};
pub use errors::ContainerError;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version
pub fn version() -> &'static str {
    VERSION
}
