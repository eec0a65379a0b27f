pub mod arguments;
pub mod binding;
pub mod conditions;
pub mod debug;
pub mod descriptor;
pub mod forward;
pub mod instance;
pub mod ioc_builder;
pub mod ioc_container;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod signature;

pub use arguments::{Arguments, Lazy, LazyInstances, Resolved};
pub use binding::Binding;
pub use conditions::{
    CollectionCondition, Condition, ConditionChain, ContainerHandleCondition, DefaultCondition,
    ForwardRefCondition, GenericCondition, IteratorCondition, UnionCondition,
};
pub use debug::{BindingInfo, RegistrySnapshot, ServiceEntry};
pub use descriptor::{Parameter, TypeDescriptor, TypeIdent, TypeShape};
pub use forward::{ForwardHandle, ForwardRef};
pub use instance::Instance;
pub use ioc_builder::IocContainerBuilder;
pub use ioc_container::{ContainerHandle, IocContainer, ResolutionContext};
pub use registry::{Override, OverrideGuard, Registry};
pub use resolver::{ResolutionPath, Resolver, WeakResolver};
pub use scope::{ContextLayer, Scope};
pub use signature::{AnnotationExtractor, Injectable, Provider, Target, TargetFuture};
