//! Parameter discovery for constructible and callable targets.
//!
//! Rust has no runtime reflection over constructor signatures, so every
//! target declares its parameters explicitly: types through
//! [`Injectable::parameters`], factories and callables through the parameter
//! list handed to [`Provider::factory`] or [`Target::function`]. The resolver
//! only ever sees that declaration through [`AnnotationExtractor`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::container::arguments::Arguments;
use crate::container::descriptor::Parameter;
use crate::container::instance::Instance;
use crate::errors::ContainerError;

/// Supplies the ordered `(name, shape)` parameter list of a target.
///
/// `None` means the target cannot be described, e.g. a ready-made value that
/// needs no construction.
pub trait AnnotationExtractor {
    fn extract(&self) -> Option<&[Parameter]>;
}

/// Types the container can construct by resolving their declared parameters
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Constructor parameters in declaration order
    fn parameters() -> Vec<Parameter>;

    /// Build an instance from the resolved keyword arguments
    fn inject(args: &mut Arguments) -> Result<Self, ContainerError>;
}

pub(crate) type ErasedBuild =
    Arc<dyn Fn(&mut Arguments) -> Result<Instance, ContainerError> + Send + Sync>;

type BuildFn<I> = Arc<dyn Fn(&mut Arguments) -> Result<Arc<I>, ContainerError> + Send + Sync>;

enum ProviderKind<I: ?Sized> {
    Construct {
        parameters: Vec<Parameter>,
        build: BuildFn<I>,
    },
    Value(Arc<I>),
}

/// What satisfies a bound type `I`: a constructor, a factory, or a value
pub struct Provider<I: ?Sized> {
    kind: ProviderKind<I>,
    implementation: &'static str,
}

impl<I: ?Sized + Send + Sync + 'static> Provider<I> {
    /// Construct `T` through [`Injectable`] and expose it as `I`
    pub fn injectable<T: Injectable>(upcast: fn(Arc<T>) -> Arc<I>) -> Self {
        Self {
            kind: ProviderKind::Construct {
                parameters: T::parameters(),
                build: Arc::new(move |args: &mut Arguments| Ok(upcast(Arc::new(T::inject(args)?)))),
            },
            implementation: std::any::type_name::<T>(),
        }
    }

    /// Factory function with an explicit parameter list
    pub fn factory<F>(parameters: Vec<Parameter>, factory: F) -> Self
    where
        F: Fn(&mut Arguments) -> Result<Arc<I>, ContainerError> + Send + Sync + 'static,
    {
        Self {
            kind: ProviderKind::Construct {
                parameters,
                build: Arc::new(factory),
            },
            implementation: std::any::type_name::<F>(),
        }
    }

    /// Ready-made value, returned verbatim on every lookup
    pub fn value(value: Arc<I>) -> Self {
        Self {
            kind: ProviderKind::Value(value),
            implementation: std::any::type_name::<I>(),
        }
    }

    pub fn implementation_name(&self) -> &'static str {
        self.implementation
    }

    pub fn is_value(&self) -> bool {
        matches!(self.kind, ProviderKind::Value(_))
    }

    /// Split into the erased pieces a binding stores
    pub(crate) fn into_parts(self) -> ProviderParts {
        match self.kind {
            ProviderKind::Construct { parameters, build } => ProviderParts {
                parameters: Some(parameters),
                build: Some(Arc::new(move |args: &mut Arguments| {
                    build(args).map(|value| Instance::new(value))
                })),
                value: None,
                implementation: self.implementation,
            },
            ProviderKind::Value(value) => ProviderParts {
                parameters: None,
                build: None,
                value: Some(Instance::new(value)),
                implementation: self.implementation,
            },
        }
    }
}

impl<T: Injectable> Provider<T> {
    /// Construct `T` and bind it as itself
    pub fn of() -> Self {
        Self::injectable::<T>(|instance| instance)
    }
}

impl<I: ?Sized> AnnotationExtractor for Provider<I> {
    fn extract(&self) -> Option<&[Parameter]> {
        match &self.kind {
            ProviderKind::Construct { parameters, .. } => Some(parameters),
            ProviderKind::Value(_) => None,
        }
    }
}

impl<I: ?Sized> fmt::Debug for Provider<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("implementation", &self.implementation)
            .field("parameters", &self.extract())
            .finish()
    }
}

pub(crate) struct ProviderParts {
    pub parameters: Option<Vec<Parameter>>,
    pub build: Option<ErasedBuild>,
    pub value: Option<Instance>,
    pub implementation: &'static str,
}

/// Boxed future returned by asynchronous targets
pub type TargetFuture<R> = Pin<Box<dyn Future<Output = Result<R, ContainerError>> + Send>>;

type SyncCall<R> = Box<dyn FnOnce(&mut Arguments) -> Result<R, ContainerError> + Send>;
type AsyncCall<R> = Box<dyn FnOnce(Arguments) -> TargetFuture<R> + Send>;

/// A callable whose parameters the container resolves before invoking it
pub enum Target<R> {
    Function {
        name: &'static str,
        parameters: Vec<Parameter>,
        call: SyncCall<R>,
    },
    Async {
        name: &'static str,
        parameters: Vec<Parameter>,
        call: AsyncCall<R>,
    },
    /// A plain value; it has no signature to resolve
    Value(R),
}

impl<R: 'static> Target<R> {
    pub fn function<F>(parameters: Vec<Parameter>, call: F) -> Self
    where
        F: FnOnce(&mut Arguments) -> Result<R, ContainerError> + Send + 'static,
    {
        Target::Function {
            name: std::any::type_name::<F>(),
            parameters,
            call: Box::new(call),
        }
    }

    pub fn asynchronous<F, Fut>(parameters: Vec<Parameter>, call: F) -> Self
    where
        F: FnOnce(Arguments) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, ContainerError>> + Send + 'static,
    {
        Target::Async {
            name: std::any::type_name::<F>(),
            parameters,
            call: Box::new(move |args: Arguments| -> TargetFuture<R> { Box::pin(call(args)) }),
        }
    }

    pub fn value(value: R) -> Self {
        Target::Value(value)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Target::Function { name, .. } | Target::Async { name, .. } => name,
            Target::Value(_) => std::any::type_name::<R>(),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Target::Async { .. })
    }
}

impl<R> AnnotationExtractor for Target<R> {
    fn extract(&self) -> Option<&[Parameter]> {
        match self {
            Target::Function { parameters, .. } | Target::Async { parameters, .. } => {
                Some(parameters)
            }
            Target::Value(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock;

    impl Injectable for Clock {
        fn parameters() -> Vec<Parameter> {
            Vec::new()
        }

        fn inject(_args: &mut Arguments) -> Result<Self, ContainerError> {
            Ok(Clock)
        }
    }

    #[test]
    fn test_value_provider_has_no_signature() {
        let provider = Provider::value(Arc::new(5u8));
        assert!(provider.is_value());
        assert!(provider.extract().is_none());
    }

    #[test]
    fn test_injectable_provider_exposes_parameters() {
        let provider = Provider::<Clock>::of();
        assert_eq!(provider.extract().map(|p| p.len()), Some(0));
        assert!(provider.implementation_name().contains("Clock"));
    }

    #[test]
    fn test_target_signature() {
        let target = Target::function(vec![Parameter::of::<Clock>("clock")], |_| Ok(1));
        assert_eq!(target.extract().map(|p| p[0].name.clone()), Some("clock".to_string()));
        assert!(!target.is_async());

        let value: Target<i32> = Target::value(3);
        assert!(value.extract().is_none());
    }
}
