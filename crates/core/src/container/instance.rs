use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::container::descriptor::TypeDescriptor;
use crate::errors::ContainerError;

/// Type-erased handle to a resolved service.
///
/// The erased value is always an `Arc<T>` for the `T` the binding was
/// registered with, so trait-object services survive the round trip and
/// clones of a cached instance stay pointer-equal.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Name of the type the instance was erased from
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Downcast, reporting the descriptor the instance was resolved for on failure
    pub fn downcast_for<T: ?Sized + Send + Sync + 'static>(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Arc<T>, ContainerError> {
        self.downcast::<T>()
            .ok_or_else(|| ContainerError::InstanceTypeMismatch {
                service_type: descriptor.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// Check whether two handles erase the same allocation
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_trait_object_round_trip() {
        let instance = Instance::new(Arc::new(English) as Arc<dyn Greeter>);

        let greeter = instance.downcast::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(instance.downcast::<English>().is_none());
    }

    #[test]
    fn test_clones_share_allocation() {
        let instance = Instance::new(Arc::new(42u32));
        let copy = instance.clone();

        assert!(instance.ptr_eq(&copy));
        let a = instance.downcast::<u32>().unwrap();
        let b = copy.downcast::<u32>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_downcast_for_reports_mismatch() {
        let instance = Instance::new(Arc::new("text".to_string()));
        let err = instance
            .downcast_for::<u32>(&TypeDescriptor::key("count"))
            .unwrap_err();
        assert!(matches!(err, ContainerError::InstanceTypeMismatch { .. }));
    }
}
