//! Integration tests for resolution contexts and forward references.

use std::sync::Arc;

use wirebox_core::container::Injectable;
use wirebox_core::{
    Arguments, ContainerError, ContainerHandle, ForwardRef, IocContainer, Parameter, Provider,
    ResolutionContext, Target,
};

#[derive(Debug, PartialEq)]
struct RequestId(u32);

#[derive(Debug)]
struct Handler {
    request: Arc<RequestId>,
}

impl Injectable for Handler {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<RequestId>("request")]
    }

    fn inject(args: &mut Arguments) -> Result<Self, ContainerError> {
        Ok(Handler {
            request: args.single::<RequestId>("request")?,
        })
    }
}

fn request(id: u32) -> Provider<RequestId> {
    Provider::value(Arc::new(RequestId(id)))
}

#[test]
fn test_context_bindings_are_isolated() {
    let container = IocContainer::new();
    let first = container.create_context();
    let second = container.create_context();

    first.register_context(request(1)).unwrap();

    assert_eq!(*first.get::<RequestId>().unwrap(), RequestId(1));
    assert!(second.get::<RequestId>().unwrap_err().is_not_found());
    assert!(container.get::<RequestId>().unwrap_err().is_not_found());
    assert_eq!(container.size().unwrap(), 0);
}

#[test]
fn test_context_binding_takes_precedence() {
    let container = IocContainer::new();
    container.register_singleton(request(0)).unwrap();

    let context = container.create_context();
    context.register_context(request(7)).unwrap();

    assert_eq!(*context.get::<RequestId>().unwrap(), RequestId(7));
    assert_eq!(*container.get::<RequestId>().unwrap(), RequestId(0));

    let all = context.get_all::<RequestId>().unwrap();
    assert_eq!(all.iter().map(|r| r.0).collect::<Vec<_>>(), vec![7, 0]);
}

#[test]
fn test_global_binding_sees_context_dependencies() {
    let container = IocContainer::new();
    container.register_transient(Provider::<Handler>::of()).unwrap();

    let context = container.create_context();
    context.register_context(request(42)).unwrap();

    assert_eq!(context.get::<Handler>().unwrap().request.0, 42);
    assert!(container.get::<Handler>().unwrap_err().is_unresolvable());
}

#[test]
fn test_context_scope_caches_per_context() {
    let container = IocContainer::new();
    let parent = container.create_context();
    parent
        .register_context(Provider::<RequestId>::factory(Vec::new(), |_| Ok(Arc::new(RequestId(5)))))
        .unwrap();

    let a = parent.get::<RequestId>().unwrap();
    let b = parent.get::<RequestId>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let child = parent.child().unwrap();
    assert_eq!(child.parent_id(), Some(parent.id()));
    let c = child.get::<RequestId>().unwrap();
    assert!(!Arc::ptr_eq(&a, &c));

    child.register_context(Provider::<Handler>::of()).unwrap();
    assert_eq!(child.get::<Handler>().unwrap().request.0, 5);
    assert!(parent.try_get::<Handler>().unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_contexts_do_not_interfere() {
    let container = Arc::new(IocContainer::new());
    container.register_transient(Provider::<Handler>::of()).unwrap();

    let mut tasks = Vec::new();
    for id in 0..16u32 {
        let container = container.clone();
        tasks.push(tokio::spawn(async move {
            let context = container.create_context();
            context.register_context(request(id)).unwrap();
            tokio::task::yield_now().await;
            let handler = context.get::<Handler>().unwrap();
            assert_eq!(context.get_all::<RequestId>().unwrap().len(), 1);
            handler.request.0
        }));
    }

    for (id, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), id as u32);
    }
}

#[derive(Debug)]
struct Parent {
    child: ForwardRef<Child>,
}

#[derive(Debug)]
struct Child {
    parent: ForwardRef<Parent>,
}

impl Injectable for Parent {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::forward::<Child>("child")]
    }

    fn inject(args: &mut Arguments) -> Result<Self, ContainerError> {
        Ok(Parent {
            child: args.forward::<Child>("child")?,
        })
    }
}

impl Injectable for Child {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::forward::<Parent>("parent")]
    }

    fn inject(args: &mut Arguments) -> Result<Self, ContainerError> {
        Ok(Child {
            parent: args.forward::<Parent>("parent")?,
        })
    }
}

fn family() -> IocContainer {
    let container = IocContainer::new();
    container.register_singleton(Provider::<Parent>::of()).unwrap();
    container.register_singleton(Provider::<Child>::of()).unwrap();
    container
}

#[test]
fn test_forward_reference_round_trip() {
    let container = family();

    let parent = container.get::<Parent>().unwrap();
    assert!(!parent.child.is_resolved());

    let child = parent.child.get().unwrap();
    assert!(parent.child.is_resolved());

    let back = child.parent.get().unwrap();
    assert!(Arc::ptr_eq(&parent, &back));
    assert!(Arc::ptr_eq(&child, &container.get::<Child>().unwrap()));
}

#[test]
fn test_unaccessed_forward_reference_resolves_nothing() {
    let container = family();
    container.get::<Parent>().unwrap();

    let snapshot = container.snapshot().unwrap();
    assert_eq!(snapshot.cached_count(), 1);
}

#[test]
fn test_forward_reference_outliving_container() {
    let container = family();
    let parent = container.get::<Parent>().unwrap();
    drop(container);

    let err = parent.child.get().unwrap_err();
    assert!(matches!(err, ContainerError::ResolverDropped { .. }));
}

fn forward_request(context: &ResolutionContext) -> ForwardRef<RequestId> {
    context
        .resolve_callable(Target::function(vec![Parameter::forward::<RequestId>("request")], |args| {
            args.forward::<RequestId>("request")
        }))
        .unwrap()
}

#[test]
fn test_forward_reference_stays_in_its_context() {
    let container = IocContainer::new();
    let x = container.create_context();
    let y = container.create_context();
    x.register_context(request(1)).unwrap();
    y.register_context(request(2)).unwrap();

    assert_eq!(forward_request(&x).get().unwrap().0, 1);
    assert_eq!(forward_request(&y).get().unwrap().0, 2);
    assert!(forward_request(container.root_context()).get().err().unwrap().is_not_found());
}

#[test]
fn test_forward_reference_to_transient_is_not_shared() {
    let container = IocContainer::new();
    container
        .register_transient(Provider::<RequestId>::factory(Vec::new(), |_| Ok(Arc::new(RequestId(3)))))
        .unwrap();

    let first = forward_request(container.root_context());
    let second = forward_request(container.root_context());
    let a = first.get().unwrap();
    assert!(Arc::ptr_eq(&a, &first.get().unwrap()));
    assert!(!Arc::ptr_eq(&a, &second.get().unwrap()));
}

#[test]
fn test_forward_reference_sees_override_with_kept_cache() {
    let container = IocContainer::new();
    container
        .register_singleton(Provider::<RequestId>::factory(Vec::new(), |_| Ok(Arc::new(RequestId(1)))))
        .unwrap();
    assert_eq!(forward_request(container.root_context()).get().unwrap().0, 1);

    let guard = container
        .override_binding::<RequestId>()
        .instance(Arc::new(RequestId(99)))
        .keep_cache()
        .apply()
        .unwrap();
    assert_eq!(container.get::<RequestId>().unwrap().0, 99);
    assert_eq!(forward_request(container.root_context()).get().unwrap().0, 99);

    drop(guard);
    assert_eq!(forward_request(container.root_context()).get().unwrap().0, 1);
}

#[derive(Debug)]
struct Ping;

#[derive(Debug)]
struct Pong;

impl Injectable for Ping {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::forward::<Pong>("pong")]
    }

    fn inject(args: &mut Arguments) -> Result<Self, ContainerError> {
        args.forward::<Pong>("pong")?.get()?;
        Ok(Ping)
    }
}

impl Injectable for Pong {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::forward::<Ping>("ping")]
    }

    fn inject(args: &mut Arguments) -> Result<Self, ContainerError> {
        args.forward::<Ping>("ping")?.get()?;
        Ok(Pong)
    }
}

#[test]
fn test_forward_reference_used_during_construction_reports_cycle() {
    let container = IocContainer::new();
    container.register_transient(Provider::<Ping>::of()).unwrap();
    container.register_transient(Provider::<Pong>::of()).unwrap();

    let err = container.get::<Ping>().unwrap_err();
    assert!(matches!(err, ContainerError::CircularDependency { .. }));
}

#[test]
fn test_singleton_with_context_dependency_stays_in_context() {
    let container = IocContainer::new();
    container.register_singleton(Provider::<Handler>::of()).unwrap();

    let x = container.create_context();
    let y = container.create_context();
    x.register_context(request(1)).unwrap();

    let first = x.get::<Handler>().unwrap();
    assert_eq!(first.request.0, 1);
    assert!(Arc::ptr_eq(&first, &x.get::<Handler>().unwrap()));

    assert!(y.get::<Handler>().unwrap_err().is_unresolvable());
    assert!(container.get::<Handler>().unwrap_err().is_unresolvable());
    assert_eq!(container.snapshot().unwrap().cached_count(), 0);

    y.register_context(request(2)).unwrap();
    assert_eq!(y.get::<Handler>().unwrap().request.0, 2);
}

#[test]
fn test_factory_looks_up_services_through_injected_handle() {
    let container = IocContainer::new();
    container
        .register_transient::<u32>(Provider::factory(
            vec![Parameter::of::<ContainerHandle>("container")],
            |args| {
                let handle = args.single::<ContainerHandle>("container")?;
                Ok(Arc::new(handle.get::<RequestId>()?.0))
            },
        ))
        .unwrap();

    let context = container.create_context();
    context.register_context(request(5)).unwrap();

    assert_eq!(*context.get::<u32>().unwrap(), 5);
    assert!(container.get::<u32>().unwrap_err().is_not_found());
}
