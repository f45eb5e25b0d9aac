use parking_lot::Mutex;
use sprig::{
    condition::OnProperty,
    errors::{BindErrorKind, ResolveErrorKind},
    properties::{Layer, LayerKind, LayeredProperties, Properties},
    Bean, BeanSelector, Bind, Container, Dynamic, Lazy, LifecycleState,
};
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tracing_test::traced_test;

fn layers(pairs: &[(&str, &str)]) -> LayeredProperties {
    let props = Properties::from_pairs(pairs.iter().copied()).unwrap();
    LayeredProperties::new().with(Layer::new("test", LayerKind::DefaultFile, props))
}

struct Repo {
    url: String,
}

struct Service {
    repo: Arc<Repo>,
}

#[test]
#[traced_test]
fn test_object_and_factory() {
    let container = Container::new();
    container
        .register(Bean::object(Repo { url: "mem://".to_owned() }))
        .unwrap();
    container
        .register(Bean::provide(|repo: Arc<Repo>| Ok::<_, Infallible>(Service { repo })))
        .unwrap();
    container.refresh().unwrap();

    let repo = container.get::<Repo>().unwrap();
    let service = container.get::<Service>().unwrap();
    assert!(Arc::ptr_eq(&repo, &service.repo));
    assert_eq!(service.repo.url, "mem://");
    assert_eq!(container.find(&BeanSelector::of::<Service>()).len(), 1);
}

#[test]
#[traced_test]
fn test_property_condition() {
    struct Feature;

    for (value, expected) in [(None, 0), (Some("off"), 0), (Some("on"), 1)] {
        let pairs = value.map(|value| vec![("feature", value)]).unwrap_or_default();
        let container = Container::with_properties(layers(&pairs));
        container
            .register(Bean::object(Feature).on(OnProperty::new("feature").having_value("on")))
            .unwrap();
        container.refresh().unwrap();
        assert_eq!(container.collect::<Feature>().len(), expected, "feature = {value:?}");
    }
}

#[derive(Debug, Bind)]
struct Storage {
    #[value("${dir:=${app.dir}}")]
    dir: String,
}

#[test]
#[traced_test]
fn test_nested_default() {
    let container = Container::with_properties(layers(&[("app.dir", "/srv/app")]));
    let storage: Storage = container.bind("${}").unwrap();
    assert_eq!(storage.dir, "/srv/app");

    let container = Container::with_properties(layers(&[("app.dir", "/srv/app"), ("dir", "/tmp")]));
    let storage: Storage = container.bind("${}").unwrap();
    assert_eq!(storage.dir, "/tmp");

    let container = Container::new();
    assert!(matches!(
        container.bind::<Storage>("${}"),
        Err(BindErrorKind::NotFound { key }) if key == "app.dir"
    ));
}

trait Filter: Send + Sync {
    fn name(&self) -> &'static str;
}

macro_rules! filter {
    ($($ty:ident),*) => {
        $(
            struct $ty;

            impl Filter for $ty {
                fn name(&self) -> &'static str {
                    stringify!($ty)
                }
            }
        )*
    };
}

filter!(F1, F2, F3);

struct Chain {
    filters: Vec<Arc<dyn Filter>>,
}

#[test]
#[traced_test]
fn test_collection_injection() {
    let container = Container::new();
    container
        .register(Bean::provide(|filters: Vec<Arc<dyn Filter>>| Ok::<_, Infallible>(Chain { filters })))
        .unwrap();
    container.register(Bean::object(F1).export::<dyn Filter>(|bean| bean)).unwrap();
    container.register(Bean::object(F2).export::<dyn Filter>(|bean| bean)).unwrap();
    container.register(Bean::object(F3).export::<dyn Filter>(|bean| bean)).unwrap();
    container.refresh().unwrap();

    let chain = container.get::<Chain>().unwrap();
    assert_eq!(chain.filters.iter().map(|filter| filter.name()).collect::<Vec<_>>(), ["F1", "F2", "F3"]);
    assert!(matches!(container.get::<dyn Filter>(), Err(ResolveErrorKind::Ambiguous { candidates, .. }) if candidates.len() == 3));
}

#[test]
#[traced_test]
fn test_dynamic_refresh() {
    struct Pool {
        size: Dynamic<i64>,
    }

    let container = Container::new();
    container
        .register(Bean::provide(|size: Dynamic<i64>| Ok::<_, Infallible>(Pool { size })).args(["${pool.size:=3}"]))
        .unwrap();
    container.refresh().unwrap();

    let pool = container.get::<Pool>().unwrap();
    assert_eq!(*pool.size.get(), 3);
    assert_eq!(pool.size.key(), Some("pool.size"));

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    pool.size.on_change(move |size| {
        assert_eq!(*size, 7);
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let report = container.refresh_with(layers(&[("pool.size", "7")]));
    assert!(report.is_ok());
    assert!(report.changed.contains("pool.size"));
    assert_eq!(*pool.size.get(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Unrelated changes leave the value and its callbacks alone
    let report = container.refresh_with(layers(&[("pool.size", "7"), ("other", "1")]));
    assert!(report.refreshed.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
#[traced_test]
fn test_shutdown_order() {
    struct A;
    struct B;
    struct C;

    let order = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();

    let (init, destroy) = (order.clone(), order.clone());
    container
        .register(
            Bean::provide(|_: Arc<B>| Ok::<_, Infallible>(C))
                .init(move |_| {
                    init.lock().push("init C");
                    Ok::<_, Infallible>(())
                })
                .destroy(move |_: Arc<C>| destroy.lock().push("destroy C")),
        )
        .unwrap();
    let (init, destroy) = (order.clone(), order.clone());
    container
        .register(
            Bean::provide(|_: Arc<A>| Ok::<_, Infallible>(B))
                .init(move |_| {
                    init.lock().push("init B");
                    Ok::<_, Infallible>(())
                })
                .destroy(move |_: Arc<B>| destroy.lock().push("destroy B")),
        )
        .unwrap();
    let (init, destroy) = (order.clone(), order.clone());
    container
        .register(
            Bean::object(A)
                .init(move |_| {
                    init.lock().push("init A");
                    Ok::<_, Infallible>(())
                })
                .destroy(move |_: Arc<A>| destroy.lock().push("destroy A")),
        )
        .unwrap();

    container.refresh().unwrap();
    assert_eq!(*order.lock(), ["init A", "init B", "init C"]);

    container.close();
    assert_eq!(container.state(), LifecycleState::Stopped);
    assert_eq!(
        *order.lock(),
        ["init A", "init B", "init C", "destroy C", "destroy B", "destroy A"]
    );
}

#[test]
#[traced_test]
fn test_lazy_cycle() {
    struct Left {
        right: Lazy<Right>,
    }

    struct Right {
        left: Arc<Left>,
    }

    let container = Container::new();
    container
        .register(Bean::provide(|right: Lazy<Right>| Ok::<_, Infallible>(Left { right })))
        .unwrap();
    container
        .register(Bean::provide(|left: Arc<Left>| Ok::<_, Infallible>(Right { left })))
        .unwrap();
    container.refresh().unwrap();

    let left = container.get::<Left>().unwrap();
    let right = left.right.get().unwrap();
    assert!(Arc::ptr_eq(&right.left, &left));
}

#[test]
#[traced_test]
fn test_eager_cycle() {
    struct Left;
    struct Right;

    let container = Container::new();
    container
        .register(Bean::provide(|_: Arc<Right>| Ok::<_, Infallible>(Left)).name("left"))
        .unwrap();
    container
        .register(Bean::provide(|_: Arc<Left>| Ok::<_, Infallible>(Right)).name("right"))
        .unwrap();

    assert!(matches!(
        container.refresh(),
        Err(sprig::Error::Resolve(ResolveErrorKind::CyclicDependency { path })) if path.first() == path.last()
    ));
    assert_eq!(container.state(), LifecycleState::Stopped);
}
