use std::{any::type_name, sync::Arc};
use tracing::{debug, error, info_span};

use crate::{
    bean::{AnyArc, BeanDefinition, BeanId, BeanSelector, BeanState, Constructor},
    bind::{bind_value, Bind, BindContext, BindParam, Converters},
    condition::{ConditionContext, Verdict, Verdicts},
    dependency_resolver::Lazy,
    dynamic::DynamicRegistry,
    errors::{InstantiateErrorKind, ResolveErrorKind},
    finalizer::Destroyer,
    properties::PropertyReader,
    registry::{describe, Registry},
};

type LazyFill = Box<dyn FnOnce(&BeanDefinition, &AnyArc)>;

/// State of one wiring pass: the registry being wired, the property snapshot and the chain of
/// beans under construction.
///
/// Factories and [`crate::Component`] implementations receive it to resolve their dependencies.
pub struct Wiring<'a> {
    registry: &'a mut Registry,
    props: &'a dyn PropertyReader,
    converters: &'a Converters,
    dynamics: &'a DynamicRegistry,
    stack: Vec<BeanId>,
    lazies: Vec<(BeanId, LazyFill)>,
    destroyers: Vec<Destroyer>,
    /// Name used in errors raised outside of any bean, e.g. by a configurer
    owner: Option<String>,
}

impl<'a> Wiring<'a> {
    pub(crate) fn new(
        registry: &'a mut Registry,
        props: &'a dyn PropertyReader,
        converters: &'a Converters,
        dynamics: &'a DynamicRegistry,
    ) -> Self {
        Self {
            registry,
            props,
            converters,
            dynamics,
            stack: Vec::new(),
            lazies: Vec::new(),
            destroyers: Vec::new(),
            owner: None,
        }
    }

    pub(crate) fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    /// Name of the bean being constructed.
    #[must_use]
    pub fn bean_name(&self) -> &str {
        self.stack
            .last()
            .and_then(|id| self.registry.get(*id))
            .map(BeanDefinition::name)
            .or(self.owner.as_deref())
            .unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &dyn PropertyReader {
        self.props
    }

    pub(crate) fn factory_error(&self, source: anyhow::Error) -> ResolveErrorKind {
        let err = ResolveErrorKind::FactoryReturnedError {
            bean: self.bean_name().to_owned(),
            source: InstantiateErrorKind::Custom(source),
        };
        error!("{}", err);
        err
    }

    /// Destroy hooks recorded so far, in initialization order.
    pub(crate) fn take_destroyers(&mut self) -> Vec<Destroyer> {
        std::mem::take(&mut self.destroyers)
    }

    fn parse_selector(selector: Option<&str>) -> Result<(Option<BeanSelector>, bool), ResolveErrorKind> {
        match selector {
            Some(selector) => {
                let (selector, optional) = BeanSelector::parse(selector)?;
                Ok((Some(selector), optional))
            }
            None => Ok((None, false)),
        }
    }

    /// Wires and returns the single bean selectable as `T`, `None` if there is none.
    fn resolve_one<T: ?Sized + 'static>(&mut self, selector: Option<&str>) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        let (parsed, _) = Self::parse_selector(selector)?;
        let candidates = self.registry.candidates::<T>(parsed.as_ref());
        let Some(id) = self.registry.pick_one(&candidates, &describe::<T>(selector))? else {
            return Ok(None);
        };
        let instance = self.wire(id)?;
        self.cast::<T>(id, instance).map(Some)
    }

    fn cast<T: ?Sized + 'static>(&self, id: BeanId, instance: AnyArc) -> Result<Arc<T>, ResolveErrorKind> {
        let bean = self.registry.get(id);
        bean.and_then(|bean| bean.cast::<T>(instance)).ok_or_else(|| {
            let err = ResolveErrorKind::IncorrectType {
                expected: type_name::<T>(),
                actual: bean.map_or("<unknown>", BeanDefinition::type_name),
            };
            error!("{}", err);
            err
        })
    }

    /// The single bean selectable as `T`.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NotFound`] if there is no candidate
    /// - Returns [`ResolveErrorKind::Ambiguous`] if there are several and none is primary
    /// - Returns any error raised while wiring the candidate
    pub fn get<T: ?Sized + 'static>(&mut self, selector: Option<&str>) -> Result<Arc<T>, ResolveErrorKind> {
        match self.resolve_one::<T>(selector)? {
            Some(val) => Ok(val),
            None => {
                let err = ResolveErrorKind::NotFound {
                    selector: describe::<T>(selector),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Like [`Self::get`], but no candidate is `None`.
    ///
    /// # Errors
    /// See [`Self::get`].
    #[inline]
    pub fn get_optional<T: ?Sized + 'static>(&mut self, selector: Option<&str>) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        self.resolve_one::<T>(selector)
    }

    /// Every bean selectable as `T`, in registration order.
    ///
    /// # Errors
    /// Returns any error raised while wiring a candidate.
    pub fn collect<T: ?Sized + 'static>(&mut self, selector: Option<&str>) -> Result<Vec<Arc<T>>, ResolveErrorKind> {
        let (parsed, _) = Self::parse_selector(selector)?;
        let candidates = self.registry.candidates::<T>(parsed.as_ref());
        debug!(selector = %describe::<T>(selector), candidates = candidates.len(), "Collecting beans");

        let mut beans = Vec::with_capacity(candidates.len());
        for id in candidates {
            let instance = self.wire(id)?;
            beans.push(self.cast::<T>(id, instance)?);
        }
        Ok(beans)
    }

    /// A reference to the single bean selectable as `T`, filled once it's wired.
    /// The target isn't wired on the spot, so a cycle through a lazy reference doesn't fail.
    ///
    /// # Errors
    /// See [`Self::get`].
    pub fn lazy<T: ?Sized + 'static>(&mut self, selector: Option<&str>) -> Result<Lazy<T>, ResolveErrorKind> {
        let (parsed, optional) = Self::parse_selector(selector)?;
        let candidates = self.registry.candidates::<T>(parsed.as_ref());
        let lazy = Lazy::empty();
        let Some(id) = self.registry.pick_one(&candidates, &describe::<T>(selector))? else {
            if optional {
                return Ok(lazy);
            }
            let err = ResolveErrorKind::NotFound {
                selector: describe::<T>(selector),
            };
            error!("{}", err);
            return Err(err);
        };

        if let Some(instance) = self.registry.get(id).filter(|bean| bean.state == BeanState::Wired).and_then(|bean| bean.instance.clone()) {
            lazy.fill(self.cast::<T>(id, instance)?);
            return Ok(lazy);
        }

        debug!(bean = %id, "Lazy reference deferred");
        let fill = lazy.clone();
        self.lazies.push((
            id,
            Box::new(move |bean: &BeanDefinition, instance: &AnyArc| {
                if let Some(val) = bean.cast::<T>(instance.clone()) {
                    fill.fill(val);
                }
            }),
        ));
        Ok(lazy)
    }

    /// Binds `T` from the property snapshot. Dynamic values are registered for refresh.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::Bind`] if the tag is malformed or binding fails.
    pub fn bind<T: Bind>(&mut self, tag: &str, validate: Option<&str>) -> Result<T, ResolveErrorKind> {
        let ctx = BindContext::new(self.props, self.converters).with_dynamics(self.dynamics);
        BindParam::parse("", tag)
            .map(|param| match validate {
                Some(expr) => param.with_validate(expr),
                None => param,
            })
            .and_then(|param| bind_value::<T>(&ctx, &param))
            .map_err(|source| {
                let err = ResolveErrorKind::Bind {
                    bean: self.bean_name().to_owned(),
                    source,
                };
                error!("{}", err);
                err
            })
    }

    /// Wires the bean with `id` and its dependencies, returning the cached instance if it's already wired.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::CyclicDependency`] if the bean is already under construction
    /// - Returns any error of its dependencies, factory or initializer
    pub(crate) fn wire(&mut self, id: BeanId) -> Result<AnyArc, ResolveErrorKind> {
        let Some(bean) = self.registry.get(id) else {
            return Err(ResolveErrorKind::NotFound { selector: id.to_string() });
        };
        match (bean.state, &bean.instance) {
            (BeanState::Wired, Some(instance)) => return Ok(instance.clone()),
            (BeanState::Wiring, _) => {
                let start = self.stack.iter().position(|wiring| *wiring == id).unwrap_or_default();
                let path = self.stack[start..]
                    .iter()
                    .chain([&id])
                    .filter_map(|id| self.registry.get(*id))
                    .map(|bean| bean.name().to_owned())
                    .collect();
                let err = ResolveErrorKind::CyclicDependency { path };
                error!("{}", err);
                return Err(err);
            }
            (BeanState::Deleted, _) => {
                return Err(ResolveErrorKind::NotFound {
                    selector: bean.name().to_owned(),
                })
            }
            _ => {}
        }

        let span = info_span!("wire", bean = bean.name(), ty = bean.type_name());
        let _guard = span.enter();

        self.set_state(id, BeanState::Wiring);
        self.stack.push(id);
        let result = self.instantiate(id);
        self.stack.pop();

        match result {
            Ok(instance) => {
                if let Some(bean) = self.registry.get_mut(id) {
                    bean.state = BeanState::Wired;
                    bean.instance = Some(instance.clone());
                }
                self.fill_lazies(id, &instance);
                debug!("Wired");
                Ok(instance)
            }
            Err(err) => {
                self.set_state(id, BeanState::Resolved);
                Err(err)
            }
        }
    }

    fn set_state(&mut self, id: BeanId, state: BeanState) {
        if let Some(bean) = self.registry.get_mut(id) {
            bean.state = state;
        }
    }

    fn instantiate(&mut self, id: BeanId) -> Result<AnyArc, ResolveErrorKind> {
        let Some(bean) = self.registry.get(id) else {
            return Err(ResolveErrorKind::NotFound { selector: id.to_string() });
        };
        let name = bean.name().to_owned();
        let depends_on = bean.depends_on.clone();
        let constructor = bean.constructor.clone();
        let args = bean.args.clone();
        let init = bean.init.clone();
        let destroy = bean.destroy.clone();

        for selector in &depends_on {
            let (selector, optional) = BeanSelector::parse(selector)?;
            let ids = self.registry.find(&selector).iter().map(|bean| bean.id()).collect::<Vec<_>>();
            if ids.is_empty() && !optional {
                let err = ResolveErrorKind::NotFound {
                    selector: selector.to_string(),
                };
                error!("{}", err);
                return Err(err);
            }
            for dependency in ids {
                self.wire(dependency)?;
            }
        }

        let instance = match constructor {
            Constructor::Object(instance) => instance,
            Constructor::Factory(factory) => factory(self, &args)?,
        };

        if let Some(init) = init {
            init(&instance).map_err(|source| {
                let err = ResolveErrorKind::Init {
                    bean: name.clone(),
                    source: InstantiateErrorKind::Custom(source),
                };
                error!("{}", err);
                err
            })?;
            debug!("Initializer called");
        }
        if let Some(destroy) = destroy {
            self.destroyers.push(Destroyer::new(name, destroy, instance.clone()));
        }
        Ok(instance)
    }

    fn fill_lazies(&mut self, id: BeanId, instance: &AnyArc) {
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.lazies).into_iter().partition(|(target, _)| *target == id);
        self.lazies = pending;
        if let Some(bean) = self.registry.get(id) {
            for (_, fill) in ready {
                fill(bean, instance);
            }
        }
    }

    /// Wires every live bean in registration order.
    ///
    /// # Errors
    /// Returns the first error raised.
    pub(crate) fn wire_all(&mut self) -> Result<(), ResolveErrorKind> {
        let ids = self.registry.live().map(BeanDefinition::id).collect::<Vec<_>>();
        for id in ids {
            self.wire(id)?;
        }
        Ok(())
    }
}

/// Decides the conditions of every unresolved bean, then deletes the rejected ones.
///
/// A bean condition decides its candidates before counting them, so a rejection cascades
/// through `OnBean` and `OnMissingBean` whatever the registration order.
///
/// # Errors
/// Returns [`ResolveErrorKind::Condition`] if a condition can't be evaluated.
pub(crate) fn filter(registry: &mut Registry, props: &dyn PropertyReader) -> Result<(), ResolveErrorKind> {
    let span = info_span!("filter");
    let _guard = span.enter();

    let pending = registry
        .iter()
        .filter(|bean| bean.state == BeanState::Unresolved)
        .map(BeanDefinition::id)
        .collect::<Vec<_>>();
    for id in &pending {
        if let Some(bean) = registry.get_mut(*id) {
            bean.state = BeanState::Resolving;
        }
    }

    let verdicts = Verdicts::default();
    let ctx = ConditionContext::new(props, registry).with_verdicts(&verdicts);
    for id in &pending {
        let Some(bean) = registry.get(*id) else {
            continue;
        };
        verdicts.decide(bean, &ctx).map_err(|source| {
            let err = ResolveErrorKind::Condition {
                bean: bean.name().to_owned(),
                source,
            };
            error!("{}", err);
            err
        })?;
    }

    let mut rejected = 0;
    for id in pending {
        if verdicts.get(id) == Some(Verdict::Rejected) {
            registry.mark_deleted(id);
            rejected += 1;
        } else if let Some(bean) = registry.get_mut(id) {
            bean.state = BeanState::Resolved;
        }
    }
    debug!(rejected, "Filter finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{filter, Wiring};
    use crate::{
        bean::{Bean, BeanState},
        bind::Converters,
        condition::{OnBean, OnExpression, OnMissingBean, OnProperty},
        dependency_resolver::{Lazy, Value},
        dynamic::DynamicRegistry,
        errors::{ConditionErrorKind, ResolveErrorKind},
        finalizer::run_destroyers,
        properties::Properties,
        registry::Registry,
    };

    use parking_lot::Mutex;
    use std::sync::Arc;
    use tracing_test::traced_test;

    trait Filter: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Auth;
    struct Gzip;

    impl Filter for Auth {
        fn name(&self) -> &'static str {
            "auth"
        }
    }

    impl Filter for Gzip {
        fn name(&self) -> &'static str {
            "gzip"
        }
    }

    struct Server {
        filters: Vec<Arc<dyn Filter>>,
        port: u16,
    }

    fn wire_all(registry: &mut Registry, props: &Properties) -> Result<(), ResolveErrorKind> {
        let converters = Converters::new();
        let dynamics = DynamicRegistry::new();
        filter(registry, props)?;
        Wiring::new(registry, props, &converters, &dynamics).wire_all()
    }

    #[test]
    #[traced_test]
    fn test_filter_rejection_cascades() {
        let props = Properties::from_pairs([("cache", "on")]).unwrap();
        let mut registry = Registry::new();
        let a = registry
            .register(Bean::object(1_u8).name("a").on(OnBean::new("b")).into_definition())
            .unwrap();
        let b = registry
            .register(Bean::object(2_u8).name("b").on(OnProperty::new("missing")).into_definition())
            .unwrap();
        let c = registry
            .register(Bean::object(3_u8).name("c").on(OnMissingBean::new("b")).into_definition())
            .unwrap();
        let d = registry
            .register(Bean::object(4_u8).name("d").on(OnProperty::new("cache")).into_definition())
            .unwrap();

        filter(&mut registry, &props).unwrap();
        let state = |id| registry.get(id).unwrap().state();
        assert_eq!(state(a), BeanState::Deleted);
        assert_eq!(state(b), BeanState::Deleted);
        assert_eq!(state(c), BeanState::Resolved);
        assert_eq!(state(d), BeanState::Resolved);
    }

    #[test]
    #[traced_test]
    fn test_filter_cascade() {
        let props = Properties::new();
        let mut registry = Registry::new();
        // Registered before the beans its condition depends on
        let fallback = registry
            .register(Bean::object(1_u8).name("fallback").on(OnMissingBean::new("client")).into_definition())
            .unwrap();
        let client = registry
            .register(Bean::object(2_u8).name("client").on(OnBean::new("pool")).into_definition())
            .unwrap();
        let pool = registry
            .register(Bean::object(3_u8).name("pool").on(OnProperty::new("pool.url")).into_definition())
            .unwrap();

        filter(&mut registry, &props).unwrap();
        let state = |id| registry.get(id).unwrap().state();
        assert_eq!(state(pool), BeanState::Deleted);
        assert_eq!(state(client), BeanState::Deleted);
        assert_eq!(state(fallback), BeanState::Resolved);
    }

    #[test]
    #[traced_test]
    fn test_filter_mutual_conditions() {
        let props = Properties::new();
        let mut registry = Registry::new();
        let first = registry
            .register(Bean::object(1_u8).name("first").on(OnMissingBean::new("second")).into_definition())
            .unwrap();
        let second = registry
            .register(Bean::object(2_u8).name("second").on(OnMissingBean::new("first")).into_definition())
            .unwrap();

        filter(&mut registry, &props).unwrap();
        let state = |id| registry.get(id).unwrap().state();
        assert_eq!(state(first), BeanState::Resolved);
        assert_eq!(state(second), BeanState::Deleted);
    }

    #[test]
    #[traced_test]
    fn test_filter_candidate_error() {
        let props = Properties::new();
        let mut registry = Registry::new();
        registry
            .register(Bean::object(1_u8).name("a").on(OnBean::new("b")).into_definition())
            .unwrap();
        registry
            .register(Bean::object(2_u8).name("b").on(OnExpression::new("${missing} > 1")).into_definition())
            .unwrap();

        assert!(matches!(
            filter(&mut registry, &props),
            Err(ResolveErrorKind::Condition { bean, source: ConditionErrorKind::Candidate { bean: candidate, .. } })
                if bean == "a" && candidate == "b"
        ));
    }

    #[test]
    #[traced_test]
    fn test_collection_injection_order() {
        let props = Properties::from_pairs([("port", "8080")]).unwrap();
        let mut registry = Registry::new();
        registry
            .register(
                Bean::provide(|filters: Vec<Arc<dyn Filter>>, port: Value<u16>| {
                    anyhow::Ok(Server {
                        filters,
                        port: port.into_inner(),
                    })
                })
                .name("server")
                .args(["", "${port}"])
                .into_definition(),
            )
            .unwrap();
        registry
            .register(Bean::object(Gzip).export::<dyn Filter>(|bean| bean).into_definition())
            .unwrap();
        registry
            .register(Bean::object(Auth).export::<dyn Filter>(|bean| bean).into_definition())
            .unwrap();

        wire_all(&mut registry, &props).unwrap();
        let server = registry.iter().next().unwrap().instance::<Server>().unwrap();
        assert_eq!(server.filters.iter().map(|filter| filter.name()).collect::<Vec<_>>(), ["gzip", "auth"]);
        assert_eq!(server.port, 8080);
    }

    #[test]
    #[traced_test]
    fn test_cycle_detected() {
        struct A;
        struct B;

        let props = Properties::new();
        let mut registry = Registry::new();
        registry
            .register(Bean::provide(|_: Arc<B>| anyhow::Ok(A)).name("a").into_definition())
            .unwrap();
        registry
            .register(Bean::provide(|_: Arc<A>| anyhow::Ok(B)).name("b").into_definition())
            .unwrap();

        assert!(matches!(
            wire_all(&mut registry, &props),
            Err(ResolveErrorKind::CyclicDependency { path }) if path == ["a", "b", "a"]
        ));
    }

    #[test]
    #[traced_test]
    fn test_lazy_cycle() {
        struct A {
            b: Arc<B>,
        }
        struct B {
            a: Lazy<A>,
        }

        let props = Properties::new();
        let mut registry = Registry::new();
        registry
            .register(Bean::provide(|b: Arc<B>| anyhow::Ok(A { b })).into_definition())
            .unwrap();
        registry
            .register(
                Bean::provide(|a: Lazy<A>| {
                    assert!(!a.is_ready());
                    anyhow::Ok(B { a })
                })
                .into_definition(),
            )
            .unwrap();

        wire_all(&mut registry, &props).unwrap();
        let a = registry.iter().next().unwrap().instance::<A>().unwrap();
        let a_again = a.b.a.get().unwrap();
        assert!(Arc::ptr_eq(&a, &a_again));
    }

    #[test]
    #[traced_test]
    fn test_init_and_destroy_order() {
        struct Db;
        struct Repo;

        let order = Arc::new(Mutex::new(Vec::new()));
        let props = Properties::new();
        let mut registry = Registry::new();
        let log = |event: &'static str| {
            let order = order.clone();
            move || order.lock().push(event)
        };

        let (init_repo, destroy_repo) = (log("init repo"), log("destroy repo"));
        registry
            .register(
                Bean::provide(|_: Arc<Db>| anyhow::Ok(Repo))
                    .init(move |_| {
                        init_repo();
                        anyhow::Ok(())
                    })
                    .destroy(move |_: Arc<Repo>| destroy_repo())
                    .into_definition(),
            )
            .unwrap();
        let (init_db, destroy_db) = (log("init db"), log("destroy db"));
        registry
            .register(
                Bean::object(Db)
                    .init(move |_| {
                        init_db();
                        anyhow::Ok(())
                    })
                    .destroy(move |_: Arc<Db>| destroy_db())
                    .into_definition(),
            )
            .unwrap();

        let converters = Converters::new();
        let dynamics = DynamicRegistry::new();
        filter(&mut registry, &props).unwrap();
        let mut wiring = Wiring::new(&mut registry, &props, &converters, &dynamics);
        wiring.wire_all().unwrap();
        run_destroyers(wiring.take_destroyers());

        assert_eq!(*order.lock(), ["init db", "init repo", "destroy repo", "destroy db"]);
    }

    #[test]
    #[traced_test]
    fn test_errors() {
        struct Missing;

        let props = Properties::new();
        let mut registry = Registry::new();
        registry
            .register(Bean::provide(|_: Arc<Missing>| anyhow::Ok(1_u8)).into_definition())
            .unwrap();
        assert!(matches!(wire_all(&mut registry, &props), Err(ResolveErrorKind::NotFound { .. })));

        let mut registry = Registry::new();
        registry
            .register(Bean::provide(|| Err::<u8, _>(anyhow::anyhow!("boom"))).name("broken").into_definition())
            .unwrap();
        assert!(matches!(
            wire_all(&mut registry, &props),
            Err(ResolveErrorKind::FactoryReturnedError { bean, .. }) if bean == "broken"
        ));

        let mut registry = Registry::new();
        registry.register(Bean::object(1_u8).name("a").into_definition()).unwrap();
        registry.register(Bean::object(2_u8).name("b").into_definition()).unwrap();
        registry
            .register(Bean::provide(|_: Arc<u8>| anyhow::Ok("x")).into_definition())
            .unwrap();
        assert!(matches!(wire_all(&mut registry, &props), Err(ResolveErrorKind::Ambiguous { .. })));

        let mut registry = Registry::new();
        registry
            .register(Bean::provide(|port: Value<u16>| anyhow::Ok(*port)).args(["${port}"]).into_definition())
            .unwrap();
        assert!(matches!(wire_all(&mut registry, &props), Err(ResolveErrorKind::Bind { .. })));
    }

    #[test]
    #[traced_test]
    fn test_optional_and_named() {
        struct Missing;

        let props = Properties::new();
        let mut registry = Registry::new();
        registry.register(Bean::object(1_u8).name("one").into_definition()).unwrap();
        registry.register(Bean::object(2_u8).name("two").into_definition()).unwrap();
        registry
            .register(
                Bean::provide(|missing: Option<Arc<Missing>>, two: Arc<u8>| {
                    assert!(missing.is_none());
                    anyhow::Ok(u16::from(*two))
                })
                .args(["missing?", "two"])
                .into_definition(),
            )
            .unwrap();

        wire_all(&mut registry, &props).unwrap();
        let val = registry.iter().last().unwrap().instance::<u16>().unwrap();
        assert_eq!(*val, 2);
    }
}
