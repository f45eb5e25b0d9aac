use parking_lot::Mutex;
use std::{any::type_name, mem, sync::Arc};
use tracing::{debug, error, info, info_span};

use crate::{
    bean::{Bean, BeanDefinition, BeanId, BeanSelector, BeanState},
    bind::{bind_tag, Bind, BindContext, Converters},
    boot::BootConfig,
    condition::{matches_all, ConditionContext},
    configurer::{order, Configurer, Declarations},
    dynamic::{DynamicRegistry, RefreshReport},
    errors::{BindErrorKind, ContainerErrorKind, Error, ResolveErrorKind},
    finalizer::{run_destroyers, Destroyer},
    properties::{LayeredProperties, PropertyReader, PropertyStore},
    registry::{describe, Registry},
    wiring::{filter, Wiring},
};

/// Lifecycle of a [`Container`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Created,
    Configuring,
    Resolving,
    Wiring,
    Running,
    Stopping,
    Stopped,
}

/// The IoC container: beans, configurers, the property store and the dynamic values bound from it.
///
/// Beans and configurers are registered while the container is [`LifecycleState::Created`] or
/// [`LifecycleState::Configuring`]. [`Self::refresh`] freezes the properties, filters beans by their
/// conditions, runs configurers and wires every accepted bean.
///
/// The container is cheap to clone, every clone shares the same state.
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::with_properties(LayeredProperties::new())
    }
}

impl Container {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates container with already assembled properties
    #[must_use]
    pub fn with_properties(layers: LayeredProperties) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                state: Mutex::new(LifecycleState::Created),
                registry: Mutex::new(Registry::new()),
                configurers: Mutex::new(Vec::new()),
                converters: Mutex::new(Converters::new()),
                boot: Mutex::new(None),
                destroyers: Mutex::new(Vec::new()),
                props: PropertyStore::new(layers),
                dynamics: DynamicRegistry::new(),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.lock()
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &PropertyStore {
        &self.inner.props
    }

    /// Loads every property source described by `boot`. API writes made before are kept.
    ///
    /// # Errors
    /// - Returns [`ContainerErrorKind::Frozen`] once resolving started
    /// - Returns [`crate::errors::PropertyErrorKind`] if a source can't be loaded
    pub fn load(&self, boot: BootConfig) -> Result<(), Error> {
        self.check_configurable("load")?;

        let layers = boot.assemble()?;
        self.inner.props.publish(Arc::new(self.inner.props.stage(layers)));
        *self.inner.boot.lock() = Some(boot);
        self.advance(LifecycleState::Configuring);
        Ok(())
    }

    /// # Errors
    /// - Returns [`ContainerErrorKind::Frozen`] once resolving started
    /// - Returns [`ContainerErrorKind::Duplicate`] if a bean with the same name and type is registered
    pub fn register<T: Send + Sync + 'static>(&self, bean: Bean<T>) -> Result<BeanId, ContainerErrorKind> {
        self.check_configurable("register")?;
        self.inner.registry.lock().register(bean.into_definition())
    }

    /// # Errors
    /// Returns [`ContainerErrorKind::Frozen`] once resolving started.
    pub fn configurer(&self, configurer: Configurer) -> Result<(), ContainerErrorKind> {
        self.check_configurable("configurer")?;
        debug!(name = configurer.name(), "Configurer registered");
        self.inner.configurers.lock().push(configurer);
        Ok(())
    }

    /// Registers a string converter for `T`, consulted before `T`'s own [`Bind`] implementation.
    ///
    /// # Errors
    /// Returns [`ContainerErrorKind::Frozen`] once resolving started.
    pub fn converter<T, F>(&self, convert: F) -> Result<(), ContainerErrorKind>
    where
        T: 'static,
        F: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.check_configurable("converter")?;
        self.inner.converters.lock().register(convert);
        Ok(())
    }

    /// Binds `T` from the current property snapshot.
    /// [`crate::Dynamic`] values bound here are refreshed on reload.
    ///
    /// # Errors
    /// Returns [`BindErrorKind`] if the tag is malformed or binding fails.
    pub fn bind<T: Bind>(&self, tag: &str) -> Result<T, BindErrorKind> {
        let snapshot = self.inner.props.snapshot();
        let converters = self.inner.converters.lock().clone();
        let ctx = BindContext::new(&*snapshot, &converters).with_dynamics(&self.inner.dynamics);
        bind_tag(&ctx, tag)
    }

    /// Resolves and wires every bean. Calling it on a running container is a no-op.
    ///
    /// On failure the beans initialized so far are destroyed in reverse order
    /// and the container is stopped.
    ///
    /// # Errors
    /// - Returns [`ContainerErrorKind::InvalidState`] if the container is stopping or stopped
    /// - Returns [`ResolveErrorKind`] raised by filtering, configurers or wiring
    pub fn refresh(&self) -> Result<(), Error> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                LifecycleState::Created | LifecycleState::Configuring => *state = LifecycleState::Resolving,
                LifecycleState::Running => {
                    debug!("Container already refreshed");
                    return Ok(());
                }
                other => {
                    let err = ContainerErrorKind::InvalidState {
                        operation: "refresh",
                        state: other,
                    };
                    error!("{}", err);
                    return Err(err.into());
                }
            }
        }

        let span = info_span!("refresh");
        let _guard = span.enter();

        self.inner.props.freeze();
        let snapshot = self.inner.props.snapshot();
        let converters = self.inner.converters.lock().clone();
        let mut registry = mem::take(&mut *self.inner.registry.lock());
        let configurers = mem::take(&mut *self.inner.configurers.lock());

        let mut destroyers = Vec::new();
        let result = self.resolve(&mut registry, &configurers, &*snapshot, &converters, &mut destroyers);

        *self.inner.registry.lock() = registry;
        *self.inner.configurers.lock() = configurers;
        self.inner.destroyers.lock().extend(destroyers);

        match result {
            Ok(()) => {
                self.advance(LifecycleState::Running);
                info!(beans = self.inner.registry.lock().live().count(), "Container is running");
                Ok(())
            }
            Err(err) => {
                self.close();
                Err(err.into())
            }
        }
    }

    fn resolve(
        &self,
        registry: &mut Registry,
        configurers: &[Configurer],
        props: &dyn PropertyReader,
        converters: &Converters,
        destroyers: &mut Vec<Destroyer>,
    ) -> Result<(), ResolveErrorKind> {
        filter(registry, props)?;

        let active = {
            let ctx = ConditionContext::new(props, registry);
            let mut active = Vec::with_capacity(configurers.len());
            for configurer in configurers {
                let matched = matches_all(&configurer.conditions, &ctx).map_err(|source| {
                    let err = ResolveErrorKind::Condition {
                        bean: configurer.name().to_owned(),
                        source,
                    };
                    error!("{}", err);
                    err
                })?;
                if matched {
                    active.push(configurer);
                } else {
                    debug!(name = configurer.name(), "Configurer skipped");
                }
            }
            active
        };

        if !active.is_empty() {
            let sorted = order(&active)?;
            let mut declarations = Declarations::default();
            {
                let mut wiring = Wiring::new(registry, props, converters, &self.inner.dynamics);
                let result = sorted
                    .iter()
                    .try_for_each(|pos| active[*pos].run(&mut declarations, &mut wiring));
                destroyers.extend(wiring.take_destroyers());
                result?;
            }
            if !declarations.is_empty() {
                apply(registry, declarations)?;
                filter(registry, props)?;
            }
        }

        self.advance(LifecycleState::Wiring);
        let mut wiring = Wiring::new(registry, props, converters, &self.inner.dynamics);
        let result = wiring.wire_all();
        destroyers.extend(wiring.take_destroyers());
        result
    }

    /// The single wired bean selectable as `T`.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NotFound`] if there is none
    /// - Returns [`ResolveErrorKind::Ambiguous`] if there are several and none is primary
    pub fn get<T: ?Sized + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.lookup::<T>(None)
    }

    /// The wired bean named `name`, selectable as `T`.
    ///
    /// # Errors
    /// See [`Self::get`].
    pub fn get_named<T: ?Sized + 'static>(&self, name: &str) -> Result<Arc<T>, ResolveErrorKind> {
        self.lookup::<T>(Some(name))
    }

    fn lookup<T: ?Sized + 'static>(&self, name: Option<&str>) -> Result<Arc<T>, ResolveErrorKind> {
        let span = info_span!("get", dependency = type_name::<T>());
        let _guard = span.enter();

        let registry = self.inner.registry.lock();
        let selector = name.map(BeanSelector::name);
        let candidates = wired(&registry, registry.candidates::<T>(selector.as_ref()));
        let found = registry
            .pick_one(&candidates, &describe::<T>(name))?
            .and_then(|id| registry.get(id))
            .and_then(|bean| bean.instance::<T>());
        found.ok_or_else(|| {
            let err = ResolveErrorKind::NotFound {
                selector: describe::<T>(name),
            };
            error!("{}", err);
            err
        })
    }

    /// Every wired bean selectable as `T`, in registration order.
    #[must_use]
    pub fn collect<T: ?Sized + 'static>(&self) -> Vec<Arc<T>> {
        self.collect_named::<T>().into_iter().map(|(_, bean)| bean).collect()
    }

    pub(crate) fn collect_named<T: ?Sized + 'static>(&self) -> Vec<(String, Arc<T>)> {
        let registry = self.inner.registry.lock();
        wired(&registry, registry.candidates::<T>(None))
            .into_iter()
            .filter_map(|id| registry.get(id))
            .filter_map(|bean| bean.instance::<T>().map(|instance| (bean.name().to_owned(), instance)))
            .collect()
    }

    /// Ids of the live beans chosen by `selector`.
    #[must_use]
    pub fn find(&self, selector: &BeanSelector) -> Vec<BeanId> {
        self.inner.registry.lock().find(selector).into_iter().map(BeanDefinition::id).collect()
    }

    /// Calls `f` with the registry. Must not be called from a factory or a condition.
    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.inner.registry.lock())
    }

    /// Re-reads every property source of the loaded [`BootConfig`] and refreshes the dynamic values.
    ///
    /// # Errors
    /// - Returns [`ContainerErrorKind::NoBootConfig`] if [`Self::load`] was never called
    /// - Returns [`crate::errors::PropertyErrorKind`] if a source can't be loaded, the current snapshot is kept
    pub fn reload(&self) -> Result<RefreshReport, Error> {
        let Some(boot) = self.inner.boot.lock().clone() else {
            let err = ContainerErrorKind::NoBootConfig;
            error!("{}", err);
            return Err(err.into());
        };
        let layers = boot.assemble()?;
        Ok(self.refresh_with(layers))
    }

    /// Replaces the property layers (API writes are kept) and refreshes the dynamic values whose keys changed.
    /// Values that fail to bind keep their previous state and are reported.
    pub fn refresh_with(&self, layers: LayeredProperties) -> RefreshReport {
        let converters = self.inner.converters.lock().clone();
        let report = self.inner.dynamics.refresh(&self.inner.props, &converters, layers);
        info!(
            changed = report.changed.len(),
            refreshed = report.refreshed.len(),
            errors = report.errors.len(),
            "Properties reloaded"
        );
        report
    }

    /// Runs the destroyers of every wired bean in reverse order and stops the container.
    /// A second call is a no-op.
    pub fn close(&self) {
        if !self.begin_stop() {
            return;
        }
        self.run_destroyers();
        self.mark_stopped();
    }

    /// Moves to [`LifecycleState::Stopping`], `false` if the container is already stopping or stopped.
    pub(crate) fn begin_stop(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state >= LifecycleState::Stopping {
            debug!("Container already stopping");
            return false;
        }
        *state = LifecycleState::Stopping;
        debug!("Container stopping");
        true
    }

    pub(crate) fn run_destroyers(&self) {
        let destroyers = mem::take(&mut *self.inner.destroyers.lock());
        run_destroyers(destroyers);
    }

    pub(crate) fn mark_stopped(&self) {
        self.advance(LifecycleState::Stopped);
        info!("Container stopped");
    }

    fn advance(&self, next: LifecycleState) {
        let mut state = self.inner.state.lock();
        if *state < next {
            debug!(from = ?*state, to = ?next, "Lifecycle state changed");
            *state = next;
        }
    }

    fn check_configurable(&self, operation: &'static str) -> Result<(), ContainerErrorKind> {
        if *self.inner.state.lock() <= LifecycleState::Configuring {
            return Ok(());
        }
        let err = ContainerErrorKind::Frozen { operation };
        error!("{}", err);
        Err(err)
    }
}

fn wired(registry: &Registry, candidates: Vec<BeanId>) -> Vec<BeanId> {
    candidates
        .into_iter()
        .filter(|id| registry.get(*id).is_some_and(|bean| bean.state() == BeanState::Wired))
        .collect()
}

/// Registers the beans declared by configurers and deletes the excluded ones.
fn apply(registry: &mut Registry, declarations: Declarations) -> Result<(), ResolveErrorKind> {
    let (beans, excluded) = declarations.into_parts();
    for def in beans {
        registry.register(def)?;
    }
    for selector in excluded {
        let ids = registry.find(&selector).into_iter().map(BeanDefinition::id).collect::<Vec<_>>();
        debug!(%selector, beans = ids.len(), "Beans excluded");
        for id in ids {
            registry.mark_deleted(id);
        }
    }
    Ok(())
}

pub(crate) struct ContainerInner {
    state: Mutex<LifecycleState>,
    registry: Mutex<Registry>,
    configurers: Mutex<Vec<Configurer>>,
    converters: Mutex<Converters>,
    boot: Mutex<Option<BootConfig>>,
    destroyers: Mutex<Vec<Destroyer>>,
    props: PropertyStore,
    dynamics: DynamicRegistry,
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        let destroyers = mem::take(self.destroyers.get_mut());
        if !destroyers.is_empty() {
            run_destroyers(destroyers);
            debug!("Container closed on drop");
        }
    }
}
