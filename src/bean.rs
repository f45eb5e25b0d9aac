mod definition;
mod selector;

pub use definition::{AnyArc, BeanDefinition, BeanId};
pub use selector::BeanSelector;

pub(crate) use definition::{Caster, Constructor, DestroyFn, FactoryFn, InitFn};

use std::{
    any::{type_name, Any, TypeId},
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    condition::Condition,
    errors::ResolveErrorKind,
    finalizer::Finalizer,
    instantiator::Instantiator,
    wiring::Wiring,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeanState {
    Unresolved,
    /// Conditions are being evaluated
    Resolving,
    Resolved,
    Wiring,
    Wired,
    /// Rejected by a condition or a configurer
    Deleted,
}

/// A type the container can construct field by field, usually through `#[derive(Component)]`.
pub trait Component: Sized + Send + Sync + 'static {
    /// # Errors
    /// Returns [`ResolveErrorKind`] if a dependency or a value can't be resolved.
    fn create(wiring: &mut Wiring<'_>) -> Result<Self, ResolveErrorKind>;
}

/// Typed builder of a [`BeanDefinition`].
///
/// ```ignore
/// container.register(
///     Bean::provide(|repo: Arc<Repo>| anyhow::Ok(Service::new(repo)))
///         .name("service")
///         .export::<dyn Handler>(|bean| bean)
///         .on(OnProperty::new("service.enabled").having_value("true")),
/// )?;
/// ```
#[must_use]
pub struct Bean<T> {
    def: BeanDefinition,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Bean<T> {
    fn with_constructor(constructor: Constructor) -> Self {
        Self {
            def: BeanDefinition::new::<T>(constructor),
            _marker: PhantomData,
        }
    }

    /// A pre-built value.
    pub fn object(value: T) -> Self {
        Self::with_constructor(Constructor::Object(Arc::new(value)))
    }

    /// A factory whose parameters are resolved by the container.
    /// Per-parameter selectors and value tags are set with [`Self::args`].
    pub fn provide<Inst, Deps>(instantiator: Inst) -> Self
    where
        Inst: Instantiator<Deps, Provides = T>,
    {
        let factory: FactoryFn = Arc::new(move |wiring: &mut Wiring<'_>, args: &[String]| {
            let val = instantiator.instantiate(wiring, args)?;
            Ok(Arc::new(val) as AnyArc)
        });
        Self::with_constructor(Constructor::Factory(factory))
    }

    /// A factory whose first parameter is the receiver bean chosen by `receiver`.
    pub fn method<Inst, Deps>(receiver: impl Into<String>, instantiator: Inst) -> Self
    where
        Inst: Instantiator<Deps, Provides = T>,
    {
        let mut bean = Self::provide(instantiator);
        bean.def.args.push(receiver.into());
        bean
    }

    /// A type built field by field through [`Component::create`].
    pub fn component() -> Self
    where
        T: Component,
    {
        let factory: FactoryFn = Arc::new(|wiring: &mut Wiring<'_>, _args: &[String]| {
            let val = T::create(wiring)?;
            Ok(Arc::new(val) as AnyArc)
        });
        Self::with_constructor(Constructor::Factory(factory))
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.def.name = Some(name.into());
        self
    }

    /// Makes the bean selectable as `I`, usually a trait object: `.export::<dyn Filter>(|bean| bean)`.
    pub fn export<I>(mut self, cast: impl Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let caster: Caster = Arc::new(move |instance: AnyArc| {
            instance
                .downcast::<T>()
                .ok()
                .map(|val| Box::new(cast(val)) as Box<dyn Any>)
        });
        self.def.add_export(TypeId::of::<I>(), type_name::<I>(), caster);
        self
    }

    /// Adds a condition. All conditions of a bean must match for it to be wired.
    pub fn on(mut self, condition: impl Condition + 'static) -> Self {
        self.def.conditions.push(Box::new(condition));
        self
    }

    /// Beans chosen by `selector` are wired before this one. A `?` suffix allows no match.
    pub fn depends_on(mut self, selector: impl Into<String>) -> Self {
        self.def.depends_on.push(selector.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.def.tags.push(tag.into());
        self
    }

    /// Wins over other candidates when a single bean of a type is requested.
    pub fn primary(mut self) -> Self {
        self.def.primary = true;
        self
    }

    /// Per-parameter selectors of the factory, in order: `${...}` strings are value tags,
    /// anything else is a bean selector. An empty string keeps the default.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Called once the bean is constructed, before dependents see it.
    pub fn init<F, E>(mut self, init: F) -> Self
    where
        F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        let init: InitFn = Arc::new(move |instance: &AnyArc| match instance.downcast_ref::<T>() {
            Some(val) => init(val).map_err(Into::into),
            None => Ok(()),
        });
        self.def.init = Some(init);
        self
    }

    /// Called on shutdown, in reverse order of initialization.
    pub fn destroy<Fin>(mut self, finalizer: Fin) -> Self
    where
        Fin: Finalizer<T> + Send + Sync,
    {
        let destroy: DestroyFn = Arc::new(move |instance: AnyArc| {
            if let Ok(val) = instance.downcast::<T>() {
                finalizer.finalize(val);
            }
        });
        self.def.destroy = Some(destroy);
        self
    }

    #[inline]
    #[must_use]
    pub fn definition(&self) -> &BeanDefinition {
        &self.def
    }

    #[inline]
    #[must_use]
    pub fn into_definition(self) -> BeanDefinition {
        self.def
    }
}
