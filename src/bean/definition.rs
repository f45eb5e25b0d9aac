use std::{
    any::{type_name, Any, TypeId},
    fmt,
    sync::Arc,
};

use super::{BeanSelector, BeanState};
use crate::{condition::Condition, errors::ResolveErrorKind, wiring::Wiring};

/// A wired bean instance, erased over its type.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Up-casts an instance to `Arc<I>`, boxed, for one exported type `I`.
pub(crate) type Caster = Arc<dyn Fn(AnyArc) -> Option<Box<dyn Any>> + Send + Sync>;
pub(crate) type FactoryFn = Arc<dyn Fn(&mut Wiring<'_>, &[String]) -> Result<AnyArc, ResolveErrorKind> + Send + Sync>;
pub(crate) type InitFn = Arc<dyn Fn(&AnyArc) -> Result<(), anyhow::Error> + Send + Sync>;
pub(crate) type DestroyFn = Arc<dyn Fn(AnyArc) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BeanId(pub(crate) usize);

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
pub(crate) enum Constructor {
    Object(AnyArc),
    Factory(FactoryFn),
}

/// A declaration of how to obtain one bean, erased over its type.
pub struct BeanDefinition {
    pub(crate) id: BeanId,
    pub(crate) name: Option<String>,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) exports: Vec<TypeId>,
    pub(crate) export_names: Vec<&'static str>,
    pub(crate) casters: Vec<Caster>,
    pub(crate) constructor: Constructor,
    pub(crate) args: Vec<String>,
    pub(crate) conditions: Vec<Box<dyn Condition>>,
    pub(crate) depends_on: Vec<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) primary: bool,
    pub(crate) init: Option<InitFn>,
    pub(crate) destroy: Option<DestroyFn>,
    pub(crate) state: BeanState,
    pub(crate) instance: Option<AnyArc>,
}

impl BeanDefinition {
    pub(crate) fn new<T: Send + Sync + 'static>(constructor: Constructor) -> Self {
        let cast: Caster = Arc::new(|instance: AnyArc| instance.downcast::<T>().ok().map(|val| Box::new(val) as Box<dyn Any>));
        Self {
            id: BeanId(0),
            name: None,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            exports: vec![TypeId::of::<T>()],
            export_names: vec![type_name::<T>()],
            casters: vec![cast],
            constructor,
            args: Vec::new(),
            conditions: Vec::new(),
            depends_on: Vec::new(),
            tags: Vec::new(),
            primary: false,
            init: None,
            destroy: None,
            state: BeanState::Unresolved,
            instance: None,
        }
    }

    pub(crate) fn add_export(&mut self, type_id: TypeId, type_name: &'static str, cast: Caster) {
        if let Some(pos) = self.exports.iter().position(|id| *id == type_id) {
            self.casters[pos] = cast;
            return;
        }
        self.exports.push(type_id);
        self.export_names.push(type_name);
        self.casters.push(cast);
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> BeanId {
        self.id
    }

    /// The explicit name, or the generated one once registered.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.type_name)
    }

    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> BeanState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    #[inline]
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Names of the concrete type and every exported interface.
    #[inline]
    #[must_use]
    pub fn exports(&self) -> &[&'static str] {
        &self.export_names
    }

    #[inline]
    #[must_use]
    pub fn is_exporting(&self, type_id: TypeId) -> bool {
        self.exports.contains(&type_id)
    }

    #[inline]
    #[must_use]
    pub fn matches(&self, selector: &BeanSelector) -> bool {
        selector.matches(self.name(), &self.exports, &self.tags)
    }

    /// The wired instance as `Arc<I>`, if `I` is the bean's type or one of its exports.
    #[must_use]
    pub fn instance<I: ?Sized + 'static>(&self) -> Option<Arc<I>> {
        self.cast(self.instance.clone()?)
    }

    pub(crate) fn cast<I: ?Sized + 'static>(&self, instance: AnyArc) -> Option<Arc<I>> {
        let pos = self.exports.iter().position(|id| *id == TypeId::of::<I>())?;
        let boxed = (self.casters[pos])(instance)?;
        boxed.downcast::<Arc<I>>().ok().map(|val| *val)
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("type", &self.type_name)
            .field("exports", &self.export_names)
            .field("tags", &self.tags)
            .field("primary", &self.primary)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
