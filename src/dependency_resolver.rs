use std::{
    fmt,
    ops::Deref,
    sync::{Arc, OnceLock},
};

use crate::{bind::Bind, dynamic::Dynamic, errors::ResolveErrorKind, wiring::Wiring};

/// A factory parameter or component field the container knows how to fill.
///
/// `selector` is the per-parameter string: a bean selector (`name`, `name?`, `tag:<expr>`)
/// for bean references, a `${...}` tag for values.
pub trait DependencyResolver: Sized {
    /// # Errors
    /// Returns [`ResolveErrorKind`] if the dependency can't be resolved.
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind>;
}

/// A single bean of type (or export) `T`.
impl<T: ?Sized + Send + Sync + 'static> DependencyResolver for Arc<T> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.get::<T>(selector)
    }
}

/// A single bean, `None` if there are no candidates.
impl<T: ?Sized + Send + Sync + 'static> DependencyResolver for Option<Arc<T>> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.get_optional::<T>(selector)
    }
}

/// Every candidate, in registration order.
impl<T: ?Sized + Send + Sync + 'static> DependencyResolver for Vec<Arc<T>> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.collect::<T>(selector)
    }
}

pub struct Inject<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized + Send + Sync + 'static> DependencyResolver for Inject<T> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.get::<T>(selector).map(Self)
    }
}

impl<T: ?Sized> Deref for Inject<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct InjectAll<T: ?Sized>(pub Vec<Arc<T>>);

impl<T: ?Sized + Send + Sync + 'static> DependencyResolver for InjectAll<T> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.collect::<T>(selector).map(Self)
    }
}

impl<T: ?Sized> Deref for InjectAll<T> {
    type Target = [Arc<T>];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A property value bound at wiring time. The selector is the bind tag, `${key:=default}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value<T>(pub T);

impl<T: Bind> DependencyResolver for Value<T> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.bind::<T>(selector.unwrap_or_default(), None).map(Self)
    }
}

impl<T> Value<T> {
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Value<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Bind> DependencyResolver for Dynamic<T> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.bind::<Self>(selector.unwrap_or_default(), None)
    }
}

/// A reference filled once its target is wired, used to close a dependency cycle.
///
/// The target may still be wiring when the dependent is constructed, so [`Lazy::get`]
/// returns `None` until the target is ready.
pub struct Lazy<T: ?Sized> {
    cell: Arc<OnceLock<Arc<T>>>,
}

impl<T: ?Sized> Lazy<T> {
    pub(crate) fn empty() -> Self {
        Self {
            cell: Arc::new(OnceLock::new()),
        }
    }

    pub(crate) fn fill(&self, val: Arc<T>) {
        let _ = self.cell.set(val);
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: ?Sized> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self { cell: self.cell.clone() }
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").field("ready", &self.is_ready()).finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> DependencyResolver for Lazy<T> {
    #[inline]
    fn resolve(wiring: &mut Wiring<'_>, selector: Option<&str>) -> Result<Self, ResolveErrorKind> {
        wiring.lazy::<T>(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyResolver, Inject, InjectAll, Lazy, Value};
    use crate::Dynamic;

    use std::sync::Arc;

    trait Plugin: Send + Sync {}

    #[test]
    #[allow(dead_code)]
    fn test_dependency_resolver_impls() {
        fn resolver<T: DependencyResolver>() {}
        fn resolver_with_dep<Dep: Send + Sync + 'static>() {
            resolver::<Arc<Dep>>();
            resolver::<Option<Arc<Dep>>>();
            resolver::<Vec<Arc<Dep>>>();
            resolver::<Lazy<Dep>>();
            resolver::<Inject<Dep>>();
            resolver::<InjectAll<Dep>>();
        }
        resolver::<Arc<dyn Plugin>>();
        resolver::<Vec<Arc<dyn Plugin>>>();
        resolver::<Value<u16>>();
        resolver::<Dynamic<Vec<String>>>();
    }

    #[test]
    fn test_lazy() {
        let lazy = Lazy::<str>::empty();
        let other = lazy.clone();
        assert!(lazy.get().is_none());

        other.fill(Arc::from("ready"));
        other.fill(Arc::from("ignored"));
        assert_eq!(&*lazy.get().unwrap(), "ready");
        assert!(lazy.is_ready());
    }
}
