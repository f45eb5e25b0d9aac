use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{
    any::type_name,
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};
use tracing::{debug, info_span, warn};

use crate::{
    bind::{bind_value, Bind, BindContext, BindParam, Converters},
    errors::BindErrorKind,
    properties::{is_descendant_or_self, LayeredProperties, PropertyStore},
};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Cell<T> {
    value: ArcSwap<T>,
    param: Option<BindParam>,
    callbacks: Mutex<Vec<Callback<T>>>,
}

/// A value re-bound from the property store on every reload that touches its key.
///
/// Readers see either the previous or the next value, never a partial one.
pub struct Dynamic<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for Dynamic<T> {
    fn clone(&self) -> Self {
        Self { cell: self.cell.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for Dynamic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dynamic")
            .field("key", &self.key())
            .field("value", &self.get())
            .finish()
    }
}

impl<T> Dynamic<T> {
    /// A value that isn't bound to any key and never changes on reload.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_param(value, None)
    }

    fn with_param(value: T, param: Option<BindParam>) -> Self {
        Self {
            cell: Arc::new(Cell {
                value: ArcSwap::from_pointee(value),
                param,
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        self.cell.value.load_full()
    }

    /// The key the value is bound to, `None` for unbound values.
    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.cell.param.as_ref().map(|param| param.key.as_str())
    }

    /// Registers `callback`, called with the new value after every successful re-bind.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.cell.callbacks.lock().push(Arc::new(callback));
    }
}

impl<T: Bind> Bind for Dynamic<T> {
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        let value = bind_value::<T>(ctx, param)?;
        let dynamic = Self::with_param(value, Some(param.clone()));
        if let Some(registry) = ctx.dynamics() {
            registry.register(dynamic.cell.clone());
        }
        Ok(dynamic)
    }
}

/// A registered dynamic value, erased over its type.
pub trait Refreshable: Send + Sync {
    fn key(&self) -> &str;

    fn type_name(&self) -> &'static str;

    /// Re-binds from `ctx`, keeping the previous value on error.
    ///
    /// # Errors
    /// Returns [`BindErrorKind`] if binding the new value fails.
    fn refresh(&self, ctx: &BindContext<'_>) -> Result<(), BindErrorKind>;
}

impl<T: Bind> Refreshable for Cell<T> {
    fn key(&self) -> &str {
        self.param.as_ref().map_or("", |param| param.key.as_str())
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn refresh(&self, ctx: &BindContext<'_>) -> Result<(), BindErrorKind> {
        let Some(param) = &self.param else {
            return Ok(());
        };
        let next = Arc::new(bind_value::<T>(ctx, param)?);
        self.value.store(next.clone());

        let callbacks = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(&next);
        }
        Ok(())
    }
}

/// Outcome of a reload.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Keys added, removed or changed by the reload.
    pub changed: BTreeSet<String>,
    /// Keys of the values re-bound successfully, in registration order.
    pub refreshed: Vec<String>,
    /// Values that kept their previous state.
    pub errors: Vec<BindErrorKind>,
}

impl RefreshReport {
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Keys present in only one of the maps, plus keys whose values differ.
#[must_use]
pub fn changed_keys(prev: &BTreeMap<String, String>, next: &BTreeMap<String, String>) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (key, val) in prev {
        if next.get(key) != Some(val) {
            changed.insert(key.clone());
        }
    }
    for key in next.keys() {
        if !prev.contains_key(key) {
            changed.insert(key.clone());
        }
    }
    changed
}

/// Every dynamic value bound by the container, in registration order.
#[derive(Default)]
pub struct DynamicRegistry {
    values: Mutex<Vec<Arc<dyn Refreshable>>>,
}

impl DynamicRegistry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, value: Arc<dyn Refreshable>) {
        debug!(key = value.key(), ty = value.type_name(), "Dynamic value registered");
        self.values.lock().push(value);
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Publishes `layers` (with API writes kept) as the store's snapshot and re-binds every value
    /// whose key is a changed key or an ancestor of one.
    ///
    /// Binding errors don't stop the refresh: the failed value keeps its state and the error is reported.
    pub fn refresh(&self, store: &PropertyStore, converters: &Converters, layers: LayeredProperties) -> RefreshReport {
        let span = info_span!("refresh");
        let _guard = span.enter();

        let prev = store.snapshot();
        let next = Arc::new(store.stage(layers));
        let changed = changed_keys(&prev.to_map(), &next.to_map());

        let dirty = self
            .values
            .lock()
            .iter()
            .filter(|value| changed.iter().any(|key| is_descendant_or_self(key, value.key())))
            .cloned()
            .collect::<Vec<_>>();
        debug!(changed = changed.len(), dirty = dirty.len(), "Changes computed");

        store.publish(next.clone());

        let ctx = BindContext::new(&*next, converters);
        let mut report = RefreshReport {
            changed,
            ..RefreshReport::default()
        };
        for value in dirty {
            match value.refresh(&ctx) {
                Ok(()) => {
                    debug!(key = value.key(), "Dynamic value refreshed");
                    report.refreshed.push(value.key().to_owned());
                }
                Err(err) => {
                    warn!(key = value.key(), %err, "Dynamic value kept its previous state");
                    report.errors.push(err);
                }
            }
        }
        report
    }
}
