use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error};

use super::{Layer, LayerKind, LayeredProperties, PropValue, Properties, PropertyReader};
use crate::errors::PropertyErrorKind;

const API_LAYER: &str = "api";

/// The container's property store: an atomically swapped layered snapshot plus the layer of explicit API writes.
///
/// Readers take a [`Self::snapshot`] and always observe a consistent view.
/// After [`Self::freeze`] direct writes fail and only reloads publish new snapshots.
pub struct PropertyStore {
    current: ArcSwap<LayeredProperties>,
    api: Mutex<Properties>,
    frozen: AtomicBool,
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new(LayeredProperties::new())
    }
}

impl PropertyStore {
    #[must_use]
    pub fn new(layers: LayeredProperties) -> Self {
        Self {
            current: ArcSwap::from_pointee(layers),
            api: Mutex::new(Properties::new()),
            frozen: AtomicBool::new(false),
        }
    }

    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<LayeredProperties> {
        self.current.load_full()
    }

    /// Writes `val` to the API layer, the highest priority one.
    ///
    /// # Errors
    /// - Returns [`PropertyErrorKind::Frozen`] once the store is frozen
    /// - Returns [`PropertyErrorKind::Conflict`] or [`PropertyErrorKind::InvalidKey`] from [`Properties::set`]
    pub fn set(&self, key: &str, val: impl Into<PropValue>) -> Result<(), PropertyErrorKind> {
        if self.is_frozen() {
            let err = PropertyErrorKind::Frozen { key: key.to_owned() };
            error!("{}", err);
            return Err(err);
        }

        let mut api = self.api.lock();
        api.set(key, val)?;

        let mut next = (*self.current.load_full()).clone();
        next.replace_kind(Layer::new(API_LAYER, LayerKind::Api, api.clone()));
        self.current.store(Arc::new(next));
        debug!(key, "Property set");
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.current.load().get(key).map(ToOwned::to_owned)
    }

    #[inline]
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.current.load().has(key)
    }

    #[inline]
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.current.load().keys()
    }

    /// # Errors
    /// See [`PropertyReader::resolve`].
    #[inline]
    pub fn resolve(&self, input: &str) -> Result<String, PropertyErrorKind> {
        self.current.load().resolve(input)
    }

    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            debug!("Property store frozen");
        }
    }

    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Builds the snapshot that would replace the current one: `layers` with API writes kept on top.
    #[must_use]
    pub fn stage(&self, mut layers: LayeredProperties) -> LayeredProperties {
        let api = self.api.lock();
        layers.remove_kind(LayerKind::Api);
        if !api.is_empty() {
            layers.push(Layer::new(API_LAYER, LayerKind::Api, api.clone()));
        }
        layers
    }

    /// Atomically replaces the current snapshot, returning the previous one.
    pub fn publish(&self, next: Arc<LayeredProperties>) -> Arc<LayeredProperties> {
        let prev = self.current.swap(next);
        debug!("Property snapshot published");
        prev
    }
}
