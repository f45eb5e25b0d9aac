use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use tracing::debug;

use super::BindParam;
use crate::{
    dynamic::DynamicRegistry,
    errors::BindErrorKind,
    expr::{eval_bool, Dollar, Value},
    properties::{NodeKind, PropertyReader},
};

type ConvertFn<T> = dyn Fn(&str) -> anyhow::Result<T> + Send + Sync;

/// User-registered string converters, consulted before the built-in parsing of any type.
#[derive(Clone, Default)]
pub struct Converters {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Converters {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T, F>(&mut self, convert: F)
    where
        T: 'static,
        F: Fn(&str) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let convert: Arc<ConvertFn<T>> = Arc::new(convert);
        self.map.insert(TypeId::of::<T>(), Arc::new(convert));
        debug!(ty = type_name::<T>(), "Converter registered");
    }

    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<Arc<ConvertFn<T>>> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|convert| convert.downcast_ref::<Arc<ConvertFn<T>>>())
            .cloned()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl core::fmt::Debug for Converters {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Converters").field("len", &self.map.len()).finish()
    }
}

/// Everything a [`super::Bind`] implementation reads from: a property snapshot, the converters
/// and, while the container is wiring, the registry collecting dynamic values.
#[derive(Clone, Copy)]
pub struct BindContext<'a> {
    reader: &'a dyn PropertyReader,
    converters: &'a Converters,
    dynamics: Option<&'a DynamicRegistry>,
}

impl<'a> BindContext<'a> {
    #[inline]
    #[must_use]
    pub fn new(reader: &'a dyn PropertyReader, converters: &'a Converters) -> Self {
        Self {
            reader,
            converters,
            dynamics: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_dynamics(mut self, dynamics: &'a DynamicRegistry) -> Self {
        self.dynamics = Some(dynamics);
        self
    }

    #[inline]
    #[must_use]
    pub fn reader(&self) -> &'a dyn PropertyReader {
        self.reader
    }

    #[inline]
    #[must_use]
    pub fn converters(&self) -> &'a Converters {
        self.converters
    }

    #[inline]
    #[must_use]
    pub fn dynamics(&self) -> Option<&'a DynamicRegistry> {
        self.dynamics
    }

    #[inline]
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.reader.has(key)
    }

    #[inline]
    #[must_use]
    pub fn kind(&self, key: &str) -> Option<NodeKind> {
        self.reader.kind(key)
    }

    #[inline]
    #[must_use]
    pub fn sub_keys(&self, key: &str) -> Vec<String> {
        self.reader.sub_keys(key)
    }

    /// The interpolated value at the param's key, falling back to its default.
    /// `None` if neither is present.
    ///
    /// # Errors
    /// Returns [`BindErrorKind::NotFound`] or [`BindErrorKind::Property`] if interpolation fails.
    pub fn value(&self, param: &BindParam) -> Result<Option<String>, BindErrorKind> {
        let raw = match (self.reader.get(&param.key), &param.default) {
            (Some(val), _) => val,
            (None, Some(default)) => default.as_str(),
            (None, None) => return Ok(None),
        };
        Ok(Some(self.reader.resolve(raw)?))
    }

    /// Like [`Self::value`], but absence is an error.
    ///
    /// # Errors
    /// Returns [`BindErrorKind::NotFound`] if neither the key nor a default is present.
    pub fn require(&self, param: &BindParam) -> Result<String, BindErrorKind> {
        self.value(param)?.ok_or_else(|| BindErrorKind::NotFound { key: param.key.clone() })
    }
}

/// Runs the param's validation expression with `raw` substituted for `$`.
///
/// # Errors
/// - Returns [`BindErrorKind::ValidationFailed`] if the expression is `false`
/// - Returns [`BindErrorKind::Expr`] if it can't be evaluated
pub fn validate(param: &BindParam, raw: &str) -> Result<(), BindErrorKind> {
    let Some(expr) = &param.validate else {
        return Ok(());
    };
    match eval_bool(expr, &Dollar(Value::infer(raw))) {
        Ok(true) => Ok(()),
        Ok(false) => Err(BindErrorKind::ValidationFailed {
            key: param.key.clone(),
            expr: expr.clone(),
            value: raw.to_owned(),
        }),
        Err(source) => Err(BindErrorKind::Expr {
            key: param.key.clone(),
            expr: expr.clone(),
            source,
        }),
    }
}
