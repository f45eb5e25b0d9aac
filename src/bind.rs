mod collections;
mod context;
mod param;
mod scalar;
mod time;

pub use context::{validate, BindContext, Converters};
pub use param::BindParam;
pub use time::split_format;

use std::any::type_name;
use tracing::{debug, error};

use crate::errors::BindErrorKind;

/// A type that can be populated from the property store.
///
/// Scalars read the string at the param's key; collections read comma lists or indexed sub-keys;
/// structs deriving [`crate::Bind`] bind each field under `key.field`.
pub trait Bind: Sized + Send + Sync + 'static {
    /// `true` for types stored as a single string, so collections of them may be comma-joined.
    const SCALAR: bool = false;

    /// # Errors
    /// Returns [`BindErrorKind`] if a value is missing, can't be parsed or fails validation.
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind>;

    /// Parses one scalar from `raw`. Only called when [`Self::SCALAR`] is `true`.
    ///
    /// # Errors
    /// Returns [`BindErrorKind::Parse`] if `raw` isn't a valid value.
    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        Err(BindErrorKind::Parse {
            key: key.to_owned(),
            value: raw.to_owned(),
            ty: type_name::<Self>(),
            reason: "not a scalar type".to_owned(),
        })
    }
}

/// Binds `T` at `param`, trying a registered converter before `T`'s own implementation.
///
/// # Errors
/// See [`Bind::bind`].
pub fn bind_value<T: Bind>(ctx: &BindContext<'_>, param: &BindParam) -> Result<T, BindErrorKind> {
    if let Some(convert) = ctx.converters().get::<T>() {
        if let Some(raw) = ctx.value(param)? {
            debug!(key = %param.key, ty = type_name::<T>(), "Converter used");
            let val = convert(&raw).map_err(|source| BindErrorKind::Converter {
                key: param.key.clone(),
                ty: type_name::<T>(),
                source,
            })?;
            validate(param, &raw)?;
            return Ok(val);
        }
    }
    T::bind(ctx, param)
}

/// Parses a scalar from a single string, trying a registered converter first.
///
/// # Errors
/// Returns [`BindErrorKind::Parse`], [`BindErrorKind::Converter`] or a validation error.
pub fn parse_scalar<T: Bind>(ctx: &BindContext<'_>, param: &BindParam, raw: &str) -> Result<T, BindErrorKind> {
    let val = match ctx.converters().get::<T>() {
        Some(convert) => convert(raw).map_err(|source| BindErrorKind::Converter {
            key: param.key.clone(),
            ty: type_name::<T>(),
            source,
        })?,
        None => T::parse(&param.key, raw)?,
    };
    validate(param, raw)?;
    Ok(val)
}

/// Binds a scalar: the required value at the key, parsed and validated.
/// Scalar [`Bind`] implementations delegate to it.
///
/// # Errors
/// Returns [`BindErrorKind::NotFound`] if the key and its default are absent, see also [`parse_scalar`].
pub fn bind_scalar<T: Bind>(ctx: &BindContext<'_>, param: &BindParam) -> Result<T, BindErrorKind> {
    let raw = ctx.require(param)?;
    parse_scalar(ctx, param, &raw)
}

/// Binds `T` from the root of `reader`'s tree at `tag`, for one-off lookups outside the container.
///
/// # Errors
/// Returns [`BindErrorKind`] if the tag is malformed or binding fails.
pub fn bind_tag<T: Bind>(ctx: &BindContext<'_>, tag: &str) -> Result<T, BindErrorKind> {
    let param = BindParam::parse("", tag)?;
    bind_value(ctx, &param).map_err(|err| {
        error!(tag, "{}", err);
        err
    })
}
