use std::{
    any::type_name,
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
};

use super::{bind_value, parse_scalar, Bind, BindContext, BindParam};
use crate::{errors::BindErrorKind, properties::NodeKind};

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    let raw = raw.trim();
    raw.split(',').map(str::trim).filter(move |_| !raw.is_empty())
}

/// Structured containers can't be described by a single default string, only by an empty one.
fn check_default<C>(param: &BindParam) -> Result<(), BindErrorKind> {
    if param.has_non_empty_default() {
        return Err(BindErrorKind::DefaultNotAllowed {
            key: param.key.clone(),
            ty: type_name::<C>(),
        });
    }
    Ok(())
}

/// `true` if the container is present at the key. An absent container with an empty default is empty.
fn container_present<C>(ctx: &BindContext<'_>, param: &BindParam) -> Result<bool, BindErrorKind> {
    check_default::<C>(param)?;
    if ctx.has(&param.key) {
        return Ok(true);
    }
    match param.default {
        Some(_) => Ok(false),
        None => Err(BindErrorKind::NotFound { key: param.key.clone() }),
    }
}

fn bind_list<T: Bind>(ctx: &BindContext<'_>, param: &BindParam) -> Result<Vec<T>, BindErrorKind> {
    if T::SCALAR && ctx.kind(&param.key) != Some(NodeKind::Array) {
        let raw = ctx.require(param)?;
        return split_list(&raw)
            .enumerate()
            .map(|(index, item)| parse_scalar(ctx, &param.index(index), item))
            .collect();
    }

    if !container_present::<Vec<T>>(ctx, param)? {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    loop {
        let element = param.index(items.len());
        if !ctx.has(&element.key) {
            break;
        }
        items.push(bind_value::<T>(ctx, &element)?);
    }
    Ok(items)
}

fn bind_entries<T: Bind, C>(ctx: &BindContext<'_>, param: &BindParam) -> Result<Vec<(String, T)>, BindErrorKind> {
    if !container_present::<C>(ctx, param)? {
        return Ok(Vec::new());
    }
    ctx.sub_keys(&param.key)
        .into_iter()
        .map(|name| {
            let val = bind_value::<T>(ctx, &param.element(&name))?;
            Ok((name, val))
        })
        .collect()
}

impl<T: Bind> Bind for Vec<T> {
    #[inline]
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        bind_list(ctx, param)
    }
}

impl<T: Bind + Default, const N: usize> Bind for [T; N] {
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        let items = bind_list::<T>(ctx, param)?;
        if items.len() > N {
            return Err(BindErrorKind::Parse {
                key: param.key.clone(),
                value: ctx.value(param)?.unwrap_or_default(),
                ty: type_name::<Self>(),
                reason: format!("{} elements found, at most {N} expected", items.len()),
            });
        }
        let mut items = items.into_iter();
        Ok(core::array::from_fn(|_| items.next().unwrap_or_default()))
    }
}

impl<T: Bind, S: BuildHasher + Default + Send + Sync + 'static> Bind for HashMap<String, T, S> {
    #[inline]
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        Ok(bind_entries::<T, Self>(ctx, param)?.into_iter().collect())
    }
}

impl<T: Bind> Bind for BTreeMap<String, T> {
    #[inline]
    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        Ok(bind_entries::<T, Self>(ctx, param)?.into_iter().collect())
    }
}

/// `None` if the key is absent and there is no default.
impl<T: Bind> Bind for Option<T> {
    const SCALAR: bool = T::SCALAR;

    fn bind(ctx: &BindContext<'_>, param: &BindParam) -> Result<Self, BindErrorKind> {
        if !ctx.has(&param.key) && param.default.is_none() {
            return Ok(None);
        }
        bind_value::<T>(ctx, param).map(Some)
    }

    #[inline]
    fn parse(key: &str, raw: &str) -> Result<Self, BindErrorKind> {
        T::parse(key, raw).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bind::{bind_value, BindContext, BindParam, Converters},
        errors::BindErrorKind,
        properties::{PropValue, Properties},
    };

    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};
    use tracing_test::traced_test;

    fn props() -> Properties {
        let mut props = Properties::from_pairs([("ports", "80, 443"), ("empty", ""), ("weights.a", "1"), ("weights.b", "2")]).unwrap();
        props.set("names", vec!["x", "y"]).unwrap();
        props
            .set(
                "matrix",
                vec![PropValue::from(vec![1, 2]), PropValue::map([("k", "v")])],
            )
            .unwrap();
        props.set("nested", BTreeMap::from([("one", vec![1, 2]), ("two", vec![3])])).unwrap();
        props.set("none", Vec::<i32>::new()).unwrap();
        props
    }

    #[test]
    #[traced_test]
    fn test_lists() {
        let props = props();
        let converters = Converters::new();
        let ctx = BindContext::new(&props, &converters);

        assert_eq!(bind_value::<Vec<u16>>(&ctx, &BindParam::new("ports")).unwrap(), vec![80, 443]);
        assert_eq!(bind_value::<Vec<String>>(&ctx, &BindParam::new("names")).unwrap(), vec!["x", "y"]);
        assert!(bind_value::<Vec<i32>>(&ctx, &BindParam::new("empty")).unwrap().is_empty());
        assert!(bind_value::<Vec<i32>>(&ctx, &BindParam::new("none")).unwrap().is_empty());
        assert_eq!(
            bind_value::<Vec<i32>>(&ctx, &BindParam::new("missing").with_default("1,2,3")).unwrap(),
            vec![1, 2, 3]
        );
        assert!(matches!(
            bind_value::<Vec<i32>>(&ctx, &BindParam::new("missing")),
            Err(BindErrorKind::NotFound { .. })
        ));
        assert!(matches!(
            bind_value::<Vec<u8>>(&ctx, &BindParam::new("ports")),
            Err(BindErrorKind::Parse { key, .. }) if key == "ports[1]"
        ));
    }

    #[test]
    #[traced_test]
    fn test_nested_lists_and_maps() {
        let props = props();
        let converters = Converters::new();
        let ctx = BindContext::new(&props, &converters);

        let nested = bind_value::<BTreeMap<String, Vec<i32>>>(&ctx, &BindParam::new("nested")).unwrap();
        assert_eq!(nested, BTreeMap::from([("one".to_owned(), vec![1, 2]), ("two".to_owned(), vec![3])]));

        let weights = bind_value::<HashMap<String, f64>>(&ctx, &BindParam::new("weights")).unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights["b"], 2.0);

        let first = bind_value::<Vec<i32>>(&ctx, &BindParam::new("matrix[0]")).unwrap();
        assert_eq!(first, vec![1, 2]);

        assert!(matches!(
            bind_value::<BTreeMap<String, i32>>(&ctx, &BindParam::new("missing").with_default("a=1")),
            Err(BindErrorKind::DefaultNotAllowed { .. })
        ));
        assert!(bind_value::<BTreeMap<String, i32>>(&ctx, &BindParam::new("missing").with_default(""))
            .unwrap()
            .is_empty());
    }

    #[test]
    #[traced_test]
    fn test_arrays_and_options() {
        let props = props();
        let converters = Converters::new();
        let ctx = BindContext::new(&props, &converters);

        assert_eq!(bind_value::<[u16; 3]>(&ctx, &BindParam::new("ports")).unwrap(), [80, 443, 0]);
        assert!(matches!(
            bind_value::<[u16; 1]>(&ctx, &BindParam::new("ports")),
            Err(BindErrorKind::Parse { .. })
        ));

        assert_eq!(bind_value::<Option<u16>>(&ctx, &BindParam::new("missing")).unwrap(), None);
        assert_eq!(
            bind_value::<Option<u16>>(&ctx, &BindParam::new("missing").with_default("7")).unwrap(),
            Some(7)
        );
        assert_eq!(bind_value::<Option<Vec<u16>>>(&ctx, &BindParam::new("ports")).unwrap(), Some(vec![80, 443]));
    }

    #[test]
    #[traced_test]
    fn test_element_validation() {
        let props = props();
        let converters = Converters::new();
        let ctx = BindContext::new(&props, &converters);

        let param = BindParam::new("ports").with_validate("$ < 100");
        assert!(matches!(
            bind_value::<Vec<u16>>(&ctx, &param),
            Err(BindErrorKind::ValidationFailed { key, .. }) if key == "ports[1]"
        ));
    }
}
