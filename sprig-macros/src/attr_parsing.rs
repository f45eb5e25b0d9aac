use proc_macro2::TokenStream;
use quote::ToTokens;
use std::any;
use syn::{
    parse::{Parse, ParseStream},
    Attribute, Meta, Token,
};

pub(crate) fn parse_assignment_attribute<K, T>(input: ParseStream<'_>, out: &mut Option<(K, T)>) -> syn::Result<()>
where
    K: Parse + ToTokens,
    T: Parse,
{
    let kw = input.parse()?;
    input.parse::<Token![=]>()?;
    let inner = input.parse()?;

    if out.is_some() {
        return Err(duplicate(&kw));
    }

    *out = Some((kw, inner));

    Ok(())
}

pub(crate) fn parse_flag<K>(input: ParseStream<'_>, out: &mut Option<K>) -> syn::Result<()>
where
    K: Parse + ToTokens,
{
    let kw = input.parse()?;
    if out.is_some() {
        return Err(duplicate(&kw));
    }
    *out = Some(kw);
    Ok(())
}

pub(crate) trait Combine: Sized {
    fn combine(self, other: Self) -> syn::Result<Self>;
}

/// Parses and combines every attribute named `ident`. A bare `#[ident]` is parsed as empty arguments.
pub(crate) fn parse_attrs<T>(ident: &str, attrs: &[Attribute]) -> Option<syn::Result<T>>
where
    T: Combine + Parse,
{
    let mut iter = attrs.iter().filter(|attr| attr.meta.path().is_ident(ident)).map(|attr| match &attr.meta {
        Meta::Path(_) => syn::parse2::<T>(TokenStream::new()).map_err(|err| syn::Error::new_spanned(attr, err)),
        _ => attr.parse_args::<T>(),
    });

    let first = match iter.next() {
        Some(Ok(first)) => first,
        Some(Err(err)) => return Some(Err(err)),
        None => return None,
    };

    Some(iter.try_fold(first, |out, next| out.combine(next?)))
}

pub(crate) fn combine_attribute<K>(a: &mut Option<K>, b: Option<K>) -> syn::Result<()>
where
    K: ToTokens,
{
    if let Some(kw) = b {
        if a.is_some() {
            return Err(duplicate(&kw));
        }
        *a = Some(kw);
    }
    Ok(())
}

fn duplicate<K: ToTokens>(kw: &K) -> syn::Error {
    let kw_name = any::type_name::<K>().rsplit("::").next().unwrap_or_default();
    let msg = "` specified more than once";
    syn::Error::new_spanned(kw, ["`", kw_name, msg].concat())
}
