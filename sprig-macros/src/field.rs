use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    ext::IdentExt as _,
    parse::{Parse, ParseStream},
    Field, Ident, LitStr, Token,
};

use crate::attr_parsing::{combine_attribute, parse_assignment_attribute, parse_attrs, parse_flag, Combine};

pub(crate) mod kw {
    syn::custom_keyword!(validate);
    syn::custom_keyword!(flatten);
    syn::custom_keyword!(skip);
}

/// `#[value("${key:=default}", validate = "<expr>")]`
pub(crate) struct ValueArgs {
    pub(crate) tag: LitStr,
    pub(crate) validate: Option<(kw::validate, LitStr)>,
}

impl Parse for ValueArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let tag = input.parse::<LitStr>()?;
        let val = tag.value();
        let val = val.trim();
        if !val.starts_with("${") || !val.ends_with('}') {
            return Err(syn::Error::new_spanned(tag, "value tag must be a `${key:=default}` segment"));
        }

        let mut validate = None;
        while !input.is_empty() {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let lookahead = input.lookahead1();
            if lookahead.peek(kw::validate) {
                parse_assignment_attribute(input, &mut validate)?;
            } else {
                return Err(lookahead.error());
            }
        }

        Ok(Self { tag, validate })
    }
}

impl Combine for ValueArgs {
    fn combine(self, other: Self) -> syn::Result<Self> {
        Err(syn::Error::new_spanned(other.tag, "`value` specified more than once"))
    }
}

impl ValueArgs {
    /// The validation expression as an `Option<&str>` expression.
    pub(crate) fn validate_tokens(&self) -> TokenStream {
        match &self.validate {
            Some((_, expr)) => quote! { ::core::option::Option::Some(#expr) },
            None => quote! { ::core::option::Option::None },
        }
    }
}

/// `#[bind(flatten)]`, `#[bind(skip)]`
#[derive(Default)]
pub(crate) struct BindArgs {
    pub(crate) flatten: Option<kw::flatten>,
    pub(crate) skip: Option<kw::skip>,
}

impl Parse for BindArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = Self::default();
        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(kw::flatten) {
                parse_flag(input, &mut args.flatten)?;
            } else if lookahead.peek(kw::skip) {
                parse_flag(input, &mut args.skip)?;
            } else {
                return Err(lookahead.error());
            }
            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }
        Ok(args)
    }
}

impl Combine for BindArgs {
    fn combine(mut self, other: Self) -> syn::Result<Self> {
        combine_attribute(&mut self.flatten, other.flatten)?;
        combine_attribute(&mut self.skip, other.skip)?;
        Ok(self)
    }
}

/// `#[inject]`, `#[inject("selector")]`
#[derive(Default)]
pub(crate) struct InjectArgs {
    pub(crate) selector: Option<LitStr>,
}

impl Parse for InjectArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            selector: Some(input.parse()?),
        })
    }
}

impl Combine for InjectArgs {
    fn combine(self, other: Self) -> syn::Result<Self> {
        match other.selector {
            Some(selector) => Err(syn::Error::new_spanned(selector, "`inject` specified more than once")),
            None => Err(syn::Error::new(proc_macro2::Span::call_site(), "`inject` specified more than once")),
        }
    }
}

pub(crate) fn value_args(field: &Field) -> syn::Result<Option<ValueArgs>> {
    parse_attrs("value", &field.attrs).transpose()
}

pub(crate) fn bind_args(field: &Field) -> syn::Result<BindArgs> {
    Ok(parse_attrs("bind", &field.attrs).transpose()?.unwrap_or_default())
}

pub(crate) fn inject_args(field: &Field) -> syn::Result<Option<InjectArgs>> {
    parse_attrs("inject", &field.attrs).transpose()
}

pub(crate) fn ident(field: &Field) -> syn::Result<&Ident> {
    field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "only named fields are supported"))
}

/// The property name of a field: its identifier without the raw prefix.
pub(crate) fn key(ident: &Ident) -> String {
    ident.unraw().to_string()
}
