use proc_macro::TokenStream;
use quote::{quote, ToTokens};
use std::env::var_os;
use syn::parse::Parse;

mod attr_parsing;
mod bind;
mod component;
mod field;

/// Derives `sprig::bind::Bind` for a struct with named fields.
///
/// - `#[value("${key:=default}")]` binds the field at `parent.key`, `validate = "<expr>"` adds a validation
/// - `#[bind(flatten)]` binds the field at the parent key
/// - `#[bind(skip)]` takes `Default::default()`
/// - any other field binds at `parent.<field name>`
#[proc_macro_derive(Bind, attributes(value, bind))]
pub fn derive_bind(item: TokenStream) -> TokenStream {
    expand_with(item, bind::expand)
}

/// Derives `sprig::Component` for a struct with named fields.
///
/// - `#[inject]` or `#[inject("selector")]` resolves the field from the container
/// - `#[value("${key:=default}")]` binds the field from the properties, `validate = "<expr>"` adds a validation
/// - any other field takes `Default::default()`
#[proc_macro_derive(Component, attributes(inject, value))]
pub fn derive_component(item: TokenStream) -> TokenStream {
    expand_with(item, component::expand)
}

fn expand_with<F, I, K>(input: TokenStream, f: F) -> TokenStream
where
    F: FnOnce(I) -> syn::Result<K>,
    I: Parse,
    K: ToTokens,
{
    expand(syn::parse(input).and_then(f))
}

fn expand<T>(result: syn::Result<T>) -> TokenStream
where
    T: ToTokens,
{
    match result {
        Ok(tokens) => {
            let tokens = (quote! { #tokens }).into();
            if var_os("MACROS_DEBUG").is_some() {
                eprintln!("{tokens}");
            }
            tokens
        }
        Err(err) => err.into_compile_error().into(),
    }
}
