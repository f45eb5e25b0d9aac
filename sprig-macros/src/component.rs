use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{spanned::Spanned as _, Data, DataStruct, DeriveInput, Error, Field, Fields};

use crate::field::{ident, inject_args, value_args};

pub(crate) fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let Data::Struct(DataStruct {
        fields: Fields::Named(fields),
        ..
    }) = &input.data
    else {
        return Err(Error::new_spanned(&input.ident, "`Component` can be derived only for structs with named fields"));
    };

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let inits = fields.named.iter().map(field_init).collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::sprig::Component for #ident #ty_generics #where_clause {
            fn create(
                wiring: &mut ::sprig::Wiring<'_>,
            ) -> ::core::result::Result<Self, ::sprig::errors::ResolveErrorKind> {
                ::core::result::Result::Ok(Self {
                    #( #inits, )*
                })
            }
        }
    })
}

fn field_init(field: &Field) -> syn::Result<TokenStream> {
    let name = ident(field)?;
    let ty = &field.ty;
    let span = field.span();
    let inject = inject_args(field)?;
    let value = value_args(field)?;

    let init = match (inject, value) {
        (Some(_), Some(value)) => {
            return Err(Error::new_spanned(&value.tag, "`value` can't be combined with `inject`"));
        }
        (Some(inject), None) => {
            let selector = match &inject.selector {
                Some(selector) => quote! { ::core::option::Option::Some(#selector) },
                None => quote! { ::core::option::Option::None },
            };
            quote_spanned! { span =>
                #name: <#ty as ::sprig::DependencyResolver>::resolve(wiring, #selector)?
            }
        }
        (None, Some(value)) => {
            let tag = &value.tag;
            let validate = value.validate_tokens();
            quote_spanned! { span => #name: wiring.bind::<#ty>(#tag, #validate)? }
        }
        (None, None) => quote_spanned! { span => #name: ::core::default::Default::default() },
    };
    Ok(init)
}
