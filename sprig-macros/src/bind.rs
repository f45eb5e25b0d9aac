use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{spanned::Spanned as _, Data, DataStruct, DeriveInput, Error, Field, Fields};

use crate::field::{bind_args, ident, key, value_args};

pub(crate) fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let Data::Struct(DataStruct {
        fields: Fields::Named(fields),
        ..
    }) = &input.data
    else {
        return Err(Error::new_spanned(&input.ident, "`Bind` can be derived only for structs with named fields"));
    };

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let inits = fields.named.iter().map(field_init).collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::sprig::bind::Bind for #ident #ty_generics #where_clause {
            fn bind(
                ctx: &::sprig::bind::BindContext<'_>,
                param: &::sprig::bind::BindParam,
            ) -> ::core::result::Result<Self, ::sprig::errors::BindErrorKind> {
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
    let value = value_args(field)?;
    let bind = bind_args(field)?;

    if let (Some(value), true) = (&value, bind.flatten.is_some() || bind.skip.is_some()) {
        return Err(Error::new_spanned(&value.tag, "`value` can't be combined with `bind(flatten)` or `bind(skip)`"));
    }
    if let (Some(flatten), Some(_)) = (&bind.flatten, &bind.skip) {
        return Err(Error::new_spanned(flatten, "`flatten` can't be combined with `skip`"));
    }

    let init = if bind.skip.is_some() {
        quote_spanned! { span => #name: ::core::default::Default::default() }
    } else if bind.flatten.is_some() {
        quote_spanned! { span => #name: ::sprig::bind::bind_value::<#ty>(ctx, param)? }
    } else if let Some(value) = value {
        let tag = &value.tag;
        let validate = value.validate.as_ref().map(|(_, expr)| quote! { .with_validate(#expr) });
        quote_spanned! { span =>
            #name: {
                let param = ::sprig::bind::BindParam::parse(&param.key, #tag)? #validate;
                ::sprig::bind::bind_value::<#ty>(ctx, &param)?
            }
        }
    } else {
        let key = key(name);
        quote_spanned! { span => #name: ::sprig::bind::bind_value::<#ty>(ctx, &param.field(#key))? }
    };
    Ok(init)
}
