use darling::{ast, FromDeriveInput, FromField, FromMeta};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, DeriveInput};

#[derive(FromDeriveInput)]
#[darling(attributes(config), supports(struct_named))]
struct ConfigInput {
    ident: syn::Ident,
    generics: syn::Generics,
    data: ast::Data<(), ConfigField>,
    /// Property names that may no longer be set
    #[darling(default, with = string_array)]
    defunct: Vec<String>,
}

#[derive(FromField)]
#[darling(attributes(config))]
struct ConfigField {
    ident: Option<syn::Ident>,
    ty: syn::Type,
    /// Property name; fields without one are not configurable
    #[darling(default)]
    name: Option<String>,
    #[darling(default)]
    description: Option<String>,
    #[darling(default)]
    default_value: Option<String>,
    #[darling(multiple)]
    legacy: Vec<String>,
    #[darling(default)]
    sensitive: bool,
    #[darling(default)]
    required: bool,
    #[darling(default)]
    deprecated: bool,
}

/// `["a", "b"]`
fn string_array(meta: &syn::Meta) -> darling::Result<Vec<String>> {
    let syn::Expr::Array(array) = syn::Expr::from_meta(meta)? else {
        return Err(darling::Error::custom("expected an array of strings").with_span(meta));
    };
    array
        .elems
        .iter()
        .map(|element| match element {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(value),
                ..
            }) => Ok(value.value()),
            other => Err(darling::Error::custom("expected a string literal").with_span(other)),
        })
        .collect()
}

pub fn derive_config(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match ConfigInput::from_derive_input(&input) {
        Ok(parsed) => TokenStream::from(generate_config_impl(&parsed)),
        Err(e) => TokenStream::from(e.write_errors()),
    }
}

fn generate_config_impl(input: &ConfigInput) -> TokenStream2 {
    let struct_name = &input.ident;
    let defunct = &input.defunct;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = input
        .data
        .as_ref()
        .take_struct()
        .map(|fields| fields.fields)
        .unwrap_or_default();

    let methods = fields.into_iter().flat_map(|field| {
        let (Some(ident), Some(property)) = (&field.ident, &field.name) else {
            return Vec::new();
        };
        let ty = &field.ty;
        let attribute = ident.unraw().to_string();
        let getter_name = format!("get_{attribute}");
        let setter_name = format!("set_{attribute}");

        let getter = quote! {
            ::keystone::describe::MethodDescriptor::getter(
                #getter_name,
                |config: &Self| ::core::clone::Clone::clone(&config.#ident),
            )
        };

        let mut setter = quote! {
            ::keystone::describe::MethodDescriptor::setter(
                #setter_name,
                |config: &mut Self, value: #ty| {
                    config.#ident = value;
                },
            )
            .config(#property)
        };
        if let Some(description) = &field.description {
            setter = quote! { #setter.description(#description) };
        }
        if let Some(default_value) = &field.default_value {
            setter = quote! { #setter.default_value(#default_value) };
        }
        for legacy in &field.legacy {
            setter = quote! { #setter.legacy(#legacy) };
        }
        if field.sensitive {
            setter = quote! { #setter.sensitive() };
        }
        if field.required {
            setter = quote! { #setter.required() };
        }
        if field.deprecated {
            setter = quote! { #setter.deprecated() };
        }

        vec![getter, setter]
    });

    quote! {
        impl #impl_generics ::keystone::Describe for #struct_name #ty_generics #where_clause {
            fn describe() -> ::keystone::describe::TypeDescriptor {
                ::keystone::describe::TypeDescriptor::builder::<Self>()
                    .constructor(<Self as ::core::default::Default>::default)
                    #(.defunct(#defunct))*
                    #(.method(#methods))*
                    .build()
            }
        }
    }
}
