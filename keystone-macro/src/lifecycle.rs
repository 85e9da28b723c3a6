use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Attribute, FnArg, ImplItem, ImplItemFn, ItemImpl, Visibility};

pub fn lifecycle_attribute(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(Span::call_site(), "#[lifecycle] takes no arguments")
            .to_compile_error()
            .into();
    }
    let input = parse_macro_input!(item as ItemImpl);

    match generate_lifecycle_impl(input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => e.to_compile_error().into(),
    }
}

fn generate_lifecycle_impl(mut input: ItemImpl) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[lifecycle] must be placed on an inherent impl block",
        ));
    }

    let mut hooks = Vec::new();
    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        // strip the markers so the impl block compiles without them
        let post_construct = take_marker(&mut method.attrs, "post_construct");
        let pre_destroy = take_marker(&mut method.attrs, "pre_destroy");
        if !post_construct && !pre_destroy {
            continue;
        }
        check_hook_signature(method)?;

        let fn_name = &method.sig.ident;
        let name = fn_name.unraw().to_string();
        let mut hook = quote! {
            ::keystone::describe::MethodDescriptor::hook(#name, |instance: &Self| instance.#fn_name())
        };
        if post_construct {
            hook = quote! { #hook.post_construct() };
        }
        if pre_destroy {
            hook = quote! { #hook.pre_destroy() };
        }
        if !matches!(method.vis, Visibility::Public(_)) {
            hook = quote! { #hook.private() };
        }
        hooks.push(hook);
    }

    let self_ty = &input.self_ty;
    let (impl_generics, _, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #input

        impl #impl_generics ::keystone::Describe for #self_ty #where_clause {
            fn describe() -> ::keystone::describe::TypeDescriptor {
                ::keystone::describe::TypeDescriptor::builder::<Self>()
                    #(.method(#hooks))*
                    .build()
            }
        }
    })
}

fn take_marker(attrs: &mut Vec<Attribute>, marker: &str) -> bool {
    let before = attrs.len();
    attrs.retain(|attr| {
        !attr
            .path()
            .segments
            .last()
            .is_some_and(|segment| segment.ident == marker)
    });
    attrs.len() != before
}

fn check_hook_signature(method: &ImplItemFn) -> syn::Result<()> {
    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "lifecycle hooks cannot be async",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "lifecycle hooks cannot be generic",
        ));
    }

    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        Some(FnArg::Receiver(receiver)) => {
            return Err(syn::Error::new_spanned(
                receiver,
                "lifecycle hooks must take &self",
            ));
        }
        _ => {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                "lifecycle hooks must take &self",
            ));
        }
    }

    if let Some(extra) = sig.inputs.iter().nth(1) {
        return Err(syn::Error::new_spanned(
            extra,
            "lifecycle hook methods cannot have arguments",
        ));
    }
    Ok(())
}
