//! Derive macro for the `Trace` trait.
//!
//! The generated impl reports every field to the visitor, so every `Value`
//! held by the type (directly or inside `Option`, `Vec`, tuples, ...) is
//! marked. Fields that cannot hold values can opt out with `#[trace(skip)]`.

use proc_macro2::TokenStream;
use quote::{format_ident, quote, quote_spanned};
use syn::{
    parse_macro_input, parse_quote, spanned::Spanned, Attribute, Data, DeriveInput, Field, Fields,
    GenericParam, Generics, Ident, Index, Path,
};

#[proc_macro_derive(Trace, attributes(sexp_gc, trace))]
pub fn derive_trace(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let mut sexp_gc: Path = parse_quote!(::sexp_gc);

    for attr in &input.attrs {
        if !attr.path().is_ident("sexp_gc") {
            continue;
        }

        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                sexp_gc = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported attribute"))
            }
        });

        if let Err(err) = result {
            return err.into_compile_error().into();
        }
    }

    let name = &input.ident;
    let generics = add_trait_bounds(&sexp_gc, input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let trace_body = match generate_trace_body(&sexp_gc, name, &input.data) {
        Ok(body) => body,
        Err(err) => return err.into_compile_error().into(),
    };

    let generated = quote! {
        unsafe impl #impl_generics #sexp_gc::Trace for #name #ty_generics #where_clause {
            #[inline]
            fn trace(&self, visitor: &mut dyn #sexp_gc::Visitor) {
                #trace_body
            }
        }
    };

    generated.into()
}

fn add_trait_bounds(sexp_gc: &Path, mut generics: Generics) -> Generics {
    for param in &mut generics.params {
        if let GenericParam::Type(ref mut type_param) = *param {
            let has_trace = type_param.bounds.iter().any(|b| {
                if let syn::TypeParamBound::Trait(t) = b {
                    t.path.segments.last().is_some_and(|s| s.ident == "Trace")
                } else {
                    false
                }
            });

            if !has_trace {
                type_param.bounds.push(parse_quote!(#sexp_gc::Trace));
            }
        }
    }
    generics
}

/// Returns `true` for fields annotated `#[trace(skip)]`.
fn is_skipped(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut skip = false;
    for attr in attrs {
        if !attr.path().is_ident("trace") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("expected `skip`"))
            }
        })?;
    }
    Ok(skip)
}

fn traced_fields<'a, I>(fields: I) -> syn::Result<Vec<(usize, &'a Field)>>
where
    I: IntoIterator<Item = &'a Field>,
{
    let mut kept = Vec::new();
    for (i, field) in fields.into_iter().enumerate() {
        if !is_skipped(&field.attrs)? {
            kept.push((i, field));
        }
    }
    Ok(kept)
}

fn generate_trace_body(sexp_gc: &Path, name: &Ident, data: &Data) -> syn::Result<TokenStream> {
    match data {
        Data::Struct(data) => generate_struct_trace(sexp_gc, &data.fields),
        Data::Enum(data) => generate_enum_trace(sexp_gc, name, data),
        Data::Union(u) => Ok(quote_spanned! {
            u.union_token.span => compile_error!("`Trace` must be manually implemented for unions");
        }),
    }
}

fn generate_struct_trace(sexp_gc: &Path, fields: &Fields) -> syn::Result<TokenStream> {
    let body = match fields {
        Fields::Named(f) => {
            let trace_calls = traced_fields(&f.named)?.into_iter().map(|(_, field)| {
                let name = &field.ident;
                quote_spanned! {field.span() =>
                    #sexp_gc::Trace::trace(&self.#name, visitor);
                }
            });
            quote! { #(#trace_calls)* }
        }
        Fields::Unnamed(f) => {
            let trace_calls = traced_fields(&f.unnamed)?.into_iter().map(|(i, field)| {
                let index = Index::from(i);
                quote_spanned! {field.span() =>
                    #sexp_gc::Trace::trace(&self.#index, visitor);
                }
            });
            quote! { #(#trace_calls)* }
        }
        Fields::Unit => quote! { let _ = visitor; },
    };
    Ok(body)
}

fn generate_enum_trace(
    sexp_gc: &Path,
    name: &Ident,
    data: &syn::DataEnum,
) -> syn::Result<TokenStream> {
    let mut match_arms = Vec::with_capacity(data.variants.len());

    for variant in &data.variants {
        let var_name = &variant.ident;
        let arm = match &variant.fields {
            Fields::Named(f) => {
                let kept = traced_fields(&f.named)?;
                let bindings = kept.iter().map(|(i, field)| {
                    let ident = field.ident.as_ref();
                    let binding = format_ident!("field{}", i);
                    quote! { #ident: #binding }
                });
                let trace_calls = kept.iter().map(|(i, _)| {
                    let binding = format_ident!("field{}", i);
                    quote! { #sexp_gc::Trace::trace(#binding, visitor); }
                });

                quote! {
                    #name::#var_name { #(#bindings,)* .. } => {
                        #(#trace_calls)*
                    }
                }
            }
            Fields::Unnamed(f) => {
                let mut patterns = Vec::with_capacity(f.unnamed.len());
                let mut trace_calls = Vec::new();
                for (i, field) in f.unnamed.iter().enumerate() {
                    if is_skipped(&field.attrs)? {
                        patterns.push(quote! { _ });
                    } else {
                        let binding = format_ident!("field{}", i);
                        patterns.push(quote! { #binding });
                        trace_calls.push(quote! { #sexp_gc::Trace::trace(#binding, visitor); });
                    }
                }

                quote! {
                    #name::#var_name(#(#patterns),*) => {
                        #(#trace_calls)*
                    }
                }
            }
            Fields::Unit => {
                quote! {
                    #name::#var_name => {}
                }
            }
        };
        match_arms.push(arm);
    }

    if match_arms.is_empty() {
        return Ok(quote! { let _ = visitor; match *self {} });
    }

    Ok(quote! {
        match self {
            #(#match_arms)*
        }
    })
}
