//! Derive macro for the `Trace` trait.
//!
//! ```ignore
//! #[derive(Trace)]
//! struct Model {
//!     items: Vec<NodeRef>,
//!     #[zinc_gc(skip)]
//!     source_name: String,
//! }
//! ```
//!
//! Container attribute `#[zinc_gc(crate = path)]` names the `zinc_gc` crate
//! when it is re-exported under another path. Field attribute
//! `#[zinc_gc(skip)]` leaves a field out of tracing; the field type then
//! does not need to implement `Trace`.

use proc_macro2::TokenStream;
use quote::{format_ident, quote, quote_spanned};
use syn::{
    parse_macro_input, parse_quote, spanned::Spanned, Attribute, Data, DeriveInput, Field, Fields,
    GenericParam, Generics, Ident, Index, Path,
};

#[proc_macro_derive(Trace, attributes(zinc_gc))]
pub fn derive_trace(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream> {
    let mut zinc_gc: Path = parse_quote!(::zinc_gc);

    for attr in &input.attrs {
        if !attr.path().is_ident("zinc_gc") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                zinc_gc = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported attribute"))
            }
        })?;
    }

    let name = &input.ident;
    let generics = add_trait_bounds(&zinc_gc, input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let trace_body = generate_trace_body(&zinc_gc, name, &input.data)?;

    Ok(quote! {
        impl #impl_generics #zinc_gc::Trace for #name #ty_generics #where_clause {
            #[inline]
            #[allow(unused_variables)]
            fn trace(&self, tracer: &mut #zinc_gc::Tracer<'_>) {
                #trace_body
            }
        }
    })
}

fn add_trait_bounds(zinc_gc: &Path, mut generics: Generics) -> Generics {
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
                type_param.bounds.push(parse_quote!(#zinc_gc::Trace));
            }
        }
    }
    generics
}

/// Whether a field carries `#[zinc_gc(skip)]`.
fn is_skipped(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut skip = false;
    for attr in attrs {
        if !attr.path().is_ident("zinc_gc") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
                Ok(())
            } else {
                Err(meta.error("unsupported field attribute"))
            }
        })?;
    }
    Ok(skip)
}

fn traced<'a>(fields: impl Iterator<Item = &'a Field>) -> syn::Result<Vec<(usize, &'a Field)>> {
    let mut out = Vec::new();
    for (i, field) in fields.enumerate() {
        if !is_skipped(&field.attrs)? {
            out.push((i, field));
        }
    }
    Ok(out)
}

fn generate_trace_body(zinc_gc: &Path, name: &Ident, data: &Data) -> syn::Result<TokenStream> {
    match data {
        Data::Struct(data) => generate_struct_trace(zinc_gc, &data.fields),
        Data::Enum(data) => generate_enum_trace(zinc_gc, name, data),
        Data::Union(u) => Err(syn::Error::new(
            u.union_token.span,
            "`Trace` must be manually implemented for unions",
        )),
    }
}

fn generate_struct_trace(zinc_gc: &Path, fields: &Fields) -> syn::Result<TokenStream> {
    let trace_calls = traced(fields.iter())?.into_iter().map(|(i, field)| {
        let member = field.ident.as_ref().map_or_else(
            || {
                let index = Index::from(i);
                quote! { #index }
            },
            |ident| quote! { #ident },
        );
        quote_spanned! {field.span() =>
            #zinc_gc::Trace::trace(&self.#member, tracer);
        }
    });
    Ok(quote! { #(#trace_calls)* })
}

fn generate_enum_trace(
    zinc_gc: &Path,
    name: &Ident,
    data: &syn::DataEnum,
) -> syn::Result<TokenStream> {
    let mut match_arms = Vec::with_capacity(data.variants.len());

    for variant in &data.variants {
        let var_name = &variant.ident;
        let bindings: Vec<Ident> = (0..variant.fields.len())
            .map(|i| format_ident!("field{}", i))
            .collect();
        let trace_calls: Vec<TokenStream> = traced(variant.fields.iter())?
            .into_iter()
            .map(|(i, _)| {
                let binding = &bindings[i];
                quote! { #zinc_gc::Trace::trace(#binding, tracer); }
            })
            .collect();

        let arm = match &variant.fields {
            Fields::Named(f) => {
                let field_idents = f.named.iter().filter_map(|f| f.ident.as_ref());
                quote! {
                    #name::#var_name { #(#field_idents: #bindings),* } => {
                        #(#trace_calls)*
                    }
                }
            }
            Fields::Unnamed(_) => quote! {
                #name::#var_name(#(#bindings),*) => {
                    #(#trace_calls)*
                }
            },
            Fields::Unit => quote! {
                #name::#var_name => {}
            },
        };
        match_arms.push(arm);
    }

    if match_arms.is_empty() {
        return Ok(quote! { match *self {} });
    }

    Ok(quote! {
        match self {
            #(#match_arms)*
        }
    })
}
