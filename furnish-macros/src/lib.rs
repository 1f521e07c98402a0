//! Procedural macros for furnish.
//!
//! # Usage
//!
//! ```ignore
//! use furnish::prelude::*;
//! use furnish::Furnish;
//!
//! #[derive(Furnish)]
//! #[furnish(post_construct = "inject")]
//! pub struct Handler {
//!     pub repo: Arc<dyn Repository>,
//!     pub clock: Option<Arc<dyn Clock>>,
//!     #[furnish(skip)]
//!     pub cache: Vec<u8>,
//!     hits: usize,
//! }
//!
//! impl Handler {
//!     fn inject(&mut self, log: Arc<Logger>) { ... }
//! }
//! ```
//!
//! Public fields are furnished one by one; private and skipped fields are
//! left alone (and start from `Default::default()` in fresh values).

use darling::ast::{Data, Style};
use darling::util::Ignored;
use darling::{FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{DeriveInput, Ident, Index, LitStr, Path, Type, Visibility, parse_macro_input};

#[derive(FromDeriveInput)]
#[darling(attributes(furnish), supports(struct_any))]
struct FurnishInput {
    ident: Ident,
    generics: syn::Generics,
    data: Data<Ignored, FurnishField>,
    /// Method run with furnished arguments once the value is bound.
    #[darling(default)]
    post_construct: Option<Ident>,
    /// Path to the furnish crate, for use inside re-exporting crates.
    #[darling(default, rename = "crate")]
    krate: Option<Path>,
}

#[derive(FromField)]
#[darling(attributes(furnish))]
struct FurnishField {
    ident: Option<Ident>,
    ty: Type,
    vis: Visibility,
    #[darling(default)]
    skip: bool,
}

/// A field as it appears in generated code.
struct Member {
    /// `self.<access>`
    access: TokenStream2,
    /// Name used in error messages.
    label: LitStr,
    ty: Type,
    furnished: bool,
}

/// Derives `Furnish` with the record rule.
#[proc_macro_derive(Furnish, attributes(furnish))]
pub fn derive_furnish(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match FurnishInput::from_derive_input(&input) {
        Ok(parsed) => expand(parsed).into(),
        Err(e) => e.write_errors().into(),
    }
}

fn expand(input: FurnishInput) -> TokenStream2 {
    let krate = input
        .krate
        .clone()
        .unwrap_or_else(|| syn::parse_quote!(::furnish));
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (style, members) = match input.data {
        Data::Struct(fields) => {
            let style = fields.style;
            let members: Vec<Member> = fields
                .fields
                .into_iter()
                .enumerate()
                .map(|(index, field)| member(index, field))
                .collect();
            (style, members)
        }
        // `supports(struct_any)` rejects enums before we get here.
        Data::Enum(_) => (Style::Unit, Vec::new()),
    };

    let furnished: Vec<&Member> = members.iter().filter(|m| m.furnished).collect();
    let count = furnished.len();
    let slots: Vec<Ident> = (0..count).map(|i| format_ident!("__slot{}", i)).collect();
    let positions: Vec<Index> = (0..count).map(Index::from).collect();

    // furnish_new: fill one Option slot per furnished field in the
    // configured order, then assemble.
    let slot_decls = furnished.iter().zip(&slots).map(|(m, slot)| {
        let ty = &m.ty;
        quote! { let mut #slot: ::core::option::Option<#ty> = ::core::option::Option::None; }
    });
    let slot_fills = furnished.iter().zip(&slots).zip(&positions).map(|((m, slot), pos)| {
        let ty = &m.ty;
        let label = &m.label;
        quote! {
            #pos => {
                #slot = ::core::option::Option::Some(
                    #krate::resolve::<#ty>(__ctx)
                        .map_err(|__e| #krate::Error::field(#label, __e))?,
                );
            }
        }
    });

    let mut slot_iter = slots.iter();
    let values: Vec<TokenStream2> = members
        .iter()
        .map(|m| {
            if m.furnished {
                let label = &m.label;
                let slot = slot_iter.next();
                quote! { #krate::__private::filled(#slot, #label)? }
            } else {
                quote! { ::core::default::Default::default() }
            }
        })
        .collect();

    let construct = match style {
        Style::Struct => {
            let names = members.iter().map(|m| &m.access);
            quote! { Self { #(#names: #values),* } }
        }
        Style::Tuple => quote! { Self(#(#values),*) },
        Style::Unit => quote! { Self },
    };

    // furnish_in_place: furnish the same fields directly into self.
    let in_place = furnished.iter().zip(&positions).map(|(m, pos)| {
        let access = &m.access;
        let label = &m.label;
        quote! {
            #pos => #krate::resolve_into(__ctx, &mut self.#access)
                .map_err(|__e| #krate::Error::field(#label, __e))?,
        }
    });

    let (post_construct_name, post_construct) = match &input.post_construct {
        Some(method) => {
            let name = LitStr::new(&method.to_string(), method.span());
            (
                quote! { ::core::option::Option::Some(#name) },
                quote! {
                    fn post_construct(&mut self, __ctx: &#krate::Context) -> #krate::Result<()> {
                        #krate::call::invoke_method(__ctx, self, &Self::#method).map(|_| ())
                    }
                },
            )
        }
        None => (quote! { ::core::option::Option::None }, quote! {}),
    };

    quote! {
        impl #impl_generics #krate::Furnish for #ident #ty_generics #where_clause {
            const POST_CONSTRUCT: ::core::option::Option<&'static str> = #post_construct_name;

            #[allow(unused_variables, unused_mut, clippy::match_single_binding)]
            fn furnish_new(__ctx: &#krate::Context) -> #krate::Result<Self> {
                #(#slot_decls)*
                for __index in __ctx.field_order().sequence(#count) {
                    match __index {
                        #(#slot_fills)*
                        _ => {}
                    }
                }
                ::core::result::Result::Ok(#construct)
            }

            #[allow(unused_variables, clippy::match_single_binding)]
            fn furnish_in_place(&mut self, __ctx: &#krate::Context) -> #krate::Result<()> {
                for __index in __ctx.field_order().sequence(#count) {
                    match __index {
                        #(#in_place)*
                        _ => {}
                    }
                }
                ::core::result::Result::Ok(())
            }

            #post_construct
        }
    }
}

fn member(index: usize, field: FurnishField) -> Member {
    let furnished = !field.skip && !matches!(field.vis, Visibility::Inherited);

    let (access, label) = match &field.ident {
        Some(ident) => {
            let label = LitStr::new(&ident.to_string(), ident.span());
            (quote! { #ident }, label)
        }
        None => {
            let position = Index::from(index);
            let label = LitStr::new(&index.to_string(), proc_macro2::Span::call_site());
            (quote! { #position }, label)
        }
    };

    Member {
        access,
        label,
        ty: field.ty,
        furnished,
    }
}
