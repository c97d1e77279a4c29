use itertools::Itertools;
use proc_macro2::{Span, TokenStream};
use quote::{quote, quote_spanned, ToTokens};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Error, Result};

/// A comma-separated list of named options, e.g. `in_place, page_size = 64`.
pub(crate) struct Attr<T> {
    pub(crate) items: Punctuated<Named<T>, syn::Token![,]>,
}

impl<T> Default for Attr<T> {
    fn default() -> Self { Self { items: Punctuated::new() } }
}

impl<T> Parse for Attr<T>
where
    Named<T>: Parse,
{
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Self { items: Punctuated::parse_terminated(input)? })
    }
}

impl<T> Attr<T> {
    /// Finds the only option matched by `matcher`.
    ///
    /// Returns an error spanning the duplicates if the option is specified more than once.
    pub(crate) fn find_one<'t, U: 't>(
        &'t self,
        matcher: impl Fn(&'t T) -> Option<&'t U>,
    ) -> Result<Option<(Span, &'t U)>> {
        let matches =
            self.items.iter().filter_map(|named| matcher(&named.value).map(|value| (&named.name, value)));

        match matches.at_most_one() {
            Ok(found) => Ok(found.map(|(name, value)| (name.span(), value))),
            Err(mut dups) => {
                let (name, _) = dups.nth(1).expect("at_most_one errs with at least two items");
                Err(Error::new_spanned(name, format!("`{}` is specified multiple times", name)))
            }
        }
    }
}

/// An option identified by its leading identifier.
pub(crate) struct Named<T> {
    pub(crate) name:  syn::Ident,
    pub(crate) value: T,
}

pub(crate) fn parse_generics(input: &syn::DeriveInput) -> ParsedGenerics {
    let generics = &input.generics;

    let (decl, usage) = if input.generics.params.is_empty() {
        (quote!(), quote!())
    } else {
        let decl: Vec<_> = input.generics.params.iter().collect();
        let usage: Vec<_> = input
            .generics
            .params
            .iter()
            .map(|param| match param {
                syn::GenericParam::Type(syn::TypeParam { ident, .. }) => quote!(#ident),
                syn::GenericParam::Lifetime(syn::LifetimeParam { lifetime, .. }) => {
                    quote!(#lifetime)
                }
                syn::GenericParam::Const(syn::ConstParam { ident, .. }) => quote!(#ident),
            })
            .collect();
        (
            quote_spanned!(generics.span() => <#(#decl),*>),
            quote_spanned!(generics.span() => <#(#usage),*>),
        )
    };

    let where_ = &input.generics.where_clause;

    ParsedGenerics { ident: input.ident.clone(), decl, usage, where_: where_.to_token_stream() }
}

pub(crate) struct ParsedGenerics {
    pub(crate) ident:  proc_macro2::Ident,
    pub(crate) decl:   proc_macro2::TokenStream,
    pub(crate) usage:  proc_macro2::TokenStream,
    pub(crate) where_: proc_macro2::TokenStream,
}

impl ParsedGenerics {
    pub(crate) fn impl_trait(&self, trait_: TokenStream, body: TokenStream) -> TokenStream {
        let Self { ident, decl, usage, where_ } = self;
        quote! {
            impl #decl #trait_ for #ident #usage #where_ {
                #body
            }
        }
    }
}
