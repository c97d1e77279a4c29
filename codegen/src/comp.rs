use matches2::option_match;
use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Error, Result};

use crate::util::{self, Attr, Named};

pub(crate) fn imp(args: TokenStream, input: TokenStream) -> Result<TokenStream> {
    let args: Attr<FnOpt> = if args.is_empty() { Attr::default() } else { syn::parse2(args)? };

    let crate_name = match args.find_one(|opt| option_match!(opt, FnOpt::SparsecAs(_, ts) => ts))? {
        Some((_, ts)) => ts.clone(),
        None => quote!(::sparsec),
    };

    let policy = match args.find_one(|opt| option_match!(opt, FnOpt::InPlace => &()))? {
        Some(_) => quote!(#crate_name::sparse_set::DeletionPolicy::InPlace),
        None => quote!(#crate_name::sparse_set::DeletionPolicy::SwapAndPop),
    };

    let page_size =
        match args.find_one(|opt| option_match!(opt, FnOpt::PageSize(_, lit) => lit))? {
            Some((span, lit)) => {
                let value = lit.base10_parse::<usize>()?;
                if value != 0 && !value.is_power_of_two() {
                    return Err(Error::new(span, "page_size must be zero or a power of two"));
                }
                Some(quote!(const PAGE_SIZE: usize = #lit;))
            }
            None => None,
        };

    let input: syn::DeriveInput = syn::parse2(input)?;
    let generics = util::parse_generics(&input);

    let comp_impl = generics.impl_trait(
        quote!(#crate_name::comp::Component),
        quote! {
            const DELETION_POLICY: #crate_name::sparse_set::DeletionPolicy = #policy;
            #page_size
        },
    );

    Ok(quote! {
        #input
        #comp_impl
    })
}

enum FnOpt {
    SparsecAs(syn::token::Paren, TokenStream),
    InPlace,
    PageSize(syn::Token![=], syn::LitInt),
}

impl Parse for Named<FnOpt> {
    fn parse(input: ParseStream) -> Result<Self> {
        let name = input.parse::<syn::Ident>()?;

        let value = match name.to_string().as_str() {
            "sparsec_as" => {
                let inner;
                let paren = syn::parenthesized!(inner in input);
                let args = inner.parse()?;
                FnOpt::SparsecAs(paren, args)
            }
            "in_place" => FnOpt::InPlace,
            "page_size" => {
                let eq: syn::Token![=] = input.parse()?;
                let lit = input.parse::<syn::LitInt>()?;
                FnOpt::PageSize(eq, lit)
            }
            _ => return Err(Error::new_spanned(&name, format!("Unknown argument `{}`", name))),
        };

        Ok(Named { name, value })
    }
}
