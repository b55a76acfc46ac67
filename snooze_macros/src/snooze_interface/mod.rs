use itertools::Itertools;
use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, DeriveInput, Error, Generics, Ident, Type, Variant};

pub struct RootImpl {
  type_id: Ident,
  generics: Generics,
  generic_ids: Vec<Ident>,
  variants: Vec<InterfaceVariant>,
}
impl RootImpl {
  pub fn derive(ast: DeriveInput) -> syn::Result<Self> {
    derive(ast)
  }
  pub fn expand(&self) -> TokenStream {
    expand(self)
  }
}

fn derive(ast: DeriveInput) -> syn::Result<RootImpl> {
  let aspan = ast.span();
  let generics = ast.generics;
  let mut generic_ids = Vec::new();
  for param in generics.params.iter() {
    match param {
      syn::GenericParam::Type(t) => generic_ids.push(t.ident.clone()),
      syn::GenericParam::Lifetime(l) => {
        return Err(Error::new(
          l.lifetime.span(),
          "SnoozeInterface does not allow lifetime parameters.",
        ))
      }
      syn::GenericParam::Const(c) => {
        return Err(Error::new(
          c.const_token.span,
          "SnoozeInterface does not allow const parameters.",
        ))
      }
    }
  }

  let data_enum = match ast.data {
    syn::Data::Enum(x) => x,
    _ => return Err(Error::new(aspan, "SnoozeInterface only supports enums.")),
  };
  let variants = data_enum
    .variants
    .into_iter()
    .map(InterfaceVariant::get)
    .collect::<syn::Result<Vec<_>>>()?;

  let mut seen: Vec<&Type> = Vec::new();
  for v in variants.iter().filter(|v| v.annotated) {
    let ty = &v.field_types[0];
    if seen.iter().any(|s| quote!(#s).to_string() == quote!(#ty).to_string()) {
      return Err(Error::new(
        v.variant_name.span(),
        "SnoozeInterface cannot derive two From impls for the same field type.",
      ));
    }
    seen.push(ty);
  }

  Ok(RootImpl {
    type_id: ast.ident,
    generics: generics,
    generic_ids: generic_ids,
    variants: variants,
  })
}

struct InterfaceVariant {
  variant_name: Ident,
  field_types: Vec<Type>,
  field_names: Option<Vec<Ident>>,
  annotated: bool,
}
impl InterfaceVariant {
  fn get(variant: Variant) -> syn::Result<Self> {
    let vspan = variant.fields.span();
    let annotated = annotation(&variant.attrs)?;
    let (types, names): (Vec<Type>, Vec<Option<Ident>>) = match variant.fields {
      syn::Fields::Named(n) => n.named.into_iter().map(|x| (x.ty, x.ident)).unzip(),
      syn::Fields::Unnamed(u) => u.unnamed.into_iter().map(|x| (x.ty, x.ident)).unzip(),
      syn::Fields::Unit => (vec![], vec![]),
    };

    if types.len() != 1 && annotated {
      return Err(Error::new(vspan, "SnoozeInterface variants must have exactly one field."));
    }

    Ok(InterfaceVariant {
      variant_name: variant.ident,
      field_types: types,
      field_names: names.into_iter().collect(),
      annotated: annotated,
    })
  }
}

fn annotation(attrs: &[Attribute]) -> syn::Result<bool> {
  let found = attrs.iter().filter(|attr| attr.path.is_ident("snooze")).at_most_one();
  match found {
    Ok(None) => Ok(false),
    Ok(Some(attr)) if attr.tokens.is_empty() => Ok(true),
    Ok(Some(attr)) => Err(Error::new(attr.tokens.span(), "'snooze' takes no arguments.")),
    Err(mut extra) => {
      let span = extra.nth(1).map(|a| a.path.span()).unwrap_or_else(proc_macro2::Span::call_site);
      Err(Error::new(
        span,
        "SnoozeInterface does not allow more than one 'snooze' annotation in the same place.",
      ))
    }
  }
}

fn expand(root: &RootImpl) -> TokenStream {
  let type_id = &root.type_id;
  let generic_ids = &root.generic_ids;
  let generic_params = &root.generics.params;
  let type_id_with_generics: proc_macro2::TokenStream = quote!(#type_id<#(#generic_ids),*>);
  let where_predicates = root.generics.where_clause.as_ref().map(|x| &x.predicates);

  let from_impls = root.variants.iter().filter(|v| v.annotated).map(|variant| {
    let variant_name = &variant.variant_name;
    let field_type = &variant.field_types[0];
    let convert_toks = match variant.field_names.as_ref().map(|v| &v[0]) {
      Some(name) => quote!(#type_id::#variant_name { #name: item }),
      None => quote!(#type_id::#variant_name(item)),
    };
    quote! {
      impl<#generic_params> ::std::convert::From<#field_type> for #type_id_with_generics
      where
        #where_predicates
      {
        fn from(item: #field_type) -> #type_id_with_generics {
          #convert_toks
        }
      }
    }
  });

  TokenStream::from(quote! {
    #(#from_impls)*
  })
}
